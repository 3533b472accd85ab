//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Submission pipeline produces:
//!     → logging.rs (structured log events, batch id span)
//!     → metrics.rs (counters and latency histograms)
//!
//! Consumers:
//!     → stdout / log aggregation
//!     → Prometheus scrape endpoint (optional)
//! ```
//!
//! # Design Decisions
//! - Structured fields, never preformatted strings, for ids and timings
//! - Every batch runs inside a span carrying its batch id
//! - Metric updates are no-ops until an exporter is installed

pub mod logging;
pub mod metrics;
