//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Broadcast of one signed transaction:
//!     → timeouts.rs (deadline shared by resends and confirmation)
//!     → periodic.rs (resend loop and poll loop, stopped through a StopSignal)
//! ```
//!
//! # Design Decisions
//! - Every confirmation attempt has a deadline; nothing waits forever
//! - Loops stop cooperatively: they check the signal every cycle
//! - Stopping is tied to a guard so an abandoned broadcast still stops its loop

pub mod periodic;
pub mod timeouts;

pub use periodic::{spawn_periodic, StopGuard, StopSignal};
pub use timeouts::Deadline;
