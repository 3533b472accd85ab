//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML, optional)
//!     → loader.rs (parse & deserialize)
//!     → environment overrides (CANDY_RPC_HOST, CANDY_WS_HOST, ...)
//!     → validation.rs (semantic checks)
//!     → MintConfig (validated, immutable)
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, load_or_default, ConfigError};
pub use schema::{CandyMachineConfig, LedgerConfig, MintConfig, ObservabilityConfig, SubmissionConfig};
pub use validation::ValidationError;
