//! Candy machine mint client library.
//!
//! The core is the submission pipeline: sign a batch of transaction groups,
//! broadcast each with redundant resends, and race a signature subscription
//! against status polling under a timeout.

pub mod candy;
pub mod config;
pub mod ledger;
pub mod observability;
pub mod resilience;
pub mod submission;

pub use config::schema::MintConfig;
pub use ledger::{LedgerConnection, RpcLedger, WalletAdapter};
pub use submission::{BatchSubmitter, ConfirmationTracker, ResilientBroadcaster};
