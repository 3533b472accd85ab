//! Ledger integration subsystem.
//!
//! # Data Flow
//! ```text
//! Configuration (RPC URL, failover URLs, websocket URL)
//!     → rpc.rs (JSON-RPC over HTTP with timeouts and failover)
//!     → pubsub.rs (signature subscriptions over websocket)
//!     → connection.rs (LedgerConnection trait the submission pipeline talks to)
//!
//! transaction.rs (build from instruction groups, serialize, stamp block reference)
//! wallet.rs      (WalletAdapter trait, local keypair wallet)
//! ```
//!
//! # Constraints
//! - The submission pipeline only ever sees `dyn LedgerConnection`
//! - Every RPC call has a configurable deadline
//! - Keys are never logged

pub mod connection;
pub mod pubsub;
pub mod rpc;
pub mod transaction;
pub mod types;
pub mod wallet;

pub use connection::LedgerConnection;
pub use rpc::RpcLedger;
pub use types::{
    BlockReference, Commitment, ConfirmationStatus, LedgerError, LedgerResult, SendOptions, SignatureNotification,
    SignatureStatus, SignatureSubscription, SimulationResult, SubscriptionId,
};
pub use wallet::{KeypairWallet, WalletAdapter, WalletError};
