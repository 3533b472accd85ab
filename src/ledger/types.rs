//! Ledger-facing types and error definitions.

use serde::{Deserialize, Serialize};
use solana_sdk::hash::Hash;
use thiserror::Error;
use tokio::sync::oneshot;

/// How much finality a status must have before it is trusted.
///
/// The legacy names (`recent`, `single`, `singleGossip`, `root`, `max`) are
/// still accepted in configuration and translated by [`Commitment::normalized`]
/// before they go on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Commitment {
    Processed,
    Confirmed,
    Finalized,
    Recent,
    Single,
    SingleGossip,
    Root,
    Max,
}

impl Commitment {
    /// Name as written in configuration.
    pub fn as_str(&self) -> &'static str {
        match self {
            Commitment::Processed => "processed",
            Commitment::Confirmed => "confirmed",
            Commitment::Finalized => "finalized",
            Commitment::Recent => "recent",
            Commitment::Single => "single",
            Commitment::SingleGossip => "singleGossip",
            Commitment::Root => "root",
            Commitment::Max => "max",
        }
    }

    /// Map legacy levels onto the three levels current nodes understand.
    pub fn normalized(&self) -> Commitment {
        match self {
            Commitment::Processed | Commitment::Recent => Commitment::Processed,
            Commitment::Confirmed | Commitment::Single | Commitment::SingleGossip => {
                Commitment::Confirmed
            }
            Commitment::Finalized | Commitment::Root | Commitment::Max => Commitment::Finalized,
        }
    }
}

impl std::str::FromStr for Commitment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [
            Commitment::Processed,
            Commitment::Confirmed,
            Commitment::Finalized,
            Commitment::Recent,
            Commitment::Single,
            Commitment::SingleGossip,
            Commitment::Root,
            Commitment::Max,
        ]
        .into_iter()
        .find(|c| c.as_str() == s)
        .ok_or_else(|| format!("unknown commitment '{}'", s))
    }
}

impl std::fmt::Display for Commitment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Recency token bounding a transaction's validity window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockReference {
    pub blockhash: Hash,
    pub last_valid_block_height: u64,
}

/// Options for raw transaction submission.
#[derive(Debug, Clone, Copy, Default)]
pub struct SendOptions {
    /// Let the node skip its own simulation before forwarding.
    pub skip_preflight: bool,
    pub preflight_commitment: Option<Commitment>,
}

impl SendOptions {
    pub fn skip_preflight() -> Self {
        Self {
            skip_preflight: true,
            preflight_commitment: None,
        }
    }
}

/// One entry of a `getSignatureStatuses` response.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignatureStatus {
    pub slot: u64,
    /// `None` once the transaction is rooted.
    pub confirmations: Option<u64>,
    pub err: Option<serde_json::Value>,
    #[serde(default)]
    pub confirmation_status: Option<String>,
}

impl SignatureStatus {
    /// True when the node reports at least one confirmation, or the status is final.
    pub fn is_confirmed(&self) -> bool {
        match self.confirmations {
            Some(n) => n > 0,
            None => self.confirmation_status.as_deref() == Some("finalized"),
        }
    }
}

/// Push notification for a signature subscription.
#[derive(Debug, Clone, PartialEq)]
pub struct SignatureNotification {
    pub slot: u64,
    pub err: Option<serde_json::Value>,
}

/// Handle returned by the node for a subscription.
pub type SubscriptionId = u64;

/// A registered signature subscription.
///
/// `notification` resolves once; if the sender is dropped the subscription
/// produced no result.
#[derive(Debug)]
pub struct SignatureSubscription {
    pub id: SubscriptionId,
    pub notification: oneshot::Receiver<SignatureNotification>,
}

/// Result of a transaction simulation.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct SimulationResult {
    pub err: Option<serde_json::Value>,
    #[serde(default)]
    pub logs: Option<Vec<String>>,
}

/// Final or in-flight status of one submitted transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfirmationStatus {
    /// Not yet resolved.
    Pending,
    /// Included at `slot` without error.
    Confirmed { slot: u64 },
    /// The ledger reported an execution error.
    Failed { error: String },
    /// No conclusive result within the deadline.
    TimedOut,
}

impl ConfirmationStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ConfirmationStatus::Pending)
    }
}

/// Errors that can occur while talking to the ledger.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// The node answered with a JSON-RPC error object.
    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    /// Request did not complete within the deadline.
    #[error("RPC timeout after {0} seconds")]
    Timeout(u64),

    /// Connection, HTTP or websocket failure.
    #[error("Transport error: {0}")]
    Transport(String),

    /// Subscription could not be registered.
    #[error("Subscription error: {0}")]
    Subscription(String),

    /// The node answered with something we could not decode.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// Result type for ledger operations.
pub type LedgerResult<T> = Result<T, LedgerError>;
