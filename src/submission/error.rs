//! Submission error taxonomy.

use solana_sdk::signature::Signature;
use thiserror::Error;

use crate::ledger::{LedgerError, WalletError};

/// Errors surfaced by the broadcaster and batch submitter.
#[derive(Debug, Error)]
pub enum SubmitError {
    /// The wallet exposes no public identity. Aborts the whole batch.
    #[error("Wallet not connected")]
    NotConnected,

    /// No conclusive confirmation was observed in time. The transaction may
    /// still land.
    #[error("Timed out awaiting confirmation of {id}")]
    Timeout { id: Signature },

    /// The ledger reported an execution error; `message` is the best
    /// diagnostic available.
    #[error("{message}")]
    TransactionFailed { id: Signature, message: String },

    /// A transaction could not be assembled or signed.
    #[error("Signing failed: {0}")]
    Signing(String),

    #[error("Encoding failed: {0}")]
    Encoding(#[from] bincode::Error),

    #[error(transparent)]
    Wallet(#[from] WalletError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

/// Result type for submission operations.
pub type SubmitResult<T> = Result<T, SubmitError>;

impl SubmitError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, SubmitError::Timeout { .. })
    }

    /// Identifier of the transaction this error concerns, when it got that far.
    pub fn transaction_id(&self) -> Option<&Signature> {
        match self {
            SubmitError::Timeout { id } | SubmitError::TransactionFailed { id, .. } => Some(id),
            _ => None,
        }
    }
}
