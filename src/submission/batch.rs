//! Batch signing and dispatch.
//!
//! # Flow
//! ```text
//! wallet connected? ── no ──→ NotConnected (nothing built)
//!     → shared BlockReference (fetched once unless supplied)
//!     → one unsigned transaction per non-empty group, aux signers applied
//!     → wallet signs all in one approval
//!     → ResilientBroadcaster per transaction, under the SequencePolicy
//!     → observer callbacks, BatchOutcome
//! ```

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use solana_sdk::signature::Signature;
use solana_sdk::transaction::Transaction;
use tracing::Instrument;
use uuid::Uuid;

use crate::config::SubmissionConfig;
use crate::ledger::transaction::{build_unsigned, TransactionGroup};
use crate::ledger::{BlockReference, Commitment, LedgerConnection, WalletAdapter};
use crate::observability::metrics;
use crate::submission::broadcaster::{BroadcastSettings, ResilientBroadcaster, SendResult};
use crate::submission::error::{SubmitError, SubmitResult};

/// How the transactions of one batch are dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SequencePolicy {
    /// All in flight at once; failures are independent.
    #[default]
    Parallel,
    /// One at a time, in order, each resolved before the next starts.
    Sequential,
    /// Sequential, halting at the first failure.
    StopOnFailure,
}

impl SequencePolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            SequencePolicy::Parallel => "parallel",
            SequencePolicy::Sequential => "sequential",
            SequencePolicy::StopOnFailure => "stopOnFailure",
        }
    }
}

impl std::str::FromStr for SequencePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "parallel" => Ok(SequencePolicy::Parallel),
            "sequential" => Ok(SequencePolicy::Sequential),
            "stopOnFailure" | "stop-on-failure" => Ok(SequencePolicy::StopOnFailure),
            other => Err(format!("unknown sequence policy '{}'", other)),
        }
    }
}

/// Per-transaction callbacks.
///
/// Panics raised here are caught and logged; they never reach the caller of
/// [`BatchSubmitter::send_transactions`].
pub trait SubmissionObserver: Send + Sync {
    fn on_success(&self, _id: &Signature, _index: usize) {}

    fn on_failure(&self, _transaction: &Transaction, _index: usize, _error: &SubmitError) {}
}

/// Observer that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl SubmissionObserver for NoopObserver {}

/// Terminal result for one dispatched transaction.
#[derive(Debug)]
pub struct TransactionOutcome {
    /// Position among the signed transactions.
    pub index: usize,
    /// Position of the originating group, counting empty groups.
    pub group_index: usize,
    pub result: SubmitResult<SendResult>,
}

impl TransactionOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// Everything a batch produced.
#[derive(Debug, Default)]
pub struct BatchOutcome {
    /// Signed transactions in the batch, or the stop index on early stop.
    pub count: usize,
    /// One entry per dispatched transaction, in index order.
    pub outcomes: Vec<TransactionOutcome>,
    /// Index of the failure that halted a [`SequencePolicy::StopOnFailure`] run.
    pub stopped_at: Option<usize>,
}

impl BatchOutcome {
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }
}

/// Signs and dispatches batches of transaction groups.
#[derive(Clone)]
pub struct BatchSubmitter {
    ledger: Arc<dyn LedgerConnection>,
    broadcaster: ResilientBroadcaster,
    commitment: Commitment,
}

impl BatchSubmitter {
    pub fn new(
        ledger: Arc<dyn LedgerConnection>,
        settings: BroadcastSettings,
        commitment: Commitment,
    ) -> Self {
        Self {
            broadcaster: ResilientBroadcaster::new(ledger.clone(), settings),
            ledger,
            commitment,
        }
    }

    pub fn from_config(ledger: Arc<dyn LedgerConnection>, config: &SubmissionConfig) -> Self {
        Self::new(ledger, BroadcastSettings::from(config), config.commitment)
    }

    pub fn broadcaster(&self) -> &ResilientBroadcaster {
        &self.broadcaster
    }

    /// Sign every non-empty group with `wallet` and dispatch the results.
    ///
    /// Only a disconnected wallet, block reference lookup, or signing can fail
    /// the call; per-transaction failures land in the outcome.
    pub async fn send_transactions(
        &self,
        wallet: &dyn WalletAdapter,
        groups: &[TransactionGroup],
        policy: SequencePolicy,
        observer: &dyn SubmissionObserver,
        block: Option<BlockReference>,
    ) -> SubmitResult<BatchOutcome> {
        let span = tracing::info_span!(
            "batch",
            batch_id = %Uuid::new_v4(),
            policy = policy.as_str(),
            groups = groups.len(),
        );
        self.run(wallet, groups, policy, observer, block)
            .instrument(span)
            .await
    }

    async fn run(
        &self,
        wallet: &dyn WalletAdapter,
        groups: &[TransactionGroup],
        policy: SequencePolicy,
        observer: &dyn SubmissionObserver,
        block: Option<BlockReference>,
    ) -> SubmitResult<BatchOutcome> {
        let fee_payer = wallet.public_key().ok_or(SubmitError::NotConnected)?;

        let block = match block {
            Some(block) => block,
            None => self.ledger.get_recent_block_reference(self.commitment).await?,
        };

        let mut group_indices = Vec::with_capacity(groups.len());
        let mut unsigned = Vec::with_capacity(groups.len());
        for (group_index, group) in groups.iter().enumerate() {
            if group.is_empty() {
                tracing::debug!(group_index, "Skipping empty group");
                continue;
            }
            let transaction = build_unsigned(group, &fee_payer, &block)
                .map_err(|e| SubmitError::Signing(format!("group {}: {}", group_index, e)))?;
            unsigned.push(transaction);
            group_indices.push(group_index);
        }

        if unsigned.is_empty() {
            tracing::info!("No non-empty groups to submit");
            return Ok(BatchOutcome::default());
        }

        let expected = unsigned.len();
        let signed = wallet.sign_all_transactions(unsigned).await?;
        if signed.len() != expected {
            return Err(SubmitError::Signing(format!(
                "wallet returned {} transactions for {}",
                signed.len(),
                expected
            )));
        }
        tracing::info!(count = signed.len(), blockhash = %block.blockhash, "Batch signed");

        let outcome = match policy {
            SequencePolicy::Parallel => {
                self.dispatch_parallel(&signed, &group_indices, observer).await
            }
            SequencePolicy::Sequential => {
                self.dispatch_sequential(&signed, &group_indices, observer, false)
                    .await
            }
            SequencePolicy::StopOnFailure => {
                self.dispatch_sequential(&signed, &group_indices, observer, true)
                    .await
            }
        };

        tracing::info!(
            succeeded = outcome.succeeded(),
            failed = outcome.failed(),
            stopped_at = ?outcome.stopped_at,
            "Batch finished"
        );
        metrics::record_batch(policy.as_str(), outcome.succeeded(), outcome.failed());
        Ok(outcome)
    }

    async fn dispatch_parallel(
        &self,
        signed: &[Transaction],
        group_indices: &[usize],
        observer: &dyn SubmissionObserver,
    ) -> BatchOutcome {
        let in_flight = signed.iter().enumerate().map(|(index, transaction)| async move {
            let result = self.broadcaster.send_signed_transaction(transaction).await;
            notify(observer, transaction, index, &result);
            TransactionOutcome {
                index,
                group_index: group_indices[index],
                result,
            }
        });

        BatchOutcome {
            count: signed.len(),
            outcomes: join_all(in_flight).await,
            stopped_at: None,
        }
    }

    async fn dispatch_sequential(
        &self,
        signed: &[Transaction],
        group_indices: &[usize],
        observer: &dyn SubmissionObserver,
        stop_on_failure: bool,
    ) -> BatchOutcome {
        let mut outcomes = Vec::with_capacity(signed.len());
        for (index, transaction) in signed.iter().enumerate() {
            let result = self.broadcaster.send_signed_transaction(transaction).await;
            notify(observer, transaction, index, &result);
            let failed = result.is_err();
            outcomes.push(TransactionOutcome {
                index,
                group_index: group_indices[index],
                result,
            });

            if failed && stop_on_failure {
                tracing::warn!(index, remaining = signed.len() - index - 1, "Stopping batch after failure");
                return BatchOutcome {
                    count: index,
                    outcomes,
                    stopped_at: Some(index),
                };
            }
        }

        BatchOutcome {
            count: signed.len(),
            outcomes,
            stopped_at: None,
        }
    }
}

impl std::fmt::Debug for BatchSubmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchSubmitter")
            .field("broadcaster", &self.broadcaster)
            .field("commitment", &self.commitment)
            .finish_non_exhaustive()
    }
}

fn notify(
    observer: &dyn SubmissionObserver,
    transaction: &Transaction,
    index: usize,
    result: &SubmitResult<SendResult>,
) {
    let call = panic::catch_unwind(AssertUnwindSafe(|| match result {
        Ok(sent) => observer.on_success(&sent.id, index),
        Err(e) => observer.on_failure(transaction, index, e),
    }));
    if call.is_err() {
        tracing::error!(index, "Submission observer panicked");
    }
}
