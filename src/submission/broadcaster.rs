//! Resilient broadcast of one signed transaction.
//!
//! # Flow
//! ```text
//! serialize once
//!     → send (skip preflight)           ─┐
//!     → resend same bytes every 500 ms   │ until the tracker resolves
//!     → ConfirmationTracker (polling on) ─┘   or the deadline passes
//!     → stop resend loop, wait for it
//!     → Confirmed: {id, slot} | TimedOut: Timeout | Failed: simulate, diagnose
//! ```
//!
//! Rebroadcasting identical bytes is idempotent: same signature, same id.

use std::sync::Arc;
use std::time::Duration;

use solana_sdk::signature::Signature;
use solana_sdk::transaction::Transaction;

use crate::config::SubmissionConfig;
use crate::ledger::{transaction, Commitment, ConfirmationStatus, LedgerConnection, SendOptions};
use crate::observability::metrics;
use crate::resilience::{spawn_periodic, Deadline, StopSignal};
use crate::submission::confirmation::ConfirmationTracker;
use crate::submission::diagnostics;
use crate::submission::error::{SubmitError, SubmitResult};

pub const DEFAULT_CONFIRM_TIMEOUT: Duration = Duration::from_millis(15_000);
pub const DEFAULT_RESEND_INTERVAL: Duration = Duration::from_millis(500);

/// A transaction that made it into a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SendResult {
    pub id: Signature,
    pub slot: u64,
}

/// Timing and commitment knobs for broadcasting.
#[derive(Debug, Clone)]
pub struct BroadcastSettings {
    pub timeout: Duration,
    pub resend_interval: Duration,
    pub poll_interval: Duration,
    pub confirm_commitment: Commitment,
    pub simulate_commitment: Commitment,
}

impl Default for BroadcastSettings {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_CONFIRM_TIMEOUT,
            resend_interval: DEFAULT_RESEND_INTERVAL,
            poll_interval: super::confirmation::DEFAULT_POLL_INTERVAL,
            confirm_commitment: Commitment::Recent,
            simulate_commitment: Commitment::Single,
        }
    }
}

impl From<&SubmissionConfig> for BroadcastSettings {
    fn from(config: &SubmissionConfig) -> Self {
        Self {
            timeout: Duration::from_millis(config.confirm_timeout_ms),
            resend_interval: Duration::from_millis(config.resend_interval_ms),
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            confirm_commitment: config.confirm_commitment,
            simulate_commitment: config.simulate_commitment,
        }
    }
}

/// Gets signed transactions included despite dropped broadcasts.
#[derive(Clone)]
pub struct ResilientBroadcaster {
    ledger: Arc<dyn LedgerConnection>,
    tracker: ConfirmationTracker,
    settings: BroadcastSettings,
}

impl ResilientBroadcaster {
    pub fn new(ledger: Arc<dyn LedgerConnection>, settings: BroadcastSettings) -> Self {
        let tracker =
            ConfirmationTracker::new(ledger.clone()).with_poll_interval(settings.poll_interval);
        Self {
            ledger,
            tracker,
            settings,
        }
    }

    pub fn settings(&self) -> &BroadcastSettings {
        &self.settings
    }

    /// Broadcast `transaction` until it confirms, fails or times out.
    ///
    /// No submissions are issued for this transaction after this returns.
    pub async fn send_signed_transaction(
        &self,
        transaction: &Transaction,
    ) -> SubmitResult<SendResult> {
        let wire = Arc::new(transaction::serialize(transaction)?);
        let deadline = Deadline::start(self.settings.timeout);

        let result = self.broadcast(wire, deadline).await;

        let latency = deadline.elapsed();
        match &result {
            Ok(sent) => {
                tracing::info!(
                    id = %sent.id,
                    slot = sent.slot,
                    latency_ms = latency.as_millis() as u64,
                    "Transaction confirmed"
                );
                metrics::record_broadcast("confirmed", latency);
            }
            Err(e) => {
                tracing::warn!(
                    id = ?e.transaction_id(),
                    error = %e,
                    latency_ms = latency.as_millis() as u64,
                    "Transaction not confirmed"
                );
                metrics::record_broadcast(if e.is_timeout() { "timeout" } else { "failed" }, latency);
            }
        }
        result
    }

    async fn broadcast(
        &self,
        wire: Arc<Vec<u8>>,
        deadline: Deadline,
    ) -> SubmitResult<SendResult> {
        let id = self
            .ledger
            .send_raw_transaction(&wire, SendOptions::skip_preflight())
            .await?;
        tracing::debug!(%id, "Transaction submitted");

        let stop = StopSignal::new();
        let resender = {
            let ledger = self.ledger.clone();
            let wire = wire.clone();
            spawn_periodic(
                self.settings.resend_interval,
                deadline,
                stop.clone(),
                move || {
                    let ledger = ledger.clone();
                    let wire = wire.clone();
                    async move {
                        if let Err(e) = ledger
                            .send_raw_transaction(&wire, SendOptions::skip_preflight())
                            .await
                        {
                            tracing::debug!(error = %e, "Resubmission failed");
                        }
                    }
                },
            )
        };

        let status = {
            // Stops the loop even if this future is dropped mid-wait.
            let _guard = stop.guard();
            self.tracker
                .await_confirmation(
                    &id,
                    deadline.remaining(),
                    self.settings.confirm_commitment,
                    true,
                )
                .await
        };

        match resender.await {
            Ok(resubmissions) => {
                tracing::debug!(%id, resubmissions, "Resend loop stopped");
                metrics::record_resubmissions(resubmissions);
            }
            Err(e) => tracing::warn!(%id, error = %e, "Resend loop aborted"),
        }

        match status {
            ConfirmationStatus::Confirmed { slot } => Ok(SendResult { id, slot }),
            ConfirmationStatus::Failed { error } => {
                let message = self.diagnose(&wire, &error).await;
                Err(SubmitError::TransactionFailed { id, message })
            }
            ConfirmationStatus::TimedOut | ConfirmationStatus::Pending => {
                Err(SubmitError::Timeout { id })
            }
        }
    }

    /// Best-effort readable failure reason; falls back to `error`.
    async fn diagnose(&self, wire: &[u8], error: &str) -> String {
        match self
            .ledger
            .simulate_transaction(wire, self.settings.simulate_commitment)
            .await
        {
            Ok(simulation) => diagnostics::failure_message(&simulation, error),
            Err(e) => {
                tracing::warn!(error = %e, "Simulation of failed transaction failed");
                error.to_string()
            }
        }
    }
}

impl std::fmt::Debug for ResilientBroadcaster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResilientBroadcaster")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}
