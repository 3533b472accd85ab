//! Confirmation tracking for a single submitted transaction.
//!
//! # Race
//! ```text
//! timeout sleep ────────┐
//! signature subscription ├─→ first to finish wins, the rest are dropped
//! status polling (opt) ──┘
//!     → unsubscribe if the subscription is still registered
//! ```
//!
//! The subscribe call runs in its own task. If the race ends before it
//! returns, a cleanup task waits for the handle and unsubscribes it, so a
//! late subscribe reply never leaves a registration behind.
//!
//! A racer that cannot produce a result (subscription setup failed, channel
//! closed) parks forever instead of resolving; the timeout always terminates
//! the race.

use std::future::pending;
use std::sync::Arc;
use std::time::Duration;

use solana_sdk::signature::Signature;
use tokio::task::JoinHandle;

use crate::ledger::{
    Commitment, ConfirmationStatus, LedgerConnection, LedgerResult, SignatureSubscription,
    SubscriptionId,
};
use crate::observability::metrics;

/// Interval between `getSignatureStatuses` queries.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(2_000);

type SubscribeTask = JoinHandle<LedgerResult<SignatureSubscription>>;

/// Resolves the fate of submitted transactions.
#[derive(Clone)]
pub struct ConfirmationTracker {
    ledger: Arc<dyn LedgerConnection>,
    poll_interval: Duration,
}

impl ConfirmationTracker {
    pub fn new(ledger: Arc<dyn LedgerConnection>) -> Self {
        Self {
            ledger,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Wait until `signature` is confirmed, fails, or `timeout` elapses.
    ///
    /// Never returns [`ConfirmationStatus::Pending`]. Transport errors are
    /// logged and absorbed.
    pub async fn await_confirmation(
        &self,
        signature: &Signature,
        timeout: Duration,
        commitment: Commitment,
        use_polling: bool,
    ) -> ConfirmationStatus {
        let mut subscription: Option<SubscriptionId> = None;
        let mut subscribing = Some(self.spawn_subscribe(*signature, commitment));

        let (status, source) = tokio::select! {
            _ = tokio::time::sleep(timeout) => (ConfirmationStatus::TimedOut, "timeout"),
            status = self.watch_subscription(signature, &mut subscribing, &mut subscription) => {
                (status, "subscription")
            }
            status = self.poll_status(signature), if use_polling => (status, "polling"),
        };

        if let Some(id) = subscription {
            self.release(id).await;
        } else if let Some(task) = subscribing {
            let tracker = self.clone();
            tokio::spawn(async move {
                if let Ok(Ok(late)) = task.await {
                    tracing::debug!(subscription = late.id, "Releasing subscription that outlived its race");
                    tracker.release(late.id).await;
                }
            });
        }

        tracing::debug!(%signature, source, status = ?status, "Confirmation resolved");
        metrics::record_confirmation(source, outcome_label(&status));
        status
    }

    fn spawn_subscribe(&self, signature: Signature, commitment: Commitment) -> SubscribeTask {
        let ledger = self.ledger.clone();
        tokio::spawn(async move { ledger.subscribe_signature(&signature, commitment).await })
    }

    async fn release(&self, id: SubscriptionId) {
        if self.ledger.has_subscription(id) {
            if let Err(e) = self.ledger.unsubscribe(id).await {
                tracing::warn!(subscription = id, error = %e, "Failed to remove signature subscription");
            }
        }
    }

    /// `subscribing` is cleared once the task has been awaited to completion,
    /// so a handle left behind means the subscribe result was never seen.
    async fn watch_subscription(
        &self,
        signature: &Signature,
        subscribing: &mut Option<SubscribeTask>,
        registered: &mut Option<SubscriptionId>,
    ) -> ConfirmationStatus {
        let joined = match subscribing.as_mut() {
            Some(task) => task.await,
            None => return pending().await,
        };
        *subscribing = None;

        let subscription = match joined {
            Ok(Ok(subscription)) => subscription,
            Ok(Err(e)) => {
                tracing::warn!(%signature, error = %e, "Signature subscription failed; relying on other sources");
                return pending().await;
            }
            Err(e) => {
                tracing::warn!(%signature, error = %e, "Subscription task aborted; relying on other sources");
                return pending().await;
            }
        };
        *registered = Some(subscription.id);

        match subscription.notification.await {
            Ok(notification) => match notification.err {
                Some(err) => ConfirmationStatus::Failed {
                    error: err.to_string(),
                },
                None => ConfirmationStatus::Confirmed {
                    slot: notification.slot,
                },
            },
            Err(_) => {
                tracing::debug!(%signature, "Subscription closed without a notification");
                pending().await
            }
        }
    }

    async fn poll_status(&self, signature: &Signature) -> ConfirmationStatus {
        loop {
            match self
                .ledger
                .get_signature_statuses(std::slice::from_ref(signature))
                .await
            {
                Ok(statuses) => match statuses.into_iter().next().flatten() {
                    Some(status) if status.err.is_some() => {
                        let error = status.err.map(|e| e.to_string()).unwrap_or_default();
                        return ConfirmationStatus::Failed { error };
                    }
                    Some(status) if status.is_confirmed() => {
                        return ConfirmationStatus::Confirmed { slot: status.slot };
                    }
                    Some(status) => {
                        tracing::trace!(%signature, slot = status.slot, "Seen but not yet confirmed");
                    }
                    None => tracing::trace!(%signature, "Signature not yet known"),
                },
                Err(e) => {
                    tracing::warn!(%signature, error = %e, "Status query failed; retrying");
                }
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

impl std::fmt::Debug for ConfirmationTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfirmationTracker")
            .field("poll_interval", &self.poll_interval)
            .finish_non_exhaustive()
    }
}

pub(crate) fn outcome_label(status: &ConfirmationStatus) -> &'static str {
    match status {
        ConfirmationStatus::Pending => "pending",
        ConfirmationStatus::Confirmed { .. } => "confirmed",
        ConfirmationStatus::Failed { .. } => "failed",
        ConfirmationStatus::TimedOut => "timeout",
    }
}
