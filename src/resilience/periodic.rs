//! Periodic background tasks with cooperative stop.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinHandle;

use crate::resilience::timeouts::Deadline;

#[derive(Debug, Default)]
struct StopState {
    stopped: AtomicBool,
    notify: Notify,
}

/// One-way flag shared between the owner of some work and its loops.
#[derive(Debug, Clone, Default)]
pub struct StopSignal {
    inner: Arc<StopState>,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the flag and wake every task waiting in [`StopSignal::stopped`].
    pub fn stop(&self) {
        self.inner.stopped.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    pub fn is_stopped(&self) -> bool {
        self.inner.stopped.load(Ordering::SeqCst)
    }

    /// Resolves once the flag is raised.
    pub async fn stopped(&self) {
        loop {
            let notified = self.inner.notify.notified();
            if self.is_stopped() {
                return;
            }
            notified.await;
        }
    }

    /// Guard that raises the flag when dropped.
    pub fn guard(&self) -> StopGuard {
        StopGuard(self.clone())
    }
}

/// Raises its [`StopSignal`] on drop, including when the owning future is cancelled.
#[derive(Debug)]
pub struct StopGuard(StopSignal);

impl Drop for StopGuard {
    fn drop(&mut self) {
        self.0.stop();
    }
}

/// Run `tick` every `interval` until `stop` is raised or `deadline` passes.
///
/// The first tick happens one interval after spawning. The signal is checked
/// before and during every tick, so at most one tick runs after a stop.
/// Returns the number of completed ticks.
pub fn spawn_periodic<F, Fut>(
    interval: Duration,
    deadline: Deadline,
    stop: StopSignal,
    mut tick: F,
) -> JoinHandle<u64>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        let mut ticks = 0u64;
        loop {
            tokio::select! {
                biased;
                _ = stop.stopped() => break,
                _ = tokio::time::sleep(interval) => {}
            }
            if stop.is_stopped() || deadline.is_expired() {
                break;
            }
            tokio::select! {
                biased;
                _ = stop.stopped() => break,
                _ = tick() => {}
            }
            ticks += 1;
        }
        ticks
    })
}
