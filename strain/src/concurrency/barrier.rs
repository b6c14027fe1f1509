use tokio::sync::watch;

use super::UnitId;

/// Counts completions of independently started units.
///
/// Waiters never hold the units' handles: each unit calls
/// [`on_completion`](Self::on_completion) once when it is done and the barrier
/// is reached once at least `dispatched` completions were counted.
/// [`cancel_threads`](Self::cancel_threads) counts units that will never
/// report, so `returned` can run ahead of the real completions.
#[derive(Debug)]
pub struct CompletionBarrier {
    dispatched: usize,
    returned: watch::Sender<usize>,
}

impl CompletionBarrier {
    pub fn new(dispatched: usize) -> Self {
        let (returned, _) = watch::channel(0);
        Self {
            dispatched,
            returned,
        }
    }

    pub fn dispatched(&self) -> usize {
        self.dispatched
    }

    pub fn returned(&self) -> usize {
        *self.returned.borrow()
    }

    /// Called by `unit` as it finishes, whatever the outcome.
    pub fn on_completion(&self, unit: UnitId) {
        self.returned.send_modify(|returned| *returned += 1);
        tracing::debug!(
            %unit,
            returned = self.returned(),
            dispatched = self.dispatched,
            "Unit reached the barrier"
        );
    }

    pub fn is_reached(&self) -> bool {
        self.returned() >= self.dispatched
    }

    /// Accounts for `count` units that were abandoned instead of completed.
    pub fn cancel_threads(&self, count: usize) {
        self.returned.send_modify(|returned| *returned += count);
    }

    /// Resolves once the barrier is reached. Returns at once if it already is.
    pub async fn wait(&self) {
        let dispatched = self.dispatched;
        let mut returned = self.returned.subscribe();
        // The sender lives in `self`, so the channel cannot close under us
        let reached = returned.wait_for(|n| *n >= dispatched).await.is_ok();
        debug_assert!(reached);
    }
}
