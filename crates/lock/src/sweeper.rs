//! Periodic background sweeps.
//!
//! Both the lock expiry sweep and the admin session sweep run on
//! [`spawn_periodic`]: sleep for one interval, run the tick, repeat until the
//! cancellation token fires.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Handle to a running sweeper task.
///
/// Dropping the handle does not stop the task; call [`stop`](Self::stop) or
/// cancel the parent token.
#[derive(Debug)]
pub struct SweeperHandle {
    name: &'static str,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl SweeperHandle {
    /// Name given at spawn time.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Ask the sweeper to stop after its current tick.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Whether the task has exited.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.task.is_finished()
    }

    /// Stop the sweeper and wait for it to exit.
    pub async fn join(self) {
        self.cancel.cancel();
        if let Err(e) = self.task.await {
            tracing::warn!(sweeper = self.name, error = %e, "sweeper task failed");
        }
    }
}

/// Run `tick` every `interval` until `cancel` fires.
///
/// Must be called from within a tokio runtime.
pub fn spawn_periodic<F>(
    name: &'static str,
    interval: Duration,
    cancel: CancellationToken,
    mut tick: F,
) -> SweeperHandle
where
    F: FnMut() + Send + 'static,
{
    let token = cancel.clone();
    let task = tokio::spawn(async move {
        tracing::debug!(sweeper = name, interval_ms = interval.as_millis() as u64, "sweeper started");
        loop {
            tokio::select! {
                () = tokio::time::sleep(interval) => {}
                () = token.cancelled() => break,
            }
            tick();
        }
        tracing::debug!(sweeper = name, "sweeper stopped");
    });
    SweeperHandle { name, cancel, task }
}
