//! Cancellable background tasks.
//!
//! Periodic work (health probes, stall detection, retention sweeps) runs in a
//! [`BackgroundTask`]. Stopping a task cancels its token and awaits the
//! spawned future, so shutdown never depends on process exit.

use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Smallest period accepted by [`BackgroundTask::every`].
const MIN_PERIOD: Duration = Duration::from_millis(1);

/// Handle to a spawned, cancellable background task.
///
/// Dropping the handle cancels the task without waiting for it.
#[derive(Debug)]
pub struct BackgroundTask {
    name: String,
    token: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl BackgroundTask {
    /// Spawns `run` with a fresh cancellation token.
    ///
    /// The future must observe the token and return once it is cancelled.
    pub fn spawn<F, Fut>(name: impl Into<String>, run: F) -> Self
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let token = CancellationToken::new();
        let handle = tokio::spawn(run(token.clone()));
        Self {
            name: name.into(),
            token,
            handle: Some(handle),
        }
    }

    /// Spawns a ticker calling `tick` once per `period` until stopped.
    ///
    /// The first call happens one full period after spawning. Missed ticks
    /// are skipped rather than bunched up.
    pub fn every<F, Fut>(name: impl Into<String>, period: Duration, mut tick: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send,
    {
        let effective = period.max(MIN_PERIOD);
        Self::spawn(name, move |token| async move {
            let mut interval = time::interval_at(Instant::now() + effective, effective);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    biased;
                    () = token.cancelled() => break,
                    _ = interval.tick() => tick().await,
                }
            }
        })
    }

    /// Returns the task name used in logs.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns a clone of the task's cancellation token.
    #[must_use]
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Returns whether the spawned future has finished.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().is_none_or(JoinHandle::is_finished)
    }

    /// Signals cancellation without waiting.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Cancels the task and waits for it to finish.
    pub async fn stop(mut self) {
        self.token.cancel();
        if let Some(handle) = self.handle.take()
            && let Err(err) = handle.await
        {
            tracing::warn!(task = %self.name, error = %err, "background task ended abnormally");
        }
        tracing::debug!(task = %self.name, "background task stopped");
    }
}

impl Drop for BackgroundTask {
    fn drop(&mut self) {
        self.token.cancel();
    }
}
