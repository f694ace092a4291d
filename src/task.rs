//! Owned periodic background tasks.

use std::future::Future;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

/// Handle to a periodic task started by [`spawn_periodic`].
///
/// Dropping the handle stops the loop at its next wake-up; [`shutdown`]
/// stops it and waits for the current tick to finish.
///
/// [`shutdown`]: BackgroundTask::shutdown
#[derive(Debug)]
pub struct BackgroundTask {
    name: &'static str,
    stop: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

impl BackgroundTask {
    /// Task name used in logs.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Whether the loop has exited.
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Stop the loop and wait for it to exit.
    pub async fn shutdown(self) {
        // The receiver is gone only if the loop already exited.
        let _ = self.stop.send(());
        if let Err(e) = self.handle.await {
            warn!(task = self.name, error = %e, "Background task ended abnormally");
        }
    }
}

/// Run `tick` every `period` on the tokio runtime.
///
/// The first tick fires one full period after spawning.
pub fn spawn_periodic<F, Fut>(name: &'static str, period: Duration, mut tick: F) -> BackgroundTask
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let period = period.max(Duration::from_millis(1));
    let (stop, mut stopped) = oneshot::channel::<()>();

    let handle = tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        // Skip the first immediate tick
        interval.tick().await;

        loop {
            tokio::select! {
                _ = &mut stopped => break,
                _ = interval.tick() => tick().await,
            }
        }
        debug!(task = name, "Background task stopped");
    });

    debug!(task = name, period_ms = period.as_millis() as u64, "Background task started");
    BackgroundTask { name, stop, handle }
}
