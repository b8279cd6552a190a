//! Periodic background task plumbing.
//!
//! The two supervision loops run on independent fixed cadences, each
//! holding only its own lock, and stop cooperatively: cancellation is
//! observed between iterations, never inside a register sequence.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// A unit of periodic supervision work.
#[async_trait]
pub trait Periodic: Send + Sync {
    /// Task name for logging.
    fn name(&self) -> &'static str;

    /// One scheduled iteration.
    async fn tick(&self);
}

/// Runs `task` on a fixed cadence until `cancel` fires. An in-flight
/// iteration always completes before the task exits.
pub fn spawn_periodic(
    task: Arc<dyn Periodic>,
    interval: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut timer = tokio::time::interval(interval);
        timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        info!(task = task.name(), ?interval, "periodic task started");
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = timer.tick() => task.tick().await,
            }
        }
        debug!(task = task.name(), "periodic task stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct Counter {
        ticks: AtomicU32,
    }

    #[async_trait]
    impl Periodic for Counter {
        fn name(&self) -> &'static str {
            "counter"
        }

        async fn tick(&self) {
            self.ticks.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticks_on_cadence_until_cancelled() {
        let counter = Arc::new(Counter {
            ticks: AtomicU32::new(0),
        });
        let cancel = CancellationToken::new();
        let handle = spawn_periodic(counter.clone(), Duration::from_millis(100), cancel.clone());

        tokio::time::sleep(Duration::from_millis(350)).await;
        let seen = counter.ticks.load(Ordering::SeqCst);
        assert!(seen >= 3, "only {seen} ticks");

        cancel.cancel();
        handle.await.unwrap();
        let stopped_at = counter.ticks.load(Ordering::SeqCst);

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(counter.ticks.load(Ordering::SeqCst), stopped_at);
    }
}
