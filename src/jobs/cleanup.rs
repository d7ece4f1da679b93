//! Background job: purge expired authorization state.
//!
//! Signed scheme: drops revoked tokens that no longer verify.
//! Session scheme: deletes expired rows from the session table.
//!
//! Runs every `interval`, the first pass one interval after start, until
//! the returned handle is shut down.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};

use crate::auth::Authorizer;

/// Shortest accepted interval; shorter requests are raised to it.
pub const MIN_INTERVAL: Duration = Duration::from_secs(1);

/// Stops the cleanup task when asked.
pub struct CleanupHandle {
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl CleanupHandle {
    /// Signal the task and wait for it to exit.
    pub async fn shutdown(self) {
        let _ = self.stop.send(true);
        if let Err(e) = self.task.await {
            tracing::error!("cleanup task ended abnormally: {}", e);
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

/// Spawn the cleanup task. Call this once at startup.
pub fn spawn(authorizer: Arc<Authorizer>, every: Duration) -> CleanupHandle {
    if every < MIN_INTERVAL {
        tracing::warn!(
            requested_ms = every.as_millis() as u64,
            "cleanup interval too short, using {}s",
            MIN_INTERVAL.as_secs()
        );
    }
    let every = every.max(MIN_INTERVAL);
    let (stop, mut stopped) = watch::channel(false);

    let task = tokio::spawn(async move {
        let mut interval = time::interval_at(time::Instant::now() + every, every);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tracing::info!(
            scheme = authorizer.scheme(),
            every_secs = every.as_secs(),
            "token cleanup scheduled"
        );

        loop {
            tokio::select! {
                _ = interval.tick() => run_once(&authorizer).await,
                changed = stopped.changed() => {
                    // a dropped sender also means stop
                    if changed.is_err() || *stopped.borrow() {
                        break;
                    }
                }
            }
        }
        tracing::debug!("token cleanup stopped");
    });

    CleanupHandle { stop, task }
}

async fn run_once(authorizer: &Authorizer) {
    match authorizer.purge_expired().await {
        Ok(0) => {}
        Ok(n) => tracing::info!(scheme = authorizer.scheme(), purged = n, "expired tokens purged"),
        Err(e) => tracing::error!(scheme = authorizer.scheme(), "cleanup job failed: {}", e),
    }
}
