//! Periodic replay of the result buffer.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use crate::service::TaskHostService;

/// Spawn a task replaying buffered results every `interval`.
pub fn spawn_replay_loop(service: Arc<TaskHostService>, interval: Duration) -> JoinHandle<()> {
    info!(interval_secs = interval.as_secs(), "Starting result replay loop");
    tokio::spawn(run_replay_loop(service, interval))
}

async fn run_replay_loop(service: Arc<TaskHostService>, interval: Duration) {
    let mut interval_timer = tokio::time::interval(interval);
    interval_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        interval_timer.tick().await;

        if let Err(e) = service.replay().await {
            warn!(error = %e, "Result replay failed");
        }
    }
}
