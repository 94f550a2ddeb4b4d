use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::app::activity::ActivityLogger;

/// Drains the activity-log queue on a fixed interval. Runs until the task
/// is dropped; the final drain on shutdown is the caller's job.
pub async fn run(logger: ActivityLogger, interval: Duration) {
    info!(interval_ms = interval.as_millis() as u64, "activity log flusher started");
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // first tick completes immediately
    ticker.tick().await;

    loop {
        ticker.tick().await;
        let drained = logger.flush().await;
        if drained > 0 {
            debug!(drained = drained, "periodic activity log flush");
        }
    }
}
