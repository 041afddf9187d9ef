//! Periodic liveness sweep.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::info;

use super::Dispatcher;

/// Spawn a background task that evicts silent workers every `interval`.
///
/// Takes the dispatcher's lock on each tick, so it never races request
/// handling.
pub fn spawn_liveness_sweep(dispatcher: Arc<Dispatcher>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(
            interval_secs = interval.as_secs_f64(),
            timeout_secs = dispatcher.heartbeat_timeout().as_secs_f64(),
            "Liveness sweep started"
        );
        let mut tick = tokio::time::interval(interval);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tick.tick().await;
            let evicted = dispatcher.sweep().await;
            if !evicted.is_empty() {
                info!(count = evicted.len(), workers = ?evicted, "Liveness sweep evicted workers");
            }
        }
    })
}
