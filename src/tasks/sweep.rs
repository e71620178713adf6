//! TTL Sweep Task
//!
//! Background task that periodically removes expired local cache entries.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::cache::local::StoreState;

/// Spawns a task that sweeps expired entries every `interval`.
///
/// Each tick takes the store's write lock and inspects at most `batch`
/// entries. The task exits once `shutdown` is cancelled.
pub(crate) fn spawn_sweep_task(
    state: Arc<StoreState>,
    interval: Duration,
    batch: usize,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        debug!(?interval, batch, "Starting TTL sweep task");

        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let removed = state.sweep_expired(batch);
            if removed > 0 {
                info!("TTL sweep: removed {} expired entries", removed);
            } else {
                debug!("TTL sweep: no expired entries found");
            }
        }

        debug!("TTL sweep task stopped");
    })
}
