//! Background timers sharing the state with the event path: the compactor
//! and the periodic snapshot writer.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::clock;
use crate::metrics::Metrics;
use crate::snapshot::SnapshotStore;
use crate::state::BotState;

pub fn spawn_compactor(state: Arc<BotState>, metrics: Arc<Metrics>, interval_ms: u64) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_millis(interval_ms.max(1)));
        // the first tick completes immediately
        interval.tick().await;
        loop {
            interval.tick().await;
            let report = state.sweep(clock::now_ms());
            metrics.inc_sweeps();
            if report.total() > 0 {
                info!(
                    "Compaction evicted {} entries (activity {}, flood {}, status {}, rate limits {})",
                    report.total(),
                    report.activity,
                    report.flood,
                    report.status,
                    report.rate_limits
                );
            } else {
                debug!("Compaction found nothing to evict");
            }
        }
    })
}

pub fn spawn_snapshots(
    state: Arc<BotState>,
    store: Arc<SnapshotStore>,
    metrics: Arc<Metrics>,
    interval_ms: u64,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_millis(interval_ms.max(1)));
        interval.tick().await;
        loop {
            interval.tick().await;
            save_snapshot(&state, &store, &metrics).await;
        }
    })
}

/// Captures and writes one snapshot. A failed write is logged and the next
/// checkpoint retries.
pub async fn save_snapshot(state: &BotState, store: &SnapshotStore, metrics: &Metrics) -> bool {
    let snapshot = state.snapshot(clock::now_ms());
    match store.save(&snapshot).await {
        Ok(()) => {
            metrics.inc_snapshots();
            debug!("Snapshot saved to {}", store.path().display());
            true
        }
        Err(e) => {
            metrics.inc_snapshot_failures();
            warn!("Failed to save snapshot to {}: {}", store.path().display(), e);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use std::sync::atomic::Ordering;

    #[tokio::test]
    async fn test_save_failure_is_counted_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        // a regular file where the snapshot directory should be
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "x").unwrap();

        let state = BotState::new(&Config::default());
        let metrics = Metrics::new();
        let store = SnapshotStore::new(blocker.join("snapshot.json"));

        assert!(!save_snapshot(&state, &store, &metrics).await);
        assert_eq!(metrics.snapshot_failures.load(Ordering::Relaxed), 1);

        let store = SnapshotStore::new(dir.path().join("snapshot.json"));
        assert!(save_snapshot(&state, &store, &metrics).await);
        assert_eq!(metrics.snapshots_saved.load(Ordering::Relaxed), 1);
    }
}
