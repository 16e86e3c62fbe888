use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tracing::{debug, info, warn};

use crate::engine::Engine;
use crate::model::Ms;

/// Wall clock in Unix milliseconds. A clock before the epoch reads as 0.
pub fn now_ms() -> Ms {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as Ms)
        .unwrap_or(0)
}

/// One sweep against the wall clock.
pub async fn sweep_once(engine: &Engine) -> usize {
    match engine.sweep_expired_holds(now_ms()).await {
        Ok(n) => n,
        Err(e) => {
            warn!("sweep failed: {e}");
            0
        }
    }
}

/// Background task that expires lapsed holds every `every`.
pub async fn run_sweeper(engine: Arc<Engine>, every: Duration) {
    let mut interval = tokio::time::interval(every);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        interval.tick().await;
        let expired = sweep_once(&engine).await;
        if expired == 0 {
            debug!("sweep: nothing lapsed");
        }
    }
}

/// Compact the WAL once it has taken `threshold` appends since the last compaction.
pub async fn compact_if_due(engine: &Engine, threshold: u64) -> bool {
    let appends = engine.wal_appends_since_compact().await;
    if appends < threshold {
        return false;
    }
    match engine.compact_wal().await {
        Ok(()) => {
            metrics::counter!(crate::observability::WAL_COMPACTIONS_TOTAL).increment(1);
            info!("compacted WAL after {appends} appends");
            true
        }
        Err(e) => {
            warn!("WAL compaction failed: {e}");
            false
        }
    }
}

/// Background task that checks every 30s whether the WAL is due for compaction.
pub async fn run_compactor(engine: Arc<Engine>, threshold: u64) {
    let mut interval = tokio::time::interval(Duration::from_secs(30));
    loop {
        interval.tick().await;
        compact_if_due(&engine, threshold).await;
    }
}
