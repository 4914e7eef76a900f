//! Scheduler "beat" (§4.I): the single process-wide planner that snapshots
//! due sources every 30s and emits maintenance tasks on fixed cadences.

use std::time::Duration;

use chrono::Utc;
use sentryfeed_store::Store;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

pub const TICK_INTERVAL: Duration = Duration::from_secs(30);

const PRUNE_SOURCE_CHECKS_AFTER_DAYS: i64 = 90;

/// Tracks last-run instants for cadenced maintenance tasks so the beat loop
/// can stay a single 30s tick without a separate cron thread.
pub struct MaintenanceCadence {
    last_prune: Option<chrono::DateTime<Utc>>,
    last_compact: Option<chrono::DateTime<Utc>>,
    last_health_recompute: Option<chrono::DateTime<Utc>>,
    last_catalog_refresh: Option<chrono::DateTime<Utc>>,
}

impl Default for MaintenanceCadence {
    fn default() -> Self {
        Self {
            last_prune: None,
            last_compact: None,
            last_health_recompute: None,
            last_catalog_refresh: None,
        }
    }
}

impl MaintenanceCadence {
    fn due(last: Option<chrono::DateTime<Utc>>, every: chrono::Duration, now: chrono::DateTime<Utc>) -> bool {
        match last {
            None => true,
            Some(last) => now - last >= every,
        }
    }

    /// Runs any maintenance task whose cadence has elapsed: prune (daily),
    /// compact (weekly), health recompute (hourly), catalog refresh (daily).
    pub async fn run_due(&mut self, store: &Store, now: chrono::DateTime<Utc>) {
        if Self::due(self.last_prune, chrono::Duration::days(1), now) {
            match store.prune_source_checks(PRUNE_SOURCE_CHECKS_AFTER_DAYS).await {
                Ok(n) => info!(rows = n, "pruned stale source_checks rows"),
                Err(e) => warn!(error = %e, "source_checks prune failed"),
            }
            self.last_prune = Some(now);
        }

        if Self::due(self.last_compact, chrono::Duration::weeks(1), now) {
            match store.compact_simhash_buckets().await {
                Ok(n) => info!(rows = n, "compacted duplicate simhash band rows"),
                Err(e) => warn!(error = %e, "simhash compaction failed"),
            }
            self.last_compact = Some(now);
        }

        if Self::due(self.last_health_recompute, chrono::Duration::hours(1), now) {
            info!("health recompute tick (health is derived per-write; this is a no-op sweep placeholder)");
            self.last_health_recompute = Some(now);
        }

        if Self::due(self.last_catalog_refresh, chrono::Duration::days(1), now) {
            info!("catalog refresh due; caller should re-invoke SourceManager::sync with the latest file");
            self.last_catalog_refresh = Some(now);
        }
    }
}

/// Runs the beat loop until `cancel` fires. Each tick snapshots due sources
/// via `on_due_sources` and runs any elapsed maintenance cadence.
pub async fn run_beat<F, Fut>(
    store: &Store,
    cancel: CancellationToken,
    mut on_due_sources: F,
) where
    F: FnMut(Vec<sentryfeed_common::Source>) -> Fut,
    Fut: std::future::Future<Output = ()>,
{
    let mut cadence = MaintenanceCadence::default();
    let mut ticker = tokio::time::interval(TICK_INTERVAL);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let now = Utc::now();
                match store.due_sources(now).await {
                    Ok(due) => on_due_sources(due).await,
                    Err(e) => warn!(error = %e, "due_sources query failed"),
                }
                cadence.run_due(store, now).await;
            }
            _ = cancel.cancelled() => {
                info!("beat loop draining for shutdown");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cadence_fires_on_first_call_and_then_waits() {
        let now = Utc::now();
        assert!(MaintenanceCadence::due(None, chrono::Duration::days(1), now));
        assert!(!MaintenanceCadence::due(Some(now), chrono::Duration::days(1), now));
        assert!(MaintenanceCadence::due(
            Some(now - chrono::Duration::days(2)),
            chrono::Duration::days(1),
            now
        ));
    }
}
