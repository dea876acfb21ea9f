use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{info, warn};

use crate::engine::RepricingEngine;
use crate::types::Observation;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CycleStats {
    pub refreshed: usize,
    pub owns_buybox: usize,
    pub failed: usize,
}

/// Keeps the monitored tier warm: every `interval` it re-fetches each configured
/// product through the resolver (same rate limiter as webhook lookups) and writes
/// the result to the price store.
///
/// A product that fails is logged and skipped; the cycle carries on.
pub struct PriceMonitor {
    engine: Arc<RepricingEngine>,
    interval: Duration,
}

impl PriceMonitor {
    pub fn new(engine: Arc<RepricingEngine>, interval: Duration) -> Self {
        Self { engine, interval }
    }

    /// Runs one cycle immediately, then every `interval` until `shutdown` flips to true
    /// or its sender is dropped.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    tokio::select! {
                        _ = self.run_cycle() => {}
                        _ = wait_for_shutdown(&mut shutdown) => break,
                    }
                }
                _ = wait_for_shutdown(&mut shutdown) => break,
            }
        }
        info!("Price monitor stopped");
    }

    pub async fn run_cycle(&self) -> CycleStats {
        let ids = self.engine.policies().product_ids();
        let mut stats = CycleStats::default();

        for product_id in &ids {
            match self.engine.resolver().refresh(product_id).await {
                Some(Observation::Price(_)) => stats.refreshed += 1,
                Some(Observation::OwnsBuybox) => stats.owns_buybox += 1,
                None => {
                    warn!(product_id = %product_id, "Monitor: no price this cycle, skipping");
                    stats.failed += 1;
                }
            }
        }

        let purged = self.engine.resolver().cache().purge_expired();
        self.engine.health().set_last_monitor_cycle_at(crate::now_secs().max(0) as u64);

        info!(
            products = ids.len(),
            refreshed = stats.refreshed,
            owns_buybox = stats.owns_buybox,
            failed = stats.failed,
            cache_purged = purged,
            "Monitor cycle complete: {}/{} products refreshed",
            stats.refreshed + stats.owns_buybox,
            ids.len(),
        );
        stats
    }
}

/// Resolves once shutdown is requested. A dropped sender counts as shutdown.
async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow_and_update() {
            return;
        }
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::engine::resolver::tests::{MemoryStore, ScriptedSource};
    use crate::engine::tests::{engine_with, RecordingSink};
    use crate::error::AppError;
    use crate::types::SignalSource;

    #[tokio::test(start_paused = true)]
    async fn cycle_refreshes_every_product_and_tolerates_failures() {
        // Policies are 1001 and 1002; ids are visited in sorted order.
        let source = Arc::new(ScriptedSource::new(vec![
            Err(AppError::Fetch("timeout".to_string())),
            Ok(Some(Observation::Price(150.0))),
        ]));
        let store = Arc::new(MemoryStore::default());
        let engine = Arc::new(engine_with(
            Arc::clone(&source),
            Arc::clone(&store),
            Arc::new(RecordingSink::default()),
        ));

        let stats = PriceMonitor::new(Arc::clone(&engine), Duration::from_secs(1800))
            .run_cycle()
            .await;

        assert_eq!(stats, CycleStats { refreshed: 1, owns_buybox: 0, failed: 1 });
        assert!(store.record("1001").is_none());
        let rec = store.record("1002").unwrap();
        assert_eq!(rec.source, SignalSource::Monitored);
        assert!(engine.health().last_monitor_cycle_at() > 0);
    }

    #[tokio::test(start_paused = true)]
    async fn runs_on_interval_until_shutdown() {
        let source = Arc::new(ScriptedSource::always(Observation::Price(150.0), 100));
        let engine = Arc::new(engine_with(
            Arc::clone(&source),
            Arc::new(MemoryStore::default()),
            Arc::new(RecordingSink::default()),
        ));
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(PriceMonitor::new(engine, Duration::from_secs(1800)).run(rx));

        // First cycle runs immediately: two products, spaced by the rate limiter.
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(source.calls(), 2);

        tokio::time::sleep(Duration::from_secs(1800)).await;
        assert_eq!(source.calls(), 4);

        tx.send(true).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_sender_stops_monitor() {
        let engine = Arc::new(engine_with(
            Arc::new(ScriptedSource::default()),
            Arc::new(MemoryStore::default()),
            Arc::new(RecordingSink::default()),
        ));
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(PriceMonitor::new(engine, Duration::from_secs(60)).run(rx));
        drop(tx);
        handle.await.unwrap();
    }
}
