use std::sync::Arc;
use std::time::Duration;

use tokio::time::{timeout, Instant};
use tracing::{debug, info, warn};

use crate::api::latency::LatencyStats;
use crate::engine::ports::{PriceSource, PriceStore};
use crate::engine::rate_limit::RateLimiter;
use crate::state::PriceCache;
use crate::types::{CompetitorPriceRecord, CompetitorSignal, Observation, SignalSource};

/// Wall clock in unix seconds. Swappable so freshness can be tested at exact boundaries.
pub type Clock = Arc<dyn Fn() -> i64 + Send + Sync>;

pub fn system_clock() -> Clock {
    Arc::new(crate::now_secs)
}

#[derive(Debug, Clone)]
pub struct ResolverSettings {
    pub freshness_window_secs: i64,
    pub cache_ttl: Duration,
    pub min_request_interval: Duration,
    pub request_jitter: Duration,
    pub fetch_timeout: Duration,
    /// Also write live-fetch prices to the store, not just the cache.
    pub persist_live_fetches: bool,
}

/// Layered competitor price lookup:
/// fresh stored record → short-term cache → rate-limited live fetch → absent.
///
/// Never fabricates a price: when every tier comes up empty the signal is `Absent`.
pub struct PriceResolver {
    source: Arc<dyn PriceSource>,
    store: Arc<dyn PriceStore>,
    cache: PriceCache,
    limiter: RateLimiter,
    latency: Arc<LatencyStats>,
    settings: ResolverSettings,
    clock: Clock,
}

impl PriceResolver {
    pub fn new(
        source: Arc<dyn PriceSource>,
        store: Arc<dyn PriceStore>,
        latency: Arc<LatencyStats>,
        settings: ResolverSettings,
    ) -> Self {
        Self {
            source,
            store,
            cache: PriceCache::new(settings.cache_ttl),
            limiter: RateLimiter::new(settings.min_request_interval, settings.request_jitter),
            latency,
            settings,
            clock: system_clock(),
        }
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn cache(&self) -> &PriceCache {
        &self.cache
    }

    pub fn store(&self) -> &Arc<dyn PriceStore> {
        &self.store
    }

    pub fn settings(&self) -> &ResolverSettings {
        &self.settings
    }

    /// Best-available competitor signal for a product, and the tier it came from.
    pub async fn resolve(&self, product_id: &str) -> (CompetitorSignal, SignalSource) {
        // Tier 1: stored / monitored record
        if let Some(obs) = self.fresh_stored(product_id).await {
            debug!(product_id, signal = %CompetitorSignal::from(obs), "Resolved from stored record");
            return (obs.into(), SignalSource::Monitored);
        }

        // Tier 2: this process's own recent live fetches
        if let Some(price) = self.cache.get(product_id) {
            debug!(product_id, price, "Resolved from cache");
            return (CompetitorSignal::Price(price), SignalSource::Cached);
        }

        // Tier 3: live fetch
        match self.live_fetch(product_id).await {
            Some(Observation::Price(price)) => {
                self.cache.insert(product_id, price);
                if self.settings.persist_live_fetches {
                    self.persist(product_id, Observation::Price(price), SignalSource::LiveFetch)
                        .await;
                }
                info!(product_id, price, "Competitor price fetched live: R{price}");
                (CompetitorSignal::Price(price), SignalSource::LiveFetch)
            }
            Some(Observation::OwnsBuybox) => {
                info!(product_id, "Live fetch: we own the buybox");
                (CompetitorSignal::OwnsBuybox, SignalSource::LiveFetch)
            }
            // Tier 4: nothing usable anywhere
            None => {
                warn!(product_id, "No competitor price available from any source");
                (CompetitorSignal::Absent, SignalSource::Fallback)
            }
        }
    }

    /// Skip the stored and cached tiers, fetch live and write the result as a
    /// `monitored` record. Used by the background monitor.
    pub async fn refresh(&self, product_id: &str) -> Option<Observation> {
        let obs = self.live_fetch(product_id).await?;
        if let Observation::Price(price) = obs {
            self.cache.insert(product_id, price);
        } else {
            self.cache.invalidate(product_id);
        }
        self.persist(product_id, obs, SignalSource::Monitored).await;
        Some(obs)
    }

    async fn fresh_stored(&self, product_id: &str) -> Option<Observation> {
        let record = match self.store.get(product_id).await {
            Ok(r) => r?,
            Err(e) => {
                warn!(product_id, "Price store read failed, skipping stored tier: {e}");
                return None;
            }
        };

        let now = (self.clock)();
        if !record.is_fresh(now, self.settings.freshness_window_secs) {
            debug!(
                product_id,
                age_secs = now - record.observed_at,
                "Stored competitor price is stale"
            );
            return None;
        }
        record.observation.is_usable().then_some(record.observation)
    }

    /// Rate-limited, time-bounded call into the price source. Every failure mode
    /// folds into `None`; nothing is surfaced to the caller.
    async fn live_fetch(&self, product_id: &str) -> Option<Observation> {
        self.limiter.acquire().await;

        let started = Instant::now();
        let result = timeout(self.settings.fetch_timeout, self.source.fetch(product_id)).await;
        let elapsed = started.elapsed();

        let obs = match result {
            Ok(Ok(Some(obs))) if obs.is_usable() => {
                self.latency.record(elapsed);
                return Some(obs);
            }
            Ok(Ok(Some(obs))) => {
                warn!(product_id, ?obs, "Live fetch returned an unusable price");
                None
            }
            Ok(Ok(None)) => {
                warn!(product_id, "Live fetch found no competitor price");
                None
            }
            Ok(Err(e)) => {
                warn!(product_id, "Live fetch failed: {e}");
                None
            }
            Err(_) => {
                warn!(
                    product_id,
                    timeout_secs = self.settings.fetch_timeout.as_secs(),
                    "Live fetch timed out"
                );
                None
            }
        };
        self.latency.record_failure();
        obs
    }

    async fn persist(&self, product_id: &str, observation: Observation, source: SignalSource) {
        let record = CompetitorPriceRecord {
            product_id: product_id.to_string(),
            observation,
            observed_at: (self.clock)(),
            source,
        };
        if let Err(e) = self.store.put(&record).await {
            warn!(product_id, "Price store write failed: {e}");
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
