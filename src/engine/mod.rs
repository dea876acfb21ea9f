pub mod decision;
pub mod ports;
pub mod rate_limit;
pub mod resolver;

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::api::health::HealthState;
use crate::error::Result;
use crate::state::PolicyTable;
use crate::submitter::{submit_with_retry, RetryPolicy};
use crate::types::{
    CompetitorSignal, PriceChangeEvent, PricingRequest, RepriceLogEntry, RepriceOutcome,
};

use self::decision::evaluate;
use self::ports::{PolicySource, UpdateSink};
use self::resolver::PriceResolver;

/// Everything a webhook needs to reprice one product. Built once at startup and
/// shared by handle with the HTTP handlers and the background monitor.
pub struct RepricingEngine {
    policies: PolicyTable,
    policy_source: Arc<dyn PolicySource>,
    resolver: PriceResolver,
    sink: Arc<dyn UpdateSink>,
    retry: RetryPolicy,
    log_tx: Option<mpsc::Sender<RepriceLogEntry>>,
    health: Arc<HealthState>,
}

impl RepricingEngine {
    /// Loads the initial policy table from `policy_source`. A source that cannot be
    /// read leaves the table empty until a later reload succeeds.
    pub fn new(
        policy_source: Arc<dyn PolicySource>,
        resolver: PriceResolver,
        sink: Arc<dyn UpdateSink>,
        retry: RetryPolicy,
        health: Arc<HealthState>,
    ) -> Self {
        let initial = match policy_source.load_all() {
            Ok(policies) => policies,
            Err(e) => {
                error!("Product policies unavailable, starting with none: {e}");
                HashMap::new()
            }
        };
        Self {
            policies: PolicyTable::new(initial),
            policy_source,
            resolver,
            sink,
            retry,
            log_tx: None,
            health,
        }
    }

    /// Send every completed run to the reprice log writer.
    pub fn with_log(mut self, log_tx: mpsc::Sender<RepriceLogEntry>) -> Self {
        self.log_tx = Some(log_tx);
        self
    }

    pub fn policies(&self) -> &PolicyTable {
        &self.policies
    }

    pub fn resolver(&self) -> &PriceResolver {
        &self.resolver
    }

    pub fn health(&self) -> &Arc<HealthState> {
        &self.health
    }

    /// Re-read the policy source and swap the table. On failure the old table stays.
    pub fn reload_policies(&self) -> Result<usize> {
        let fresh = self.policy_source.load_all()?;
        let count = self.policies.replace(fresh);
        info!(products = count, "Product policies reloaded");
        Ok(count)
    }

    /// Resolve → decide → submit-if-changed for one price-change event.
    /// Operational problems degrade to an outcome; nothing here errors.
    pub async fn process(&self, event: PriceChangeEvent) -> RepriceOutcome {
        let PriceChangeEvent {
            product_id,
            my_current_price,
        } = event;

        let Some(policy) = self.policies.get(&product_id) else {
            warn!(product_id = %product_id, "No product policy configured, skipping");
            self.finish(RepriceLogEntry {
                product_id,
                my_price: my_current_price,
                signal: CompetitorSignal::Absent,
                source: None,
                result: None,
                outcome: RepriceOutcome::SkippedNoPolicy,
                created_at: crate::now_secs(),
            });
            return RepriceOutcome::SkippedNoPolicy;
        };

        let (signal, source) = self.resolver.resolve(&product_id).await;
        let result = evaluate(&PricingRequest {
            my_price: my_current_price,
            signal,
            policy: &policy,
        });

        info!(
            product_id = %product_id,
            my_price = my_current_price,
            competitor = %signal,
            source = %source,
            min_price = policy.min_price,
            max_price = policy.max_price,
            new_price = result.new_price,
            rule = %result.rule_applied,
            "Decision: {} → R{}",
            result.rule_applied,
            result.new_price,
        );

        let outcome = if !result.changed {
            info!(product_id = %product_id, "Price already optimal at R{}", result.new_price);
            RepriceOutcome::Unchanged
        } else if submit_with_retry(self.sink.as_ref(), &product_id, result.new_price, &self.retry).await {
            self.health.inc_updates_submitted();
            RepriceOutcome::Updated
        } else {
            self.health.inc_submit_failures();
            RepriceOutcome::SubmitFailed
        };

        self.finish(RepriceLogEntry {
            product_id,
            my_price: my_current_price,
            signal,
            source: Some(source),
            result: Some(result),
            outcome,
            created_at: crate::now_secs(),
        });
        outcome
    }

    fn finish(&self, entry: RepriceLogEntry) {
        self.health.inc_reprices_completed();
        if let Some(tx) = &self.log_tx {
            if let Err(e) = tx.try_send(entry) {
                warn!("Reprice log channel full: {e}");
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
