//! Shared health counters for the /health endpoint.
//! Updated by the webhook handler and the repricing engine.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Default)]
pub struct HealthState {
    pub webhooks_received: AtomicU64,
    pub reprices_completed: AtomicU64,
    pub updates_submitted: AtomicU64,
    pub submit_failures: AtomicU64,
    /// Unix seconds of the last accepted webhook (0 = none).
    pub last_webhook_at: AtomicU64,
    /// Unix seconds of the last finished monitor cycle (0 = none).
    pub last_monitor_cycle_at: AtomicU64,
}

impl HealthState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_webhook(&self, at_secs: u64) {
        self.webhooks_received.fetch_add(1, Ordering::Relaxed);
        self.last_webhook_at.store(at_secs, Ordering::Relaxed);
    }

    pub fn inc_reprices_completed(&self) {
        self.reprices_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_updates_submitted(&self) {
        self.updates_submitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_submit_failures(&self) {
        self.submit_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn set_last_monitor_cycle_at(&self, at_secs: u64) {
        self.last_monitor_cycle_at.store(at_secs, Ordering::Relaxed);
    }

    pub fn webhooks_received(&self) -> u64 {
        self.webhooks_received.load(Ordering::Relaxed)
    }

    pub fn reprices_completed(&self) -> u64 {
        self.reprices_completed.load(Ordering::Relaxed)
    }

    pub fn updates_submitted(&self) -> u64 {
        self.updates_submitted.load(Ordering::Relaxed)
    }

    pub fn submit_failures(&self) -> u64 {
        self.submit_failures.load(Ordering::Relaxed)
    }

    pub fn last_webhook_at(&self) -> u64 {
        self.last_webhook_at.load(Ordering::Relaxed)
    }

    pub fn last_monitor_cycle_at(&self) -> u64 {
        self.last_monitor_cycle_at.load(Ordering::Relaxed)
    }
}
