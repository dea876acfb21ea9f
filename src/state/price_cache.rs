use std::time::Duration;

use dashmap::DashMap;
use tokio::time::Instant;

// ---------------------------------------------------------------------------
// PriceCache
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
struct CacheEntry {
    price: f64,
    stored_at: Instant,
}

/// Short-term cache of competitor prices obtained by this process's own live fetches.
/// Only numeric prices are cached; an owned buybox is never stored here.
/// Writes are last-writer-wins per product.
pub struct PriceCache {
    /// product_id → last live-fetched price
    entries: DashMap<String, CacheEntry>,
    ttl: Duration,
}

impl PriceCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    /// Unexpired price for a product. Expired entries are evicted on read.
    pub fn get(&self, product_id: &str) -> Option<f64> {
        let entry = *self.entries.get(product_id)?;
        if entry.stored_at.elapsed() < self.ttl {
            return Some(entry.price);
        }
        self.entries
            .remove_if(product_id, |_, e| e.stored_at.elapsed() >= self.ttl);
        None
    }

    pub fn insert(&self, product_id: &str, price: f64) {
        self.entries.insert(
            product_id.to_string(),
            CacheEntry {
                price,
                stored_at: Instant::now(),
            },
        );
    }

    pub fn invalidate(&self, product_id: &str) {
        self.entries.remove(product_id);
    }

    /// Drop every expired entry. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, e| e.stored_at.elapsed() < self.ttl);
        before.saturating_sub(self.entries.len())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
