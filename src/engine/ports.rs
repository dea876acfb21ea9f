//! Collaborators the repricing engine talks through.
//!
//! Concrete implementations live in `fetcher`, `db::price_store`, `policy` and
//! `submitter`; tests swap in in-memory fakes.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{CompetitorPriceRecord, Observation, ProductPolicy};

/// Live lookup of the competing offer for a product.
#[async_trait]
pub trait PriceSource: Send + Sync {
    /// `Ok(None)` when the page was reachable but carried no usable price.
    async fn fetch(&self, product_id: &str) -> Result<Option<Observation>>;
}

/// Durable competitor prices keyed by product id.
#[async_trait]
pub trait PriceStore: Send + Sync {
    async fn get(&self, product_id: &str) -> Result<Option<CompetitorPriceRecord>>;

    /// Replace the row for `record.product_id`. Safe to repeat.
    async fn put(&self, record: &CompetitorPriceRecord) -> Result<()>;
}

/// One-shot load of every product's bounds.
pub trait PolicySource: Send + Sync {
    fn load_all(&self) -> Result<HashMap<String, ProductPolicy>>;
}

/// Pushes an accepted price to the marketplace.
#[async_trait]
pub trait UpdateSink: Send + Sync {
    async fn submit(&self, product_id: &str, new_price: i64) -> Result<()>;
}
