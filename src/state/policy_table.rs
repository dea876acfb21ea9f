use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use crate::types::ProductPolicy;

/// Read-mostly table of product bounds. A reload swaps the whole map at once,
/// so readers see either the old table or the new one, never a mix.
pub struct PolicyTable {
    inner: RwLock<Arc<HashMap<String, ProductPolicy>>>,
}

impl PolicyTable {
    pub fn new(policies: HashMap<String, ProductPolicy>) -> Self {
        Self {
            inner: RwLock::new(Arc::new(policies)),
        }
    }

    pub fn snapshot(&self) -> Arc<HashMap<String, ProductPolicy>> {
        let guard = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&guard)
    }

    pub fn get(&self, product_id: &str) -> Option<ProductPolicy> {
        self.snapshot().get(product_id).cloned()
    }

    /// Replace the whole table. Returns the new product count.
    pub fn replace(&self, policies: HashMap<String, ProductPolicy>) -> usize {
        let count = policies.len();
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        *guard = Arc::new(policies);
        count
    }

    /// Product ids in stable (sorted) order.
    pub fn product_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.snapshot().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }
}
