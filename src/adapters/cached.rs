//! # Cached Tables
//!
//! Wraps a table with a synchronous, per-key read cache.
//!
//! Values are recorded whenever they pass through `get` or `set`, and
//! evicted by `delete` and `clear`. The cache can then be read without
//! awaiting, either key by key or as a raw array of its position-shaped keys.
//!
//! Only traffic through this wrapper is seen: writes made directly to the
//! base table, and expiry, do not update the cache.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;

use crate::core::position::is_entry_key;
use crate::ports::{EntryStream, Table, TableResult};

/// A table that remembers the last value seen for each key
pub struct Cached {
    base: Arc<dyn Table>,
    cache: RwLock<HashMap<String, Value>>,
}

impl Cached {
    /// Wrap `base` with an empty cache
    pub fn new(base: Arc<dyn Table>) -> Self {
        Self {
            base,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// The wrapped table
    pub fn base(&self) -> &Arc<dyn Table> {
        &self.base
    }

    /// Last value seen for `key`, without touching the base table
    pub fn cached(&self, key: &str) -> Option<Value> {
        self.cache.read().get(key).cloned()
    }

    /// Number of cached keys
    pub fn cached_len(&self) -> usize {
        self.cache.read().len()
    }

    /// Cached values under position-shaped keys (`"0"`, `"1"`, ...),
    /// ascending by position. Gaps between positions are skipped.
    pub fn as_array(&self) -> Vec<Value> {
        let cache = self.cache.read();
        let positioned: BTreeMap<usize, &Value> = cache
            .iter()
            .filter_map(|(key, value)| is_entry_key(key).map(|position| (position, value)))
            .collect();
        positioned.into_values().cloned().collect()
    }
}

impl std::fmt::Debug for Cached {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cached")
            .field("cached", &self.cache.read().len())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Table for Cached {
    async fn get(&self, key: &str) -> TableResult<Option<Value>> {
        let value = self.base.get(key).await?;
        let mut cache = self.cache.write();
        match &value {
            Some(value) => {
                cache.insert(key.to_string(), value.clone());
            }
            None => {
                cache.remove(key);
            }
        }
        Ok(value)
    }

    async fn set(&self, key: &str, value: Value, ttl: Option<Duration>) -> TableResult<()> {
        self.base.set(key, value.clone(), ttl).await?;
        self.cache.write().insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> TableResult<bool> {
        self.cache.write().remove(key);
        self.base.delete(key).await
    }

    async fn clear(&self) -> TableResult<()> {
        self.cache.write().clear();
        tracing::trace!("cached.clear");
        self.base.clear().await
    }

    async fn entries(&self) -> TableResult<EntryStream<'_>> {
        self.base.entries().await
    }

    fn namespace(&self) -> Option<&str> {
        self.base.namespace()
    }
}
