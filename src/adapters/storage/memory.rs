//! # Memory Table Adapter
//!
//! In-memory table using a HashMap.
//! Fast, but volatile (data lost on shutdown).
//!
//! Good for:
//! - Testing
//! - Scratch arrays that never need to outlive the process
//!
//! Expiry is measured on the tokio clock, so paused-time tests can drive it.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use parking_lot::RwLock;
use serde_json::Value;
use tokio::time::Instant;

use crate::ports::{EntryStream, Table, TableResult};

/// A stored value and when it stops being visible
#[derive(Debug, Clone)]
struct Slot {
    value: Value,
    expires_at: Option<Instant>,
}

impl Slot {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| now < at)
    }
}

/// In-memory table adapter
#[derive(Debug, Default)]
pub struct MemoryTable {
    slots: RwLock<HashMap<String, Slot>>,
}

impl MemoryTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live entries
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.slots.read().values().filter(|slot| slot.is_live(now)).count()
    }

    /// Check if the table has no live entries
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every expired slot
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut slots = self.slots.write();
        let before = slots.len();
        slots.retain(|_, slot| slot.is_live(now));
        before - slots.len()
    }
}

#[async_trait]
impl Table for MemoryTable {
    async fn get(&self, key: &str) -> TableResult<Option<Value>> {
        let now = Instant::now();
        Ok(self
            .slots
            .read()
            .get(key)
            .filter(|slot| slot.is_live(now))
            .map(|slot| slot.value.clone()))
    }

    async fn set(&self, key: &str, value: Value, ttl: Option<Duration>) -> TableResult<()> {
        let expires_at = ttl.map(|ttl| Instant::now() + ttl);
        self.slots
            .write()
            .insert(key.to_string(), Slot { value, expires_at });
        Ok(())
    }

    async fn delete(&self, key: &str) -> TableResult<bool> {
        let now = Instant::now();
        Ok(self
            .slots
            .write()
            .remove(key)
            .is_some_and(|slot| slot.is_live(now)))
    }

    async fn clear(&self) -> TableResult<()> {
        self.slots.write().clear();
        Ok(())
    }

    async fn entries(&self) -> TableResult<EntryStream<'_>> {
        let now = Instant::now();
        let live: Vec<_> = self
            .slots
            .read()
            .iter()
            .filter(|(_, slot)| slot.is_live(now))
            .map(|(key, slot)| Ok((key.clone(), slot.value.clone())))
            .collect();
        Ok(stream::iter(live).boxed())
    }
}
