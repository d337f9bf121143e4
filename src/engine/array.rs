//! # Ordered Array
//!
//! An array-like view over a `Table`.
//!
//! Each element lives in the table under its decimal position (`"0"`,
//! `"1"`, ...). The set of occupied positions is kept in memory and
//! persisted under a reserved key, so the view survives restarts.
//!
//! ## Write discipline
//!
//! `set`, `push`, `delete`, `splice`, `concat`, `clear` and `rebuild_index`
//! run one at a time per array (an async mutex held across their table
//! calls). Reads never take that mutex; the in-memory index set sits behind
//! a plain `RwLock` that is never held across an `.await`.
//!
//! ## Crash windows
//!
//! `set` persists the index record before writing the entry. A crash in
//! between leaves a position that resolves to absence; reads skip it.
//! `rebuild_index` re-derives the record from the table's keys.
//!
//! ## Sharing
//!
//! Two arrays over the same table and key range will corrupt each other.
//! Give each array its own table or namespace.

use std::collections::{BTreeSet, HashSet};
use std::fmt::Display;
use std::hash::Hash;
use std::ops::RangeBounds;
use std::sync::Arc;

use futures::stream::{self, Stream};
use parking_lot::RwLock;
use serde_json::Value;
use tokio::sync::Mutex;

use super::index_set::{self, IndexSet};
use super::snapshot::{materialize, Refresh, SnapshotCell};
use crate::core::config::ArrayConfig;
use crate::core::position::{entry_key, is_entry_key};
use crate::core::{ArrayError, ArrayResult, Element, IntoPosition};
use crate::ports::Table;

/// A disagreement between the index set and the table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Inconsistency {
    /// Indexed position with no entry behind it
    MissingEntry(usize),
    /// Position-shaped key in the table that the index set does not list
    UnindexedEntry(usize),
}

struct Inner<T> {
    table: Arc<dyn Table>,
    config: ArrayConfig,
    indexes: RwLock<IndexSet>,
    writer: Mutex<()>,
    snapshot: SnapshotCell<T>,
}

impl<T: Element> Inner<T> {
    async fn rebuild(&self, ticket: u64) -> ArrayResult<()> {
        let positions = self.indexes.read().to_record();
        let result = materialize(&*self.table, &positions).await;
        let outcome = match result {
            Ok(values) => {
                self.snapshot.install(ticket, values);
                Ok(())
            }
            Err(e) => {
                tracing::warn!(ticket, error = %e, "snapshot.rebuild_failed");
                Err(e)
            }
        };
        self.snapshot.finish(ticket);
        outcome
    }
}

/// Persistent array over a key-value table
///
/// Cloning is cheap and every clone drives the same array.
pub struct OrderedArray<T = Value> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for OrderedArray<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> std::fmt::Debug for OrderedArray<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrderedArray")
            .field("index_key", &self.inner.config.index_key)
            .field("len", &self.inner.indexes.read().len())
            .finish_non_exhaustive()
    }
}

impl<T: Element> OrderedArray<T> {
    /// Open an array over `table` with default configuration
    pub async fn open(table: Arc<dyn Table>) -> ArrayResult<Self> {
        Self::open_with(table, ArrayConfig::default()).await
    }

    /// Open an array over `table`.
    ///
    /// Loads the persisted index set, writing an empty one if none exists,
    /// and starts the first snapshot build.
    pub async fn open_with(table: Arc<dyn Table>, config: ArrayConfig) -> ArrayResult<Self> {
        if is_entry_key(&config.index_key).is_some() {
            return Err(ArrayError::invalid("index key", &config.index_key));
        }

        let indexes = index_set::load(&*table, &config.index_key).await?;
        tracing::debug!(index_key = %config.index_key, len = indexes.len(), "array.open");

        let array = Self {
            inner: Arc::new(Inner {
                table,
                config,
                indexes: RwLock::new(indexes),
                writer: Mutex::new(()),
                snapshot: SnapshotCell::new(),
            }),
        };
        let _ = array.refresh();
        Ok(array)
    }

    /// The backing table
    pub fn table(&self) -> &Arc<dyn Table> {
        &self.inner.table
    }

    /// The configuration
    pub fn config(&self) -> &ArrayConfig {
        &self.inner.config
    }

    // ========================================================================
    // SIZE
    // ========================================================================

    /// Number of occupied positions
    pub fn len(&self) -> usize {
        self.inner.indexes.read().len()
    }

    /// Check if no position is occupied
    pub fn is_empty(&self) -> bool {
        self.inner.indexes.read().is_empty()
    }

    /// Highest occupied position, `None` when empty
    pub fn last_index(&self) -> Option<usize> {
        self.inner.indexes.read().last()
    }

    /// Occupied positions, ascending
    pub fn keys(&self) -> Vec<usize> {
        self.inner.indexes.read().to_record()
    }

    // ========================================================================
    // POSITIONAL ACCESS
    // ========================================================================

    /// Check if `position` is occupied
    pub fn has(&self, position: impl IntoPosition) -> ArrayResult<bool> {
        let position = position.into_position("index")?;
        Ok(self.inner.indexes.read().contains(position))
    }

    /// Get the value at `position`.
    ///
    /// `None` if the position is not occupied, or if its entry has gone
    /// missing (expired, or a crash between index and entry writes).
    pub async fn get(&self, position: impl IntoPosition) -> ArrayResult<Option<T>> {
        let position = position.into_position("index")?;
        if !self.inner.indexes.read().contains(position) {
            return Ok(None);
        }
        self.resolve(position).await
    }

    /// Like `get`, but an occupied position whose entry is missing yields
    /// `default` instead of `None`
    pub async fn get_or(&self, position: impl IntoPosition, default: T) -> ArrayResult<Option<T>> {
        let position = position.into_position("index")?;
        if !self.inner.indexes.read().contains(position) {
            return Ok(None);
        }
        Ok(Some(self.resolve(position).await?.unwrap_or(default)))
    }

    /// Like `get`, but negative positions count back from the end of a fresh
    /// snapshot (`-1` is the last element)
    pub async fn at(&self, position: isize) -> ArrayResult<Option<T>> {
        let values = self.snapshot_fresh().await?;
        let index = if position < 0 {
            values.len().checked_sub(position.unsigned_abs())
        } else {
            Some(position.unsigned_abs())
        };
        Ok(index.and_then(|i| values.get(i).cloned()))
    }

    /// The value at the lowest occupied position
    pub async fn first(&self) -> ArrayResult<Option<T>> {
        let first = self.inner.indexes.read().first();
        match first {
            Some(position) => self.get(position).await,
            None => Ok(None),
        }
    }

    /// The value at the highest occupied position
    pub async fn last(&self) -> ArrayResult<Option<T>> {
        match self.last_index() {
            Some(position) => self.get(position).await,
            None => Ok(None),
        }
    }

    // ========================================================================
    // MUTATION
    // ========================================================================

    /// Set the value at `position`, occupying it if it was free.
    ///
    /// Returns once the entry is written. The snapshot rebuild it triggers
    /// is not awaited; see `settle`.
    pub async fn set(&self, position: impl IntoPosition, value: T) -> ArrayResult<()> {
        let position = position.into_position("index")?;
        let value = serde_json::to_value(value)?;

        let _writer = self.inner.writer.lock().await;
        self.set_locked(position, value).await?;
        self.after_mutation();
        Ok(())
    }

    /// Append at one past the highest position (0 when empty).
    /// Returns the position used.
    pub async fn push(&self, value: T) -> ArrayResult<usize> {
        let value = serde_json::to_value(value)?;

        let _writer = self.inner.writer.lock().await;
        let position = self.push_position()?;
        self.set_locked(position, value).await?;
        self.after_mutation();
        Ok(position)
    }

    /// Push every item, in order
    pub async fn concat<I>(&self, items: I) -> ArrayResult<()>
    where
        I: IntoIterator<Item = T>,
    {
        let values = items
            .into_iter()
            .map(serde_json::to_value)
            .collect::<Result<Vec<_>, _>>()?;

        let _writer = self.inner.writer.lock().await;
        let mut pushed = 0;
        let result = async {
            for value in values {
                let position = self.push_position()?;
                self.set_locked(position, value).await?;
                pushed += 1;
            }
            Ok::<_, ArrayError>(())
        }
        .await;
        if pushed > 0 {
            self.after_mutation();
        }
        result
    }

    fn push_position(&self) -> ArrayResult<usize> {
        self.inner
            .indexes
            .read()
            .next_push()
            .ok_or(ArrayError::PositionOverflow)
    }

    /// Delete the value at `position` and shift every higher position down
    /// by one. Returns false (and changes nothing) if it was not occupied.
    pub async fn delete(&self, position: impl IntoPosition) -> ArrayResult<bool> {
        let position = position.into_position("index")?;

        let _writer = self.inner.writer.lock().await;
        let deleted = self.delete_locked(position).await?;
        if deleted {
            self.after_mutation();
        }
        Ok(deleted)
    }

    /// Remove up to `amount` values starting at `start`.
    ///
    /// Each removal shifts the tail down, so the next value to remove is
    /// always the one now sitting at `start`. Stops early when `start` is
    /// unoccupied. Returns how many values were removed.
    pub async fn splice(
        &self,
        start: impl IntoPosition,
        amount: impl IntoPosition,
    ) -> ArrayResult<usize> {
        let start = start.into_position("index")?;
        let amount = amount.into_position("amount")?;

        let _writer = self.inner.writer.lock().await;
        let mut removed = 0;
        let result = async {
            while removed < amount && self.delete_locked(start).await? {
                removed += 1;
            }
            Ok::<_, ArrayError>(removed)
        }
        .await;
        if removed > 0 {
            self.after_mutation();
        }
        result
    }

    /// Clear the whole backing table and reset the index set.
    ///
    /// This wipes every key the table can see, not just this array's
    /// positions. Scope the table with a namespace if it is shared.
    pub async fn clear(&self) -> ArrayResult<()> {
        let _writer = self.inner.writer.lock().await;
        let table = &*self.inner.table;

        table.clear().await?;
        *self.inner.indexes.write() = IndexSet::new();
        index_set::store(table, &self.inner.config.index_key, &IndexSet::new()).await?;

        tracing::debug!(index_key = %self.inner.config.index_key, "array.clear");
        self.after_mutation();
        Ok(())
    }

    async fn set_locked(&self, position: usize, value: Value) -> ArrayResult<()> {
        let table = &*self.inner.table;

        let grown = {
            let indexes = self.inner.indexes.read();
            (!indexes.contains(position)).then(|| {
                let mut grown = indexes.clone();
                grown.insert(position);
                grown
            })
        };
        if let Some(grown) = grown {
            index_set::store(table, &self.inner.config.index_key, &grown).await?;
            *self.inner.indexes.write() = grown;
        }

        table.set(&entry_key(position), value, None).await?;
        tracing::debug!(position, "array.set");
        Ok(())
    }

    async fn delete_locked(&self, position: usize) -> ArrayResult<bool> {
        let table = &*self.inner.table;

        let plan = self.inner.indexes.read().compact(position);
        let Some(mut plan) = plan else {
            return Ok(false);
        };

        for &(from, to) in &plan.moves {
            match table.get(&entry_key(from)).await? {
                Some(value) => table.set(&entry_key(to), value, None).await?,
                None => {
                    tracing::warn!(position = from, "array.reindex_missing_entry");
                    plan.result.remove(to);
                    plan.stale.push(to);
                }
            }
        }

        for &stale in &plan.stale {
            table.delete(&entry_key(stale)).await?;
        }

        index_set::store(table, &self.inner.config.index_key, &plan.result).await?;
        *self.inner.indexes.write() = plan.result;

        tracing::debug!(position, shifted = plan.moves.len(), "array.reindex");
        Ok(true)
    }

    fn after_mutation(&self) {
        if self.inner.config.refresh_on_mutation {
            let _ = self.refresh();
        }
    }

    // ========================================================================
    // SEARCH
    // ========================================================================

    /// Visit positions ascending and collect matches, stopping once `cap`
    /// have accumulated
    async fn select<F>(&self, mut predicate: F, cap: usize) -> ArrayResult<Vec<(usize, T)>>
    where
        F: FnMut(&T, usize) -> bool,
    {
        let mut hits = Vec::new();
        for position in self.keys() {
            if hits.len() >= cap {
                break;
            }
            if let Some(value) = self.resolve(position).await? {
                if predicate(&value, position) {
                    hits.push((position, value));
                }
            }
        }
        Ok(hits)
    }

    /// Every value passing `predicate`, in position order
    pub async fn filter<F>(&self, predicate: F) -> ArrayResult<Vec<T>>
    where
        F: FnMut(&T, usize) -> bool,
    {
        self.filter_limit(predicate, self.len()).await
    }

    /// Values passing `predicate`, in position order, stopping once
    /// `limit + 1` have matched.
    ///
    /// Asking for `limit` matches can return `limit + 1`.
    pub async fn filter_limit<F>(&self, predicate: F, limit: usize) -> ArrayResult<Vec<T>>
    where
        F: FnMut(&T, usize) -> bool,
    {
        let hits = self.select(predicate, limit.saturating_add(1)).await?;
        Ok(hits.into_iter().map(|(_, value)| value).collect())
    }

    /// First `(position, value)` passing `predicate`
    pub async fn find_entry<F>(&self, predicate: F) -> ArrayResult<Option<(usize, T)>>
    where
        F: FnMut(&T, usize) -> bool,
    {
        Ok(self.select(predicate, 1).await?.into_iter().next())
    }

    /// First value passing `predicate`
    pub async fn find<F>(&self, predicate: F) -> ArrayResult<Option<T>>
    where
        F: FnMut(&T, usize) -> bool,
    {
        Ok(self.find_entry(predicate).await?.map(|(_, value)| value))
    }

    /// Position of the first value passing `predicate`
    pub async fn find_index<F>(&self, predicate: F) -> ArrayResult<Option<usize>>
    where
        F: FnMut(&T, usize) -> bool,
    {
        Ok(self.find_entry(predicate).await?.map(|(position, _)| position))
    }

    /// Check if any value passes `predicate`
    pub async fn some<F>(&self, predicate: F) -> ArrayResult<bool>
    where
        F: FnMut(&T, usize) -> bool,
    {
        Ok(self.find_entry(predicate).await?.is_some())
    }

    /// Check if every value passes `predicate` (true when empty)
    pub async fn every<F>(&self, mut predicate: F) -> ArrayResult<bool>
    where
        F: FnMut(&T, usize) -> bool,
    {
        Ok(self.find_entry(|value, position| !predicate(value, position)).await?.is_none())
    }

    /// Values at positions inside `range`, in position order
    pub async fn slice<R>(&self, range: R) -> ArrayResult<Vec<T>>
    where
        R: RangeBounds<usize>,
    {
        self.filter(|_, position| range.contains(&position)).await
    }

    // ========================================================================
    // TRAVERSAL
    // ========================================================================

    /// Apply `f` to every value, in position order
    pub async fn map<U, F>(&self, mut f: F) -> ArrayResult<Vec<U>>
    where
        F: FnMut(T, usize) -> U,
    {
        let mut mapped = Vec::with_capacity(self.len());
        for position in self.keys() {
            if let Some(value) = self.resolve(position).await? {
                mapped.push(f(value, position));
            }
        }
        Ok(mapped)
    }

    /// Call `f` on every value, in position order
    pub async fn for_each<F>(&self, mut f: F) -> ArrayResult<()>
    where
        F: FnMut(T, usize),
    {
        self.map(|value, position| f(value, position)).await?;
        Ok(())
    }

    /// Stream `(position, value)` pairs in ascending position order.
    ///
    /// Each step reads the live index set and the table, so values written
    /// to positions not yet visited show up. Positions whose entry is
    /// missing are skipped.
    pub fn iter(&self) -> impl Stream<Item = ArrayResult<(usize, T)>> + Send + 'static {
        let array = self.clone();
        stream::unfold(Some(None), move |cursor: Option<Option<usize>>| {
            let array = array.clone();
            async move {
                let mut last = cursor?;
                loop {
                    let next = array.inner.indexes.read().next_after(last);
                    let position = next?;
                    match array.resolve(position).await {
                        Ok(Some(value)) => return Some((Ok((position, value)), Some(Some(position)))),
                        Ok(None) => last = Some(position),
                        Err(e) => return Some((Err(e), None)),
                    }
                }
            }
        })
    }

    /// Values from a fresh snapshot, in reverse position order.
    /// Stored order is untouched.
    pub async fn reverse(&self) -> ArrayResult<Vec<T>> {
        let mut values = self.snapshot_fresh().await?;
        values.reverse();
        Ok(values)
    }

    /// Values from a fresh snapshot, in position order
    pub async fn values(&self) -> ArrayResult<Vec<T>> {
        self.snapshot_fresh().await
    }

    /// Check if a fresh snapshot contains `item`
    pub async fn includes(&self, item: &T) -> ArrayResult<bool>
    where
        T: PartialEq,
    {
        Ok(self.snapshot_fresh().await?.contains(item))
    }

    /// Render a fresh snapshot joined by `separator`
    pub async fn join(&self, separator: &str) -> ArrayResult<String>
    where
        T: Display,
    {
        let values = self.snapshot_fresh().await?;
        Ok(values
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(separator))
    }

    /// Distinct values from a fresh snapshot
    pub async fn to_set(&self) -> ArrayResult<HashSet<T>>
    where
        T: Eq + Hash,
    {
        Ok(self.snapshot_fresh().await?.into_iter().collect())
    }

    // ========================================================================
    // SNAPSHOT
    // ========================================================================

    /// The cached snapshot. Never waits; may lag the latest mutation.
    pub fn snapshot(&self) -> Arc<Vec<T>> {
        self.inner.snapshot.current()
    }

    /// Build a snapshot from current state, install it, and return it
    pub async fn snapshot_fresh(&self) -> ArrayResult<Vec<T>> {
        let ticket = self.inner.snapshot.issue();
        let positions = self.keys();
        let result = materialize(&*self.inner.table, &positions).await;
        if let Ok(values) = &result {
            self.inner.snapshot.install(ticket, values.clone());
        }
        self.inner.snapshot.finish(ticket);
        result
    }

    /// Start a background snapshot rebuild.
    ///
    /// The returned handle may be awaited or dropped. Outside a tokio
    /// runtime nothing is spawned and the handle is already settled.
    pub fn refresh(&self) -> Refresh {
        let ticket = self.inner.snapshot.issue();
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                let inner = self.inner.clone();
                let handle = runtime.spawn(async move { inner.rebuild(ticket).await });
                Refresh::spawned(ticket, handle)
            }
            Err(_) => {
                tracing::warn!(ticket, "snapshot.no_runtime");
                self.inner.snapshot.finish(ticket);
                Refresh::skipped(ticket)
            }
        }
    }

    /// Wait until every rebuild requested so far has settled, so the cached
    /// snapshot reflects all completed mutations
    pub async fn settle(&self) {
        let ticket = self.inner.snapshot.issued();
        self.inner.snapshot.wait_for(ticket).await;
    }

    // ========================================================================
    // CONSISTENCY
    // ========================================================================

    /// Compare the index set against the table's position-shaped keys
    pub async fn audit(&self) -> ArrayResult<Vec<Inconsistency>> {
        let stored: BTreeSet<usize> = self
            .inner
            .table
            .keys()
            .await?
            .iter()
            .filter_map(|key| is_entry_key(key))
            .collect();
        let indexed: BTreeSet<usize> = self.keys().into_iter().collect();

        let missing = indexed
            .difference(&stored)
            .map(|&p| Inconsistency::MissingEntry(p));
        let unindexed = stored
            .difference(&indexed)
            .map(|&p| Inconsistency::UnindexedEntry(p));
        Ok(missing.chain(unindexed).collect())
    }

    /// Re-derive the index set from the table's position-shaped keys and
    /// persist it. Returns the new length.
    pub async fn rebuild_index(&self) -> ArrayResult<usize> {
        let _writer = self.inner.writer.lock().await;
        let table = &*self.inner.table;

        let rebuilt: IndexSet = table
            .keys()
            .await?
            .iter()
            .filter_map(|key| is_entry_key(key))
            .collect();

        index_set::store(table, &self.inner.config.index_key, &rebuilt).await?;
        let len = rebuilt.len();
        *self.inner.indexes.write() = rebuilt;

        tracing::debug!(len, "array.rebuild_index");
        self.after_mutation();
        Ok(len)
    }

    async fn resolve(&self, position: usize) -> ArrayResult<Option<T>> {
        match self.inner.table.get(&entry_key(position)).await? {
            Some(raw) => Ok(Some(serde_json::from_value(raw)?)),
            None => {
                if self.inner.indexes.read().contains(position) {
                    tracing::warn!(position, "array.missing_entry");
                }
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::namespace::Namespaced;
    use crate::adapters::storage::MemoryTable;
    use futures::StreamExt;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use serde_json::json;
    use std::time::Duration;

    fn memory() -> Arc<dyn Table> {
        Arc::new(MemoryTable::new())
    }

    async fn array_of(values: &[&str]) -> OrderedArray<String> {
        let array = OrderedArray::open(memory()).await.unwrap();
        array
            .concat(values.iter().map(|v| v.to_string()))
            .await
            .unwrap();
        array
    }

    fn owned(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[tokio::test]
    async fn test_open_persists_empty_record() {
        let table = memory();
        let array = OrderedArray::<String>::open(table.clone()).await.unwrap();

        assert!(array.is_empty());
        assert_eq!(array.last_index(), None);
        assert_eq!(table.get("indexes").await.unwrap(), Some(json!([])));
    }

    #[tokio::test]
    async fn test_open_rejects_position_shaped_index_key() {
        let config = ArrayConfig::new().with_index_key("42");
        let err = OrderedArray::<String>::open_with(memory(), config)
            .await
            .unwrap_err();

        assert!(err.is_invalid_argument());
    }

    #[tokio::test]
    async fn test_set_and_get() {
        let array = OrderedArray::<String>::open(memory()).await.unwrap();

        assert_eq!(array.get(0).await.unwrap(), None);
        array.set(0, "first value".to_string()).await.unwrap();

        assert_eq!(array.get(0).await.unwrap().as_deref(), Some("first value"));
        assert_eq!(array.get("0").await.unwrap().as_deref(), Some("first value"));
        assert!(array.has(0).unwrap());
        assert!(!array.has(1).unwrap());
    }

    #[tokio::test]
    async fn test_non_numeric_positions_fail_fast() {
        let array = array_of(&["a"]).await;

        assert!(array.get("abc").await.unwrap_err().is_invalid_argument());
        assert!(array.has(-1).unwrap_err().is_invalid_argument());
        assert!(array
            .set("1.5", "x".to_string())
            .await
            .unwrap_err()
            .is_invalid_argument());
        assert!(array.delete("zero").await.unwrap_err().is_invalid_argument());
        assert!(array.splice(0, "two").await.unwrap_err().is_invalid_argument());

        assert_eq!(array.len(), 1);
    }

    #[tokio::test]
    async fn test_contiguity_after_delete() {
        let array = array_of(&["a", "b", "c"]).await;

        assert!(array.delete(0).await.unwrap());

        assert_eq!(array.get(0).await.unwrap().as_deref(), Some("b"));
        assert_eq!(array.get(1).await.unwrap().as_deref(), Some("c"));
        assert_eq!(array.get(2).await.unwrap(), None);
        assert_eq!(array.len(), 2);
        assert!(!array.table().has("2").await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_last_leaves_no_orphan() {
        let array = array_of(&["a", "b", "c"]).await;

        assert!(array.delete(2).await.unwrap());

        assert_eq!(array.keys(), vec![0, 1]);
        assert!(!array.table().has("2").await.unwrap());
        assert!(array.audit().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_absent_is_noop() {
        let array = array_of(&["a", "b"]).await;

        assert!(!array.delete(5).await.unwrap());

        assert_eq!(array.values().await.unwrap(), owned(&["a", "b"]));
        assert_eq!(array.table().get("indexes").await.unwrap(), Some(json!([0, 1])));
    }

    #[tokio::test]
    async fn test_delete_sparse_shifts_in_numeric_order() {
        let array = OrderedArray::<String>::open(memory()).await.unwrap();
        array.set(6, "six".to_string()).await.unwrap();
        array.set(0, "zero".to_string()).await.unwrap();
        array.set(5, "five".to_string()).await.unwrap();

        assert!(array.delete(0).await.unwrap());

        assert_eq!(array.keys(), vec![4, 5]);
        assert_eq!(array.get(4).await.unwrap().as_deref(), Some("five"));
        assert_eq!(array.get(5).await.unwrap().as_deref(), Some("six"));
        assert!(array.audit().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_push_monotonicity() {
        let array = OrderedArray::<String>::open(memory()).await.unwrap();

        assert_eq!(array.push("a".to_string()).await.unwrap(), 0);
        array.set(10, "sparse".to_string()).await.unwrap();
        assert_eq!(array.push("b".to_string()).await.unwrap(), 11);
        assert_eq!(array.last_index(), Some(11));

        array.clear().await.unwrap();
        assert_eq!(array.last_index(), None);
        assert_eq!(array.push("c".to_string()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_clear_wipes_shared_table() {
        let table = memory();
        table.set("unrelated", json!(true), None).await.unwrap();

        let array = OrderedArray::<String>::open(table.clone()).await.unwrap();
        array.push("a".to_string()).await.unwrap();
        array.clear().await.unwrap();

        assert_eq!(table.get("unrelated").await.unwrap(), None);
        assert_eq!(table.get("indexes").await.unwrap(), Some(json!([])));
        assert!(array.is_empty());
    }

    #[tokio::test]
    async fn test_clear_in_namespace_spares_neighbours() {
        let base = memory();
        base.set("unrelated", json!(true), None).await.unwrap();

        let scoped: Arc<dyn Table> = Arc::new(Namespaced::new(base.clone(), "array").unwrap());
        let array = OrderedArray::<String>::open(scoped).await.unwrap();
        array.push("a".to_string()).await.unwrap();
        array.clear().await.unwrap();

        assert_eq!(base.get("unrelated").await.unwrap(), Some(json!(true)));
        assert_eq!(base.get("array:0").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_splice_semantics() {
        let array = array_of(&["a", "b", "c", "d"]).await;

        assert_eq!(array.splice(1, 2).await.unwrap(), 2);

        assert_eq!(array.keys(), vec![0, 1]);
        assert_eq!(array.values().await.unwrap(), owned(&["a", "d"]));
    }

    #[tokio::test]
    async fn test_splice_past_end_stops_early() {
        let array = array_of(&["a", "b", "c"]).await;

        assert_eq!(array.splice(1, 10).await.unwrap(), 2);
        assert_eq!(array.values().await.unwrap(), owned(&["a"]));

        assert_eq!(array.splice(4, 1).await.unwrap(), 0);
        assert_eq!(array.len(), 1);
    }

    #[tokio::test]
    async fn test_filter_limit_off_by_one() {
        let array = array_of(&["apple", "avocado", "apricot", "banana"]).await;

        let hits = array
            .filter_limit(|v, _| v.starts_with('a'), 1)
            .await
            .unwrap();

        assert_eq!(hits, owned(&["apple", "avocado"]));
    }

    #[tokio::test]
    async fn test_filter_returns_all_matches() {
        let array = array_of(&["apple", "avocado", "apricot", "banana"]).await;

        let hits = array.filter(|v, _| v.starts_with('a')).await.unwrap();
        assert_eq!(hits, owned(&["apple", "avocado", "apricot"]));

        let by_position = array.filter(|_, i| i % 2 == 1).await.unwrap();
        assert_eq!(by_position, owned(&["avocado", "banana"]));
    }

    #[tokio::test]
    async fn test_find_family() {
        let array = array_of(&["second value", "third value"]).await;

        assert_eq!(
            array.find(|v, _| v.starts_with("th")).await.unwrap().as_deref(),
            Some("third value")
        );
        assert_eq!(array.find_index(|v, _| v.starts_with("th")).await.unwrap(), Some(1));
        assert_eq!(array.find_index(|v, _| v.is_empty()).await.unwrap(), None);
        assert!(!array.some(|v, _| v.starts_with("sth")).await.unwrap());
        assert!(array.some(|v, _| v.ends_with("value")).await.unwrap());
        assert!(array.every(|v, _| v.ends_with("value")).await.unwrap());
        assert!(!array.every(|v, _| v.starts_with("second")).await.unwrap());
    }

    #[tokio::test]
    async fn test_find_distinguishes_falsy_values_from_absence() {
        let array = OrderedArray::<i64>::open(memory()).await.unwrap();
        array.concat([0, 0, 5]).await.unwrap();

        assert_eq!(array.find(|v, _| *v == 0).await.unwrap(), Some(0));
        assert_eq!(array.find_index(|v, _| *v == 0).await.unwrap(), Some(0));
        assert_eq!(array.find_entry(|v, _| *v > 1).await.unwrap(), Some((2, 5)));
        assert_eq!(array.find(|v, _| *v < 0).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_every_on_empty_is_true() {
        let array = OrderedArray::<i64>::open(memory()).await.unwrap();
        assert!(array.every(|_, _| false).await.unwrap());
    }

    #[tokio::test]
    async fn test_map_and_for_each() {
        let array = array_of(&["x", "y"]).await;

        let mapped = array
            .map(|v, i| format!("{i}: {v}"))
            .await
            .unwrap();
        assert_eq!(mapped, vec!["0: x", "1: y"]);

        let mut seen = Vec::new();
        array.for_each(|v, i| seen.push((i, v))).await.unwrap();
        assert_eq!(seen, vec![(0, "x".to_string()), (1, "y".to_string())]);
    }

    #[tokio::test]
    async fn test_slice() {
        let array = array_of(&["a", "b", "c", "d", "e"]).await;

        assert_eq!(array.slice(1..3).await.unwrap(), owned(&["b", "c"]));
        assert_eq!(array.slice(..2).await.unwrap(), owned(&["a", "b"]));
        assert_eq!(array.slice(3..).await.unwrap(), owned(&["d", "e"]));
        assert_eq!(array.slice(..).await.unwrap().len(), 5);
        assert!(array.slice(7..9).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_first_and_last() {
        let array = OrderedArray::<String>::open(memory()).await.unwrap();
        assert_eq!(array.first().await.unwrap(), None);
        assert_eq!(array.last().await.unwrap(), None);

        array
            .concat(owned(&["first", "middle", "fifth value"]))
            .await
            .unwrap();

        assert_eq!(array.first().await.unwrap().as_deref(), Some("first"));
        assert_eq!(array.last().await.unwrap().as_deref(), Some("fifth value"));
    }

    #[tokio::test]
    async fn test_reverse_does_not_touch_storage() {
        let array = array_of(&["a", "b", "c"]).await;

        assert_eq!(array.reverse().await.unwrap(), owned(&["c", "b", "a"]));
        assert_eq!(array.get(0).await.unwrap().as_deref(), Some("a"));
    }

    #[tokio::test]
    async fn test_at_counts_back_from_end() {
        let array = array_of(&["a", "b", "c"]).await;

        assert_eq!(array.at(0).await.unwrap().as_deref(), Some("a"));
        assert_eq!(array.at(-1).await.unwrap().as_deref(), Some("c"));
        assert_eq!(array.at(-3).await.unwrap().as_deref(), Some("a"));
        assert_eq!(array.at(-4).await.unwrap(), None);
        assert_eq!(array.at(3).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_at_uses_dense_order_over_sparse_positions() {
        let array = OrderedArray::<String>::open(memory()).await.unwrap();
        array.set(3, "three".to_string()).await.unwrap();
        array.set(9, "nine".to_string()).await.unwrap();

        assert_eq!(array.at(-1).await.unwrap().as_deref(), Some("nine"));
        assert_eq!(array.at(1).await.unwrap().as_deref(), Some("nine"));
    }

    #[tokio::test]
    async fn test_includes_join_and_to_set() {
        let array = array_of(&["a", "b", "a"]).await;

        assert!(array.includes(&"b".to_string()).await.unwrap());
        assert!(!array.includes(&"z".to_string()).await.unwrap());
        assert_eq!(array.join(", ").await.unwrap(), "a, b, a");
        assert_eq!(array.to_set().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_round_trip_any_length() {
        for n in [0usize, 1, 7, 32] {
            let array = OrderedArray::<usize>::open(memory()).await.unwrap();
            array.concat(0..n).await.unwrap();

            assert_eq!(array.values().await.unwrap(), (0..n).collect::<Vec<_>>());
            assert_eq!(array.keys(), (0..n).collect::<Vec<_>>());
        }
    }

    #[tokio::test]
    async fn test_snapshot_convergence() {
        let array = array_of(&["a", "b", "c", "d"]).await;
        array.delete(1).await.unwrap();
        array.push("e".to_string()).await.unwrap();
        array.set(0, "A".to_string()).await.unwrap();

        array.settle().await;

        let mut walked = Vec::new();
        for position in array.keys() {
            walked.push(array.get(position).await.unwrap().unwrap());
        }
        assert_eq!(*array.snapshot(), walked);
        assert_eq!(array.snapshot_fresh().await.unwrap(), walked);
    }

    #[tokio::test]
    async fn test_cached_snapshot_lags_without_refresh() {
        let config = ArrayConfig::new().with_refresh_on_mutation(false);
        let array = OrderedArray::<String>::open_with(memory(), config)
            .await
            .unwrap();
        array.settle().await;

        array.push("a".to_string()).await.unwrap();
        assert!(array.snapshot().is_empty());

        array.refresh().settled().await.unwrap();
        assert_eq!(*array.snapshot(), owned(&["a"]));
    }

    #[tokio::test]
    async fn test_refresh_tickets_increase() {
        let array = array_of(&["a"]).await;

        let first = array.refresh();
        let second = array.refresh();
        assert!(second.ticket() > first.ticket());

        first.settled().await.unwrap();
        second.settled().await.unwrap();
        assert_eq!(*array.snapshot(), owned(&["a"]));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_sets_are_serialized() {
        let table = memory();
        let array = OrderedArray::<String>::open(table.clone()).await.unwrap();

        let handles: Vec<_> = (0..16)
            .map(|i| {
                let array = array.clone();
                tokio::spawn(async move { array.set(i, format!("v{i}")).await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(array.keys(), (0..16).collect::<Vec<_>>());
        let record: Vec<usize> =
            serde_json::from_value(table.get("indexes").await.unwrap().unwrap()).unwrap();
        assert_eq!(record, (0..16).collect::<Vec<_>>());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_pushes_get_distinct_positions() {
        let array = OrderedArray::<usize>::open(memory()).await.unwrap();

        let handles: Vec<_> = (0..20)
            .map(|i| {
                let array = array.clone();
                tokio::spawn(async move { array.push(i).await })
            })
            .collect();
        let mut positions = Vec::new();
        for handle in handles {
            positions.push(handle.await.unwrap().unwrap());
        }
        positions.sort();

        assert_eq!(positions, (0..20).collect::<Vec<_>>());
        assert_eq!(array.len(), 20);
    }

    #[tokio::test]
    async fn test_reopen_restores_index_set() {
        let table = memory();
        {
            let array = OrderedArray::<String>::open(table.clone()).await.unwrap();
            array.concat(owned(&["a", "b", "c"])).await.unwrap();
            array.delete(0).await.unwrap();
        }

        let reopened = OrderedArray::<String>::open(table).await.unwrap();
        assert_eq!(reopened.keys(), vec![0, 1]);
        assert_eq!(reopened.values().await.unwrap(), owned(&["b", "c"]));
    }

    #[tokio::test]
    async fn test_iter_sees_positions_written_ahead() {
        let array = array_of(&["a", "b"]).await;

        let mut stream = Box::pin(array.iter());
        let (position, value) = stream.next().await.unwrap().unwrap();
        assert_eq!((position, value.as_str()), (0, "a"));

        array.push("c".to_string()).await.unwrap();

        let rest: Vec<_> = stream
            .map(|item| item.unwrap().1)
            .collect()
            .await;
        assert_eq!(rest, owned(&["b", "c"]));
    }

    #[tokio::test]
    async fn test_push_after_top_position_fails() {
        let array = array_of(&["bottom"]).await;
        array.set(usize::MAX, "top".to_string()).await.unwrap();

        let err = array.push("next".to_string()).await.unwrap_err();
        assert!(matches!(err, ArrayError::PositionOverflow));

        assert_eq!(array.get(0).await.unwrap().as_deref(), Some("bottom"));
        assert_eq!(array.len(), 2);
    }

    #[tokio::test]
    async fn test_iter_stops_at_top_position() {
        let array = OrderedArray::<String>::open(memory()).await.unwrap();
        array.set(0, "zero".to_string()).await.unwrap();
        array
            .set("18446744073709551615", "top".to_string())
            .await
            .unwrap();

        let walked: Vec<_> = array
            .iter()
            .take(5)
            .map(|item| item.unwrap())
            .collect()
            .await;
        assert_eq!(
            walked,
            vec![(0, "zero".to_string()), (usize::MAX, "top".to_string())]
        );
    }

    #[tokio::test]
    async fn test_missing_entry_is_skipped_on_walks() {
        let array = array_of(&["a", "b", "c"]).await;
        array.table().delete("1").await.unwrap();

        assert_eq!(array.get(1).await.unwrap(), None);
        assert_eq!(
            array.get_or(1, "default".to_string()).await.unwrap().as_deref(),
            Some("default")
        );
        assert_eq!(array.get_or(9, "default".to_string()).await.unwrap(), None);
        assert_eq!(array.values().await.unwrap(), owned(&["a", "c"]));
        assert_eq!(
            array.audit().await.unwrap(),
            vec![Inconsistency::MissingEntry(1)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_entry_reads_as_absent() {
        let table = memory();
        let array = OrderedArray::<String>::open(table.clone()).await.unwrap();
        array.push("a".to_string()).await.unwrap();
        table
            .set("1", json!("fleeting"), Some(Duration::from_secs(1)))
            .await
            .unwrap();
        array.rebuild_index().await.unwrap();
        assert_eq!(array.get(1).await.unwrap().as_deref(), Some("fleeting"));

        tokio::time::advance(Duration::from_secs(2)).await;

        assert_eq!(array.get(1).await.unwrap(), None);
        assert_eq!(array.values().await.unwrap(), owned(&["a"]));
    }

    #[tokio::test]
    async fn test_rebuild_index_recovers_unindexed_entries() {
        let table = memory();
        let array = OrderedArray::<String>::open(table.clone()).await.unwrap();
        array.push("a".to_string()).await.unwrap();
        table.set("1", json!("written before crash"), None).await.unwrap();
        table.set("note", json!("not a position"), None).await.unwrap();

        assert_eq!(
            array.audit().await.unwrap(),
            vec![Inconsistency::UnindexedEntry(1)]
        );

        assert_eq!(array.rebuild_index().await.unwrap(), 2);
        assert_eq!(array.keys(), vec![0, 1]);
        assert!(array.audit().await.unwrap().is_empty());
        assert_eq!(table.get("indexes").await.unwrap(), Some(json!([0, 1])));
    }

    #[tokio::test]
    async fn test_decode_failure_surfaces_as_codec_error() {
        let table = memory();
        let array = OrderedArray::<i64>::open(table.clone()).await.unwrap();
        array.push(1).await.unwrap();
        table.set("0", json!("not a number"), None).await.unwrap();

        assert!(matches!(array.get(0).await, Err(ArrayError::Codec(_))));
    }

    #[tokio::test]
    async fn test_untyped_array_holds_any_json() {
        let array = OrderedArray::<Value>::open(memory()).await.unwrap();
        array
            .concat([json!("text"), json!(1), json!({"nested": [1, 2]})])
            .await
            .unwrap();

        assert_eq!(array.get(2).await.unwrap(), Some(json!({"nested": [1, 2]})));
        assert_eq!(array.len(), 3);
    }

    #[tokio::test]
    async fn test_random_operations_match_vec_model() {
        let mut rng = StdRng::seed_from_u64(0x5eed);
        let array = OrderedArray::<u32>::open(memory()).await.unwrap();
        let mut model: Vec<u32> = Vec::new();

        for _ in 0..150 {
            match rng.gen_range(0..4) {
                0 | 1 => {
                    let value = rng.gen();
                    let position = array.push(value).await.unwrap();
                    assert_eq!(position, model.len());
                    model.push(value);
                }
                2 => {
                    let position = rng.gen_range(0..model.len() + 2);
                    let deleted = array.delete(position).await.unwrap();
                    assert_eq!(deleted, position < model.len());
                    if deleted {
                        model.remove(position);
                    }
                }
                _ => {
                    let start = rng.gen_range(0..model.len() + 2);
                    let amount = rng.gen_range(0..4usize);
                    let removed = array.splice(start, amount).await.unwrap();
                    let expected = amount.min(model.len().saturating_sub(start));
                    assert_eq!(removed, expected);
                    let from = start.min(model.len());
                    model.drain(from..from + expected);
                }
            }

            assert_eq!(array.len(), model.len());
            assert_eq!(array.keys(), (0..model.len()).collect::<Vec<_>>());
        }

        assert_eq!(array.values().await.unwrap(), model);
        assert!(array.audit().await.unwrap().is_empty());
    }
}
