//! # Index Set
//!
//! The ordered set of occupied positions for one array, and its durable
//! record in the table.
//!
//! ## Invariant
//!
//! Every member has an entry in the table under its decimal key, and every
//! decimal key the array wrote is a member. Positions need not be contiguous
//! (direct `set` may leave gaps), but they are always visited ascending.
//!
//! ## Record
//!
//! Persisted under a reserved key as a plain JSON array of integers,
//! ascending, no duplicates.

use std::collections::BTreeSet;

use serde_json::Value;

use crate::core::ArrayResult;
use crate::ports::Table;

/// Occupied positions, kept sorted ascending
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexSet {
    positions: BTreeSet<usize>,
}

/// What deleting one position does to the rest of the set
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Compaction {
    /// `(from, to)` moves, in the order they must run
    pub moves: Vec<(usize, usize)>,
    /// The set once every move has landed
    pub result: IndexSet,
    /// Keys no longer referenced by `result` that must be dropped from the table
    pub stale: Vec<usize>,
}

impl IndexSet {
    /// Create an empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a persisted record. Order and duplicates are normalized.
    pub fn from_record(record: Vec<usize>) -> Self {
        Self {
            positions: record.into_iter().collect(),
        }
    }

    /// The persisted form: ascending, unique
    pub fn to_record(&self) -> Vec<usize> {
        self.positions.iter().copied().collect()
    }

    pub fn contains(&self, position: usize) -> bool {
        self.positions.contains(&position)
    }

    /// Add a position; true if it was new
    pub fn insert(&mut self, position: usize) -> bool {
        self.positions.insert(position)
    }

    /// Remove a position; true if it was present
    pub fn remove(&mut self, position: usize) -> bool {
        self.positions.remove(&position)
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn first(&self) -> Option<usize> {
        self.positions.first().copied()
    }

    /// Highest occupied position
    pub fn last(&self) -> Option<usize> {
        self.positions.last().copied()
    }

    /// Where `push` lands: one past the highest position, or 0.
    /// `None` when the highest position is `usize::MAX`.
    pub fn next_push(&self) -> Option<usize> {
        match self.last() {
            None => Some(0),
            Some(last) => last.checked_add(1),
        }
    }

    /// Smallest member strictly greater than `position`, or the first member
    /// when `position` is `None`
    pub fn next_after(&self, position: Option<usize>) -> Option<usize> {
        match position {
            None => self.first(),
            Some(p) => {
                let from = p.checked_add(1)?;
                self.positions.range(from..).next().copied()
            }
        }
    }

    /// Ascending iterator over members
    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.positions.iter().copied()
    }

    /// Plan the removal of `removed` and the shift-down of everything above it.
    ///
    /// Every member greater than `removed` moves to `member - 1`. Moves are
    /// ordered ascending by source, so each destination is either the
    /// removed slot or a slot whose value has already moved on.
    ///
    /// Returns `None` if `removed` is not a member.
    pub fn compact(&self, removed: usize) -> Option<Compaction> {
        if !self.contains(removed) {
            return None;
        }

        let mut moves = Vec::new();
        let mut result = BTreeSet::new();
        for position in self.iter().filter(|&p| p != removed) {
            if position > removed {
                moves.push((position, position - 1));
                result.insert(position - 1);
            } else {
                result.insert(position);
            }
        }

        let stale = self
            .positions
            .iter()
            .copied()
            .filter(|p| !result.contains(p))
            .collect();

        Some(Compaction {
            moves,
            result: IndexSet { positions: result },
            stale,
        })
    }
}

impl FromIterator<usize> for IndexSet {
    fn from_iter<I: IntoIterator<Item = usize>>(iter: I) -> Self {
        Self {
            positions: iter.into_iter().collect(),
        }
    }
}

// ============================================================================
// PERSISTENCE
// ============================================================================

/// Load the record under `key`. A missing record is written as empty first,
/// so a brand-new array never fails on absent metadata.
pub(crate) async fn load(table: &dyn Table, key: &str) -> ArrayResult<IndexSet> {
    match table.get(key).await? {
        Some(record) => {
            let positions: Vec<usize> = serde_json::from_value(record)?;
            Ok(IndexSet::from_record(positions))
        }
        None => {
            tracing::debug!(key, "index_set.init");
            store(table, key, &IndexSet::new()).await?;
            Ok(IndexSet::new())
        }
    }
}

/// Overwrite the record under `key` with `set`
pub(crate) async fn store(table: &dyn Table, key: &str, set: &IndexSet) -> ArrayResult<()> {
    let record = Value::from(set.to_record());
    table.set(key, record, None).await?;
    tracing::trace!(key, len = set.len(), "index_set.store");
    Ok(())
}
