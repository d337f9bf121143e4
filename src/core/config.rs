//! # Array Configuration
//!
//! Knobs for an `OrderedArray`. Everything has a sensible default;
//! override with the `with_*` builders.

/// Reserved key the index set is persisted under by default
pub const DEFAULT_INDEX_KEY: &str = "indexes";

/// Configuration for an `OrderedArray`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArrayConfig {
    /// Table key holding the persisted index set.
    ///
    /// Must never look like a position (plain decimal digits), or it would
    /// collide with entry keys.
    pub index_key: String,

    /// Rebuild the materialized snapshot after every mutation.
    ///
    /// When off, the snapshot only changes on `refresh()` or
    /// `snapshot_fresh()`.
    pub refresh_on_mutation: bool,
}

impl ArrayConfig {
    /// Default configuration
    pub fn new() -> Self {
        Self {
            index_key: DEFAULT_INDEX_KEY.to_string(),
            refresh_on_mutation: true,
        }
    }

    /// Persist the index set under a different key
    pub fn with_index_key(mut self, key: impl Into<String>) -> Self {
        self.index_key = key.into();
        self
    }

    /// Toggle background snapshot rebuilds after mutations
    pub fn with_refresh_on_mutation(mut self, enabled: bool) -> Self {
        self.refresh_on_mutation = enabled;
        self
    }
}

impl Default for ArrayConfig {
    fn default() -> Self {
        Self::new()
    }
}
