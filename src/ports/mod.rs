//! # Ports
//!
//! Trait contracts the engine depends on. Adapters implement them.
//!
//! There is one port: `Table`, an async string-keyed store of JSON values
//! with optional per-entry expiry. Tables make no ordering promise across
//! keys; ordering is the engine's job.

use std::time::Duration;

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::TryStreamExt;
use serde_json::Value;
use thiserror::Error;

/// Errors from table operations
#[derive(Debug, Error)]
pub enum TableError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("base64 error: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("unsupported table path: {0}")]
    UnsupportedPath(String),

    #[error("namespace already set: {0}")]
    NamespaceAlreadySet(String),

    #[error("invalid namespace {0:?}: must be non-empty and contain no ':'")]
    InvalidNamespace(String),
}

pub type TableResult<T> = Result<T, TableError>;

/// One `(key, value)` pair from a table walk
pub type Entry = (String, Value);

/// Unordered, finite stream of a table's live entries
pub type EntryStream<'a> = BoxStream<'a, TableResult<Entry>>;

/// Async key-value table
///
/// Every call may suspend. Expired entries behave exactly like absent ones.
#[async_trait]
pub trait Table: Send + Sync {
    /// Get a value by key
    async fn get(&self, key: &str) -> TableResult<Option<Value>>;

    /// Set a value, optionally expiring after `ttl`
    async fn set(&self, key: &str, value: Value, ttl: Option<Duration>) -> TableResult<()>;

    /// Delete a key, returning whether it was present
    async fn delete(&self, key: &str) -> TableResult<bool>;

    /// Remove every entry this table can see
    async fn clear(&self) -> TableResult<()>;

    /// Walk all live entries. Each call starts a fresh walk.
    async fn entries(&self) -> TableResult<EntryStream<'_>>;

    /// The namespace this table is scoped to, if any
    fn namespace(&self) -> Option<&str> {
        None
    }

    /// Get a value, falling back to `default` when absent
    async fn get_or(&self, key: &str, default: Value) -> TableResult<Value> {
        Ok(self.get(key).await?.unwrap_or(default))
    }

    /// Check if a key is present
    async fn has(&self, key: &str) -> TableResult<bool> {
        Ok(self.get(key).await?.is_some())
    }

    /// Collect every live key
    async fn keys(&self) -> TableResult<Vec<String>> {
        self.entries().await?.map_ok(|(key, _)| key).try_collect().await
    }

    /// Collect every live value
    async fn values(&self) -> TableResult<Vec<Value>> {
        self.entries().await?.map_ok(|(_, value)| value).try_collect().await
    }
}
