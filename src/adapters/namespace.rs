//! # Namespaced Tables
//!
//! Partitions one physical table into independent sub-tables.
//!
//! Every key is stored as `"<namespace>:<key>"` in the base table.
//! A namespaced view only sees, clears and walks its own keys, which is
//! what lets several arrays share one file without trampling each other's
//! index sets.
//!
//! Namespace names may not contain `':'`, so no namespace's prefix is a
//! prefix of another's. Namespaces do not nest.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, StreamExt, TryStreamExt};
use serde_json::Value;

use crate::ports::{EntryStream, Table, TableError, TableResult};

/// A table restricted to one key prefix of a shared base table
#[derive(Clone)]
pub struct Namespaced {
    base: Arc<dyn Table>,
    namespace: String,
    prefix: String,
}

impl Namespaced {
    /// Wrap `base`, scoping every key under `namespace`.
    ///
    /// Fails with `InvalidNamespace` for an empty name or one containing
    /// `':'`, and with `NamespaceAlreadySet` if `base` is itself scoped.
    pub fn new(base: Arc<dyn Table>, namespace: impl Into<String>) -> TableResult<Self> {
        let namespace = namespace.into();
        if namespace.is_empty() || namespace.contains(':') {
            return Err(TableError::InvalidNamespace(namespace));
        }
        if let Some(outer) = base.namespace() {
            return Err(TableError::NamespaceAlreadySet(format!(
                "{outer} (requested {namespace})"
            )));
        }

        let prefix = format!("{namespace}:");
        Ok(Self {
            base,
            namespace,
            prefix,
        })
    }

    fn scoped(&self, key: &str) -> String {
        format!("{}{key}", self.prefix)
    }

    fn unscoped<'k>(&self, key: &'k str) -> Option<&'k str> {
        key.strip_prefix(self.prefix.as_str())
    }
}

impl std::fmt::Debug for Namespaced {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Namespaced")
            .field("namespace", &self.namespace)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Table for Namespaced {
    async fn get(&self, key: &str) -> TableResult<Option<Value>> {
        self.base.get(&self.scoped(key)).await
    }

    async fn set(&self, key: &str, value: Value, ttl: Option<Duration>) -> TableResult<()> {
        self.base.set(&self.scoped(key), value, ttl).await
    }

    async fn delete(&self, key: &str) -> TableResult<bool> {
        self.base.delete(&self.scoped(key)).await
    }

    async fn clear(&self) -> TableResult<()> {
        let owned: Vec<String> = self
            .base
            .keys()
            .await?
            .into_iter()
            .filter(|key| key.starts_with(self.prefix.as_str()))
            .collect();

        tracing::debug!(namespace = %self.namespace, keys = owned.len(), "namespace.clear");

        for key in owned {
            self.base.delete(&key).await?;
        }
        Ok(())
    }

    fn namespace(&self) -> Option<&str> {
        Some(&self.namespace)
    }

    async fn entries(&self) -> TableResult<EntryStream<'_>> {
        let scoped: Vec<_> = self
            .base
            .entries()
            .await?
            .try_filter_map(|(key, value)| async move {
                Ok::<_, TableError>(self.unscoped(&key).map(|key| (key.to_string(), value)))
            })
            .try_collect()
            .await?;
        Ok(stream::iter(scoped.into_iter().map(Ok)).boxed())
    }
}
