//! # Table Registry
//!
//! Keyed cache of open tables, so every opener of the same
//! `(path, namespace)` pair shares one handle and one in-memory document.
//!
//! Lifecycle: an entry is created on first open and never evicted.
//! Path-less opens are not cached; each one gets a fresh `MemoryTable`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use tokio::sync::Mutex;

use super::namespace::Namespaced;
use super::storage::{FileCodec, FileTable, MemoryTable};
use crate::ports::{Table, TableError, TableResult};

type RegistryKey = (PathBuf, Option<String>);

/// Shared handles to open tables
#[derive(Default)]
pub struct TableRegistry {
    tables: Mutex<HashMap<RegistryKey, Arc<dyn Table>>>,
}

impl TableRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide registry
    pub fn global() -> &'static TableRegistry {
        static GLOBAL: OnceLock<TableRegistry> = OnceLock::new();
        GLOBAL.get_or_init(TableRegistry::new)
    }

    /// Open (or reuse) the table for `path`, optionally scoped to `namespace`.
    ///
    /// - `None` path: a fresh, unshared `MemoryTable`
    /// - `*.json` / `*.sifdb`: one `FileTable` per path
    /// - anything else: `TableError::UnsupportedPath`
    pub async fn open(
        &self,
        path: Option<&Path>,
        namespace: Option<&str>,
    ) -> TableResult<Arc<dyn Table>> {
        let Some(path) = path else {
            let table: Arc<dyn Table> = Arc::new(MemoryTable::new());
            return Ok(match namespace {
                Some(ns) => Arc::new(Namespaced::new(table, ns)?),
                None => table,
            });
        };

        if FileCodec::from_path(path).is_none() {
            return Err(TableError::UnsupportedPath(path.display().to_string()));
        }

        let mut tables = self.tables.lock().await;
        let key = (path.to_path_buf(), namespace.map(str::to_string));
        if let Some(table) = tables.get(&key) {
            tracing::trace!(path = %path.display(), namespace, "registry.hit");
            return Ok(table.clone());
        }

        let base_key = (path.to_path_buf(), None);
        let base = match tables.get(&base_key) {
            Some(base) => base.clone(),
            None => {
                let base: Arc<dyn Table> = Arc::new(FileTable::open(path).await?);
                tables.insert(base_key, base.clone());
                base
            }
        };

        let table = match namespace {
            Some(ns) => {
                let scoped: Arc<dyn Table> = Arc::new(Namespaced::new(base, ns)?);
                tables.insert(key, scoped.clone());
                scoped
            }
            None => base,
        };

        tracing::debug!(path = %path.display(), namespace, "registry.open");
        Ok(table)
    }

    /// Number of cached handles (base tables and namespaces)
    pub async fn len(&self) -> usize {
        self.tables.lock().await.len()
    }

    /// Check if nothing has been opened yet
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
