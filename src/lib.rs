//! # Sifbase
//!
//! > Arrays that live in a key-value store
//!
//! Sifbase gives a sparse async key-value table an ordered, array-like
//! face. Every element is still an ordinary entry (`"0"`, `"1"`, ...), so
//! get/set/delete cost what the table costs, not what the array length
//! costs.
//!
//! ## Philosophy
//!
//! - **Position is a key** - No hidden layout, each element is one entry
//! - **Contiguous after every delete** - Removal shifts the tail down
//! - **Pure core, swappable adapters** - Hexagonal architecture
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        SIFBASE                               │
//! ├─────────────────────────────────────────────────────────────┤
//! │                                                              │
//! │  CORE (pure types, no I/O)                                  │
//! │    IntoPosition, Element, ArrayConfig, ArrayError           │
//! │                                                              │
//! │  PORTS (trait contracts)                                     │
//! │    Table                                                     │
//! │                                                              │
//! │  ADAPTERS (swappable implementations)                       │
//! │    Storage: Memory, File (JSON / SIFDB)                     │
//! │    Namespaced, Cached, TableRegistry                        │
//! │                                                              │
//! │  ENGINE (orchestration)                                      │
//! │    OrderedArray, IndexSet, snapshot, import                 │
//! │                                                              │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use sifbase::{MemoryTable, OrderedArray};
//!
//! let array = OrderedArray::<String>::open(Arc::new(MemoryTable::new())).await?;
//!
//! array.push("first".into()).await?;
//! array.push("second".into()).await?;
//! array.delete(0).await?;
//!
//! assert_eq!(array.get(0).await?.as_deref(), Some("second"));
//! ```

// ============================================================================
// MODULES
// ============================================================================

/// Core domain - pure types, no I/O
/// Contains: IntoPosition, Element, ArrayConfig, ArrayError
pub mod core;

/// Port definitions - trait contracts for adapters
/// Contains: Table trait, TableError
pub mod ports;

/// Adapter implementations - swappable components
/// Contains: storage, namespace, cached, registry submodules
pub mod adapters;

/// Engine - orchestration layer
/// Contains: OrderedArray and its index set and snapshot
pub mod engine;

// ============================================================================
// RE-EXPORTS (public API)
// ============================================================================

// Core types
pub use crate::core::config::ArrayConfig;
pub use crate::core::{ArrayError, ArrayResult, Element, IntoPosition};

// Port traits
pub use crate::ports::{Table, TableError, TableResult};

// Adapters
pub use crate::adapters::cached::Cached;
pub use crate::adapters::namespace::Namespaced;
pub use crate::adapters::registry::TableRegistry;
pub use crate::adapters::storage::{FileCodec, FileTable, MemoryTable};

// Engine
pub use crate::engine::{import_file, import_json, Inconsistency, OrderedArray, Refresh};
