//! # Adapters
//!
//! Swappable implementations of the Table port, plus table plumbing.
//!
//! - Storage adapters: Memory, File (JSON / SIFDB)
//! - Namespaces: key-prefix partitioning of one table
//! - Registry: shared handles keyed by path and namespace
//! - Cached: synchronous per-key read cache over any table
//!
//! The engine only ever sees `Arc<dyn Table>`, so adapters can be swapped
//! without changing array logic.

pub mod cached;
pub mod namespace;
pub mod registry;
pub mod storage;
