//! # Engine
//!
//! The orchestration layer that turns a `Table` into an array.
//!
//! This is where:
//! - Positions are tracked in the index set and persisted
//! - Deletions are compacted by reindexing
//! - The materialized snapshot is kept warm
//! - JSON documents are imported

mod array;
mod import;
mod index_set;
mod snapshot;

pub use array::{Inconsistency, OrderedArray};
pub use import::{import_file, import_json};
pub use index_set::{Compaction, IndexSet};
pub use snapshot::Refresh;
