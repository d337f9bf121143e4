//! # Storage Adapters
//!
//! Implementations of the Table port for different storage backends.
//!
//! Available adapters:
//! - `MemoryTable` - In-memory HashMap (fast, volatile)
//! - `FileTable` - Single JSON or SIFDB file (persistent, small)

mod file;
mod memory;

pub use file::{FileCodec, FileTable};
pub use memory::MemoryTable;
