//! # JSON Import
//!
//! Bulk-load a JSON document into a table.
//!
//! - object: each member becomes a key
//! - array: each element is pushed onto the table's `OrderedArray`
//! - anything else: ignored

use std::path::Path;
use std::sync::Arc;

use serde_json::Value;

use super::array::OrderedArray;
use crate::adapters::storage::FileCodec;
use crate::core::ArrayResult;
use crate::ports::{Table, TableError};

/// Import `json` into `table`. Returns how many entries were written.
pub async fn import_json(table: Arc<dyn Table>, json: Value) -> ArrayResult<usize> {
    match json {
        Value::Object(members) => {
            let count = members.len();
            for (key, value) in members {
                table.set(&key, value, None).await?;
            }
            tracing::debug!(count, "import.object");
            Ok(count)
        }
        Value::Array(items) => {
            let count = items.len();
            let array = OrderedArray::<Value>::open(table).await?;
            array.concat(items).await?;
            tracing::debug!(count, "import.array");
            Ok(count)
        }
        _ => Ok(0),
    }
}

/// Import a `.json` or `.sifdb` file into `table`.
///
/// A missing file imports nothing. With `delete_after`, the file is removed
/// once imported; failure to remove it is logged, not returned.
pub async fn import_file(
    table: Arc<dyn Table>,
    path: &Path,
    delete_after: bool,
) -> ArrayResult<usize> {
    let codec = FileCodec::from_path(path)
        .ok_or_else(|| TableError::UnsupportedPath(path.display().to_string()))?;

    let text = match tokio::fs::read_to_string(path).await {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(TableError::from(e).into()),
    };
    let json = codec.decode(&text)?;
    let count = import_json(table, json).await?;

    if delete_after {
        if let Err(e) = tokio::fs::remove_file(path).await {
            tracing::warn!(path = %path.display(), error = %e, "import.delete_failed");
        }
    }
    Ok(count)
}
