//! # File Table Adapter
//!
//! Whole-file table persisted as a single document.
//!
//! Two codecs, picked by file extension:
//! - `.json`  - plain JSON
//! - `.sifdb` - the same JSON, base64-encoded
//!
//! ## Document Format
//!
//! ```text
//! {
//!   "<key>": { "value": <json>, "expires": <unix ms> | null },
//!   ...
//! }
//! ```
//!
//! The document is loaded once at open and rewritten after every mutation.
//! Expired records are hidden from reads and dropped on the next write.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;

use crate::ports::{EntryStream, Table, TableError, TableResult};

/// On-disk encoding of a file table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileCodec {
    /// Plain JSON text
    Json,
    /// Base64-wrapped JSON text
    Sifdb,
}

impl FileCodec {
    /// Pick a codec from the file extension
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension()?.to_str()? {
            "json" => Some(FileCodec::Json),
            "sifdb" => Some(FileCodec::Sifdb),
            _ => None,
        }
    }

    /// Encode a JSON value to file text
    pub fn encode(&self, value: &Value) -> TableResult<String> {
        let json = serde_json::to_string(value)?;
        Ok(match self {
            FileCodec::Json => json,
            FileCodec::Sifdb => STANDARD.encode(json),
        })
    }

    /// Decode file text to a JSON value
    pub fn decode(&self, text: &str) -> TableResult<Value> {
        match self {
            FileCodec::Json => Ok(serde_json::from_str(text)?),
            FileCodec::Sifdb => {
                let bytes = STANDARD.decode(text.trim())?;
                Ok(serde_json::from_slice(&bytes)?)
            }
        }
    }
}

/// One stored record
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Record {
    value: Value,
    #[serde(default)]
    expires: Option<u64>,
}

impl Record {
    fn is_live(&self, now_ms: u64) -> bool {
        self.expires.map_or(true, |at| now_ms < at)
    }
}

type Document = BTreeMap<String, Record>;

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Table persisted to a single JSON or SIFDB file
#[derive(Debug)]
pub struct FileTable {
    path: PathBuf,
    codec: FileCodec,
    document: Mutex<Document>,
}

impl FileTable {
    /// Open the file at `path`, creating an empty table if it does not exist
    pub async fn open(path: impl Into<PathBuf>) -> TableResult<Self> {
        let path = path.into();
        let codec = FileCodec::from_path(&path)
            .ok_or_else(|| TableError::UnsupportedPath(path.display().to_string()))?;

        let document = match tokio::fs::read_to_string(&path).await {
            Ok(text) if text.trim().is_empty() => Document::new(),
            Ok(text) => serde_json::from_value(codec.decode(&text)?)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Document::new(),
            Err(e) => return Err(e.into()),
        };

        tracing::debug!(path = %path.display(), entries = document.len(), "file_table.open");

        Ok(Self {
            path,
            codec,
            document: Mutex::new(document),
        })
    }

    /// The backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The codec in use
    pub fn codec(&self) -> FileCodec {
        self.codec
    }

    /// Sibling file that each rewrite lands in before being renamed over
    /// the real one
    fn staging_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|name| name.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    /// Rewrite the file from `document`. Caller holds the document lock.
    async fn persist(&self, document: &mut Document) -> TableResult<()> {
        let now = now_ms();
        document.retain(|_, record| record.is_live(now));

        let text = self.codec.encode(&serde_json::to_value(&*document)?)?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let staging = self.staging_path();
        tokio::fs::write(&staging, text).await?;
        tokio::fs::rename(&staging, &self.path).await?;

        tracing::trace!(path = %self.path.display(), entries = document.len(), "file_table.persist");
        Ok(())
    }
}

#[async_trait]
impl Table for FileTable {
    async fn get(&self, key: &str) -> TableResult<Option<Value>> {
        let now = now_ms();
        Ok(self
            .document
            .lock()
            .await
            .get(key)
            .filter(|record| record.is_live(now))
            .map(|record| record.value.clone()))
    }

    async fn set(&self, key: &str, value: Value, ttl: Option<Duration>) -> TableResult<()> {
        let expires = ttl.map(|ttl| now_ms().saturating_add(ttl.as_millis() as u64));
        let mut document = self.document.lock().await;
        document.insert(key.to_string(), Record { value, expires });
        self.persist(&mut document).await
    }

    async fn delete(&self, key: &str) -> TableResult<bool> {
        let now = now_ms();
        let mut document = self.document.lock().await;
        let existed = document
            .remove(key)
            .is_some_and(|record| record.is_live(now));
        self.persist(&mut document).await?;
        Ok(existed)
    }

    async fn clear(&self) -> TableResult<()> {
        let mut document = self.document.lock().await;
        document.clear();
        self.persist(&mut document).await
    }

    async fn entries(&self) -> TableResult<EntryStream<'_>> {
        let now = now_ms();
        let live: Vec<_> = self
            .document
            .lock()
            .await
            .iter()
            .filter(|(_, record)| record.is_live(now))
            .map(|(key, record)| Ok((key.clone(), record.value.clone())))
            .collect();
        Ok(stream::iter(live).boxed())
    }
}
