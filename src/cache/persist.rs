//! Optional persistence hook for cache contents.
//!
//! The cache never calls a persistence backend itself. The orchestrator
//! takes a [`snapshot`](super::FingerprintCache::snapshot) and hands it to a
//! [`CachePersistence`] implementation (periodically or on shutdown), so the
//! in-memory behaviour is identical with or without a backend.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::fingerprint::Fingerprint;
use crate::{MimirError, Result};

/// Destination for cache snapshots.
#[async_trait]
pub trait CachePersistence<V: Send + Sync>: Send + Sync {
    /// Persist every given entry, replacing what was stored before.
    async fn persist_all(&self, entries: &[(Fingerprint, V)]) -> Result<()>;
}

/// One persisted entry. The file is a JSON array of these, most recent first.
#[derive(Serialize, Deserialize)]
struct StoredEntry<V> {
    key: String,
    value: V,
}

/// Stores cache snapshots as a JSON array of `{ "key", "value" }` records
/// in recency order, keyed by hex fingerprint.
///
/// Writes go to a sibling temp file first and are renamed into place, so a
/// crash mid-write leaves the previous snapshot intact.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read back a snapshot written by [`persist_all`](CachePersistence::persist_all).
    ///
    /// Entries come back in the order they were written, most recent first.
    /// A missing file is an empty snapshot. Keys that are not valid
    /// fingerprints are skipped with a warning.
    pub async fn load_all<V: DeserializeOwned>(&self) -> Result<Vec<(Fingerprint, V)>> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(MimirError::Storage(format!(
                    "Failed to read cache snapshot {:?}: {e}",
                    self.path
                )));
            }
        };

        let raw: Vec<StoredEntry<V>> = serde_json::from_slice(&bytes)?;
        let mut entries = Vec::with_capacity(raw.len());
        for StoredEntry { key, value } in raw {
            match Fingerprint::from_hex(&key) {
                Some(fp) => entries.push((fp, value)),
                None => warn!(key = %key, path = ?self.path, "skipping malformed snapshot key"),
            }
        }
        debug!(count = entries.len(), path = ?self.path, "loaded cache snapshot");
        Ok(entries)
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl<V> CachePersistence<V> for JsonFileStore
where
    V: Serialize + Send + Sync,
{
    async fn persist_all(&self, entries: &[(Fingerprint, V)]) -> Result<()> {
        let records: Vec<StoredEntry<&V>> = entries
            .iter()
            .map(|(key, value)| StoredEntry {
                key: key.to_hex(),
                value,
            })
            .collect();
        let bytes = serde_json::to_vec_pretty(&records)?;

        let tmp = self.temp_path();
        tokio::fs::write(&tmp, &bytes).await.map_err(|e| {
            MimirError::Storage(format!("Failed to write cache snapshot {tmp:?}: {e}"))
        })?;
        tokio::fs::rename(&tmp, &self.path).await.map_err(|e| {
            MimirError::Storage(format!(
                "Failed to move cache snapshot into place {:?}: {e}",
                self.path
            ))
        })?;

        debug!(count = entries.len(), path = ?self.path, "persisted cache snapshot");
        Ok(())
    }
}
