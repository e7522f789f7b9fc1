//! In-process object store.
//!
//! Used by `devlink upload --dry-run` and by tests. With a throughput set,
//! uploads are paced so progress, speed and ETA behave like a real transfer.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::{ObjectMetadata, ObjectStore, ProgressSink, RawObject};
use crate::error::{Error, Result};

#[derive(Debug, Clone)]
struct StoredObject {
    id: Uuid,
    data: Bytes,
    updated_at: DateTime<Utc>,
}

/// Object store keeping everything in memory.
#[derive(Debug)]
pub struct MemoryObjectStore {
    objects: Mutex<BTreeMap<String, StoredObject>>,
    bytes_per_sec: Option<u64>,
    chunk_size: usize,
}

impl MemoryObjectStore {
    /// Create an empty store that accepts uploads instantly.
    #[must_use]
    pub fn new() -> Self {
        Self {
            objects: Mutex::new(BTreeMap::new()),
            bytes_per_sec: None,
            chunk_size: crate::DEFAULT_CHUNK_SIZE,
        }
    }

    /// Pace uploads at roughly `bytes_per_sec`, reporting after every `chunk_size` bytes.
    #[must_use]
    pub fn with_throughput(mut self, bytes_per_sec: u64, chunk_size: usize) -> Self {
        self.bytes_per_sec = Some(bytes_per_sec.max(1));
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Contents of the object at `path`.
    pub fn get(&self, path: &str) -> Option<Bytes> {
        self.lock().get(path).map(|o| o.data.clone())
    }

    /// All stored object keys, sorted.
    pub fn paths(&self) -> Vec<String> {
        self.lock().keys().cloned().collect()
    }

    /// Number of stored objects.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether the store holds nothing.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, StoredObject>> {
        self.objects.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn chunk_delay(&self, len: usize) -> Option<Duration> {
        self.bytes_per_sec
            .map(|rate| Duration::from_secs_f64(len as f64 / rate as f64))
    }
}

impl Default for MemoryObjectStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ObjectStore for MemoryObjectStore {
    async fn put_object(
        &self,
        path: &str,
        payload: Bytes,
        overwrite: bool,
        progress: ProgressSink,
    ) -> Result<()> {
        let path = path.trim_start_matches('/');
        if path.is_empty() || path.ends_with('/') {
            return Err(Error::InvalidPath(path.to_string()));
        }
        if !overwrite && self.lock().contains_key(path) {
            return Err(Error::Conflict(path.to_string()));
        }

        let total = payload.len();
        let mut sent = 0usize;
        while sent < total {
            let len = self.chunk_size.min(total - sent);
            if let Some(delay) = self.chunk_delay(len) {
                tokio::time::sleep(delay).await;
            }
            sent += len;
            progress.report(sent as u64);
        }

        let mut objects = self.lock();
        if !overwrite && objects.contains_key(path) {
            return Err(Error::Conflict(path.to_string()));
        }
        objects.insert(
            path.to_string(),
            StoredObject {
                id: Uuid::new_v4(),
                data: payload,
                updated_at: Utc::now(),
            },
        );
        Ok(())
    }

    async fn list_objects(&self, prefix: &str, limit: usize) -> Result<Vec<RawObject>> {
        let prefix = prefix.trim_start_matches('/');
        let prefix = if prefix.is_empty() || prefix.ends_with('/') {
            prefix.to_string()
        } else {
            format!("{prefix}/")
        };

        let objects = self.lock();
        let mut rows: BTreeMap<String, RawObject> = BTreeMap::new();
        for (key, object) in objects.range(prefix.clone()..) {
            let Some(rest) = key.strip_prefix(&prefix) else {
                break;
            };
            match rest.split_once('/') {
                Some((folder, _)) => {
                    rows.entry(folder.to_string()).or_insert_with(|| RawObject {
                        name: folder.to_string(),
                        id: None,
                        updated_at: None,
                        metadata: None,
                    });
                }
                None => {
                    rows.insert(
                        rest.to_string(),
                        RawObject {
                            name: rest.to_string(),
                            id: Some(object.id.to_string()),
                            updated_at: Some(object.updated_at),
                            metadata: Some(ObjectMetadata {
                                size: object.data.len() as u64,
                                mimetype: mime_guess::from_path(rest)
                                    .first()
                                    .map(|m| m.to_string()),
                            }),
                        },
                    );
                }
            }
        }

        Ok(rows.into_values().take(limit).collect())
    }

    async fn get_object(&self, path: &str) -> Result<Bytes> {
        let path = path.trim_start_matches('/');
        self.get(path)
            .ok_or_else(|| Error::NotFound(path.to_string()))
    }

    async fn remove_objects(&self, paths: &[String]) -> Result<Vec<String>> {
        let mut objects = self.lock();
        Ok(paths
            .iter()
            .map(|path| path.trim_start_matches('/'))
            .filter(|path| objects.remove(*path).is_some())
            .map(str::to_string)
            .collect())
    }
}
