//! Object storage abstraction.
//!
//! Uploads land in a bucket of a storage service, keyed by
//! `{device_id}/{folder}/{file_name}`. The pipeline only needs two calls from
//! a backend: put a binary payload at a path (optionally overwriting) while
//! reporting how many bytes have been handed to the transport, and list the
//! objects under a prefix. Browsing a device folder also fetches and removes
//! objects.
//!
//! ## Backends
//!
//! - [`HttpObjectStore`] - BaaS storage REST endpoint over HTTP
//! - [`MemoryObjectStore`] - in-process store with optional simulated bandwidth

pub mod http;
pub mod listing;
pub mod memory;

pub use http::HttpObjectStore;
pub use listing::{
    create_folder, delete_entry, filter_by_name, list_directory, storage_usage, ObjectEntry,
    FOLDER_PLACEHOLDER,
};
pub use memory::MemoryObjectStore;

use std::future::Future;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::Result;

/// A storage backend the upload pipeline can write to.
pub trait ObjectStore: Send + Sync + 'static {
    /// Store `payload` at `path`.
    ///
    /// Implementations call [`ProgressSink::report`] with the cumulative
    /// number of bytes sent as the body is streamed. When `overwrite` is
    /// false and an object already exists at `path`, the call fails.
    fn put_object(
        &self,
        path: &str,
        payload: Bytes,
        overwrite: bool,
        progress: ProgressSink,
    ) -> impl Future<Output = Result<()>> + Send;

    /// List the direct children of `prefix`, at most `limit` rows, sorted by name.
    fn list_objects(
        &self,
        prefix: &str,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<RawObject>>> + Send;

    /// Fetch the object stored at `path`.
    ///
    /// Fails with [`Error::NotFound`](crate::Error::NotFound) when nothing is stored there.
    fn get_object(&self, path: &str) -> impl Future<Output = Result<Bytes>> + Send;

    /// Delete the objects at `paths` and return the keys that were actually removed.
    ///
    /// Keys with nothing stored under them are skipped rather than treated as errors.
    fn remove_objects(
        &self,
        paths: &[String],
    ) -> impl Future<Output = Result<Vec<String>>> + Send;

    /// Publicly reachable download URL for `path`, when the backend serves one.
    fn public_url(&self, _path: &str) -> Option<String> {
        None
    }
}

/// Receives cumulative byte counts from a backend during an upload.
#[derive(Debug, Clone)]
pub struct ProgressSink {
    tx: Option<mpsc::UnboundedSender<u64>>,
}

impl ProgressSink {
    /// Create a sink forwarding every report into `tx`.
    #[must_use]
    pub fn new(tx: mpsc::UnboundedSender<u64>) -> Self {
        Self { tx: Some(tx) }
    }

    /// A sink that drops every report.
    #[must_use]
    pub fn discard() -> Self {
        Self { tx: None }
    }

    /// Report that `bytes_sent` bytes of the payload have been handed off so far.
    pub fn report(&self, bytes_sent: u64) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(bytes_sent);
        }
    }
}

/// One row of a raw listing, in the shape the storage REST API returns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawObject {
    /// Name relative to the listed prefix
    pub name: String,
    /// Object id; `None` for folders
    #[serde(default)]
    pub id: Option<String>,
    /// Last modification time
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    /// File metadata; `None` for folders
    #[serde(default)]
    pub metadata: Option<ObjectMetadata>,
}

impl RawObject {
    /// Whether this row stands for a folder rather than a stored file.
    pub fn is_folder(&self) -> bool {
        self.id.is_none() || self.metadata.is_none()
    }
}

/// File metadata attached to a listing row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectMetadata {
    /// Size in bytes
    #[serde(default)]
    pub size: u64,
    /// MIME type recorded at upload
    #[serde(default)]
    pub mimetype: Option<String>,
}

/// Where uploads go: a device's storage root plus a folder below it.
///
/// The pair is treated as an opaque prefix; access to the device is checked
/// elsewhere before anything is uploaded.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Destination {
    device_id: String,
    folder: String,
}

impl Destination {
    /// Create a destination. `folder` is normalised to `/` or `/a/b`.
    #[must_use]
    pub fn new(device_id: impl Into<String>, folder: impl AsRef<str>) -> Self {
        Self {
            device_id: device_id.into(),
            folder: normalize_folder(folder.as_ref()),
        }
    }

    /// The device's storage root.
    #[must_use]
    pub fn root(device_id: impl Into<String>) -> Self {
        Self::new(device_id, "/")
    }

    /// Device identifier.
    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    /// Folder below the device root, always starting with `/`.
    pub fn folder(&self) -> &str {
        &self.folder
    }

    /// Whether this destination is the device root.
    pub fn is_root(&self) -> bool {
        self.folder == "/"
    }

    /// Object key prefix, ending with `/`.
    #[must_use]
    pub fn prefix(&self) -> String {
        if self.is_root() {
            format!("{}/", self.device_id)
        } else {
            format!("{}{}/", self.device_id, self.folder)
        }
    }

    /// Prefix as sent to the listing API.
    #[must_use]
    pub fn listing_prefix(&self) -> String {
        self.prefix().trim_start_matches('/').to_string()
    }

    /// Full object key for a file placed in this folder.
    #[must_use]
    pub fn object_path(&self, file_name: &str) -> String {
        format!("{}{}", self.prefix(), file_name.trim_start_matches('/'))
    }

    /// Path of a child entry relative to the device root.
    #[must_use]
    pub fn child_path(&self, name: &str) -> String {
        if self.is_root() {
            format!("/{name}")
        } else {
            format!("{}/{name}", self.folder)
        }
    }

    /// Destination for a subfolder of this one.
    #[must_use]
    pub fn join(&self, name: &str) -> Self {
        Self::new(self.device_id.clone(), self.child_path(name))
    }
}

impl std::fmt::Display for Destination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.device_id, self.folder)
    }
}

fn normalize_folder(folder: &str) -> String {
    let trimmed = folder.trim().trim_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        format!("/{trimmed}")
    }
}
