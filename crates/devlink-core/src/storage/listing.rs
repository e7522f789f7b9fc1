//! Directory views over an [`ObjectStore`].
//!
//! Storage has no real folders: a folder is any shared key prefix, and an
//! empty folder is kept alive by a zero-byte placeholder object.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Serialize;

use super::{Destination, ObjectStore, ProgressSink, RawObject};
use crate::error::{Error, Result};

/// Name of the zero-byte object that keeps an empty folder listed.
pub const FOLDER_PLACEHOLDER: &str = ".emptyFolderPlaceholder";

/// Page size used when walking a device tree.
const WALK_LIST_LIMIT: usize = 1000;

/// A file or folder as shown to the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ObjectEntry {
    /// Entry name
    pub name: String,
    /// Path relative to the device root, starting with `/`
    pub path: String,
    /// Size in bytes; zero for folders
    pub size: u64,
    /// Coarse type: `folder`, `image`, `video`, `audio` or the file extension
    pub kind: String,
    /// Whether the entry is a folder
    pub is_directory: bool,
    /// Last modification time, if known
    pub updated_at: Option<DateTime<Utc>>,
    /// Public download URL for files, when the backend serves one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl ObjectEntry {
    /// Build an entry from a listing row of `destination`.
    #[must_use]
    pub fn from_raw(raw: RawObject, destination: &Destination) -> Self {
        let is_directory = raw.is_folder();
        let path = destination.child_path(&raw.name);
        let (size, mimetype) = raw
            .metadata
            .map(|m| (m.size, m.mimetype.unwrap_or_default()))
            .unwrap_or_default();
        let kind = if is_directory {
            "folder".to_string()
        } else {
            file_kind(&mimetype, &raw.name)
        };

        Self {
            name: raw.name,
            path,
            size: if is_directory { 0 } else { size },
            kind,
            is_directory,
            updated_at: raw.updated_at,
            url: None,
        }
    }
}

/// Classify a file by MIME type, falling back to its lowercased extension.
pub fn file_kind(mimetype: &str, name: &str) -> String {
    for family in ["image", "video", "audio"] {
        if mimetype
            .strip_prefix(family)
            .is_some_and(|rest| rest.starts_with('/'))
        {
            return family.to_string();
        }
    }
    match name.rsplit_once('.') {
        Some((_, ext)) => ext.to_lowercase(),
        None => name.to_lowercase(),
    }
}

/// List the entries directly inside `destination`, hiding folder placeholders.
///
/// Files carry the backend's public URL when it has one.
///
/// # Errors
///
/// Returns the backend error if the listing request fails.
pub async fn list_directory<S: ObjectStore>(
    store: &S,
    destination: &Destination,
    limit: usize,
) -> Result<Vec<ObjectEntry>> {
    let rows = store
        .list_objects(&destination.listing_prefix(), limit)
        .await?;

    Ok(rows
        .into_iter()
        .filter(|row| row.name != FOLDER_PLACEHOLDER)
        .map(|row| {
            let mut entry = ObjectEntry::from_raw(row, destination);
            if !entry.is_directory {
                entry.url = store.public_url(&destination.object_path(&entry.name));
            }
            entry
        })
        .collect())
}

/// Keep the entries whose name contains `query`, ignoring case.
///
/// A blank query keeps everything.
#[must_use]
pub fn filter_by_name(entries: Vec<ObjectEntry>, query: &str) -> Vec<ObjectEntry> {
    let query = query.trim().to_lowercase();
    if query.is_empty() {
        return entries;
    }
    entries
        .into_iter()
        .filter(|entry| entry.name.to_lowercase().contains(&query))
        .collect()
}

/// Every stored object below `prefix` as `(key, size)`, descending into folders.
async fn walk_objects<S: ObjectStore>(store: &S, prefix: String) -> Result<Vec<(String, u64)>> {
    let mut pending = vec![prefix];
    let mut found = Vec::new();

    while let Some(prefix) = pending.pop() {
        for row in store.list_objects(&prefix, WALK_LIST_LIMIT).await? {
            if row.id.is_none() {
                pending.push(format!("{prefix}{}/", row.name));
            } else {
                let size = row.metadata.map_or(0, |m| m.size);
                found.push((format!("{prefix}{}", row.name), size));
            }
        }
    }

    Ok(found)
}

/// Total bytes stored under a device, descending into every folder.
///
/// # Errors
///
/// Returns the backend error if any listing request fails.
pub async fn storage_usage<S: ObjectStore>(store: &S, device_id: &str) -> Result<u64> {
    let used = walk_objects(store, format!("{device_id}/"))
        .await?
        .into_iter()
        .map(|(_, size)| size)
        .sum();

    tracing::debug!("Device {} uses {} bytes", device_id, used);
    Ok(used)
}

/// Create an empty folder `name` inside `destination`.
///
/// Returns the object key of the placeholder that was written.
///
/// # Errors
///
/// Returns [`Error::InvalidPath`] for an empty name or one containing `/`,
/// [`Error::Conflict`] if the folder already has a placeholder, or the
/// backend error.
pub async fn create_folder<S: ObjectStore>(
    store: &S,
    destination: &Destination,
    name: &str,
) -> Result<String> {
    let name = entry_name(name)?;
    let path = destination.join(name).object_path(FOLDER_PLACEHOLDER);
    store
        .put_object(&path, Bytes::new(), false, ProgressSink::discard())
        .await?;

    tracing::info!("Created folder {} in {}", name, destination);
    Ok(path)
}

/// Delete the file or folder `name` inside `destination`.
///
/// A folder goes away with everything stored below it, placeholders
/// included. Returns the object keys that were removed.
///
/// # Errors
///
/// Returns [`Error::InvalidPath`] for a name [`create_folder`] would reject,
/// [`Error::NotFound`] if nothing is stored under `name`, or the backend error.
pub async fn delete_entry<S: ObjectStore>(
    store: &S,
    destination: &Destination,
    name: &str,
) -> Result<Vec<String>> {
    let name = entry_name(name)?;

    let removed = store.remove_objects(&[destination.object_path(name)]).await?;
    if !removed.is_empty() {
        tracing::info!("Deleted {} from {}", name, destination);
        return Ok(removed);
    }

    let keys: Vec<String> = walk_objects(store, destination.join(name).listing_prefix())
        .await?
        .into_iter()
        .map(|(key, _)| key)
        .collect();
    let removed = store.remove_objects(&keys).await?;
    if removed.is_empty() {
        return Err(Error::NotFound(destination.child_path(name)));
    }
    tracing::info!(
        "Deleted folder {} from {} ({} objects)",
        name,
        destination,
        removed.len()
    );
    Ok(removed)
}

/// A single path segment naming an entry of a folder.
fn entry_name(name: &str) -> Result<&str> {
    let name = name.trim();
    if name.is_empty() || name.contains('/') || name == "." || name == ".." {
        return Err(Error::InvalidPath(name.to_string()));
    }
    Ok(name)
}
