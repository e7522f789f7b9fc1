//! Transfer units: one per submitted file.

use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::estimator::Estimate;

/// Unique identifier of a transfer unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UnitId(Uuid);

impl UnitId {
    /// Generate a fresh identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for UnitId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for UnitId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle state of a transfer unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadStatus {
    /// Waiting for its turn
    Queued,
    /// Bytes are being sent
    Uploading,
    /// Stored successfully
    Completed,
    /// Rejected or never reached storage
    Failed,
    /// Stopped by the user; skipped by the queue until resumed
    Paused,
}

impl UploadStatus {
    /// Whether the unit has reached an end state.
    #[must_use]
    pub const fn is_finished(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl std::fmt::Display for UploadStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Queued => "queued",
            Self::Uploading => "uploading",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Paused => "paused",
        };
        f.write_str(s)
    }
}

/// A file handed to the pipeline.
#[derive(Debug, Clone)]
pub struct FilePayload {
    /// File name, used as the last path segment of the object key
    pub name: String,
    /// File contents
    pub data: Bytes,
}

impl FilePayload {
    /// Create a payload.
    pub fn new(name: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            data: data.into(),
        }
    }

    /// Payload size in bytes.
    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }
}

/// Read-only view of a transfer unit, as published to observers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnitSnapshot {
    /// Unit identifier
    pub id: UnitId,
    /// File name
    pub name: String,
    /// Total bytes
    pub size: u64,
    /// Current state
    pub status: UploadStatus,
    /// Percentage 0-100
    pub progress: u8,
    /// Bytes acknowledged so far
    pub uploaded_size: u64,
    /// Smoothed speed in bytes per second
    pub speed: f64,
    /// Estimated time remaining; `None` while speed is unknown
    #[serde(with = "super::duration_secs")]
    pub time_remaining: Option<Duration>,
    /// When the file was submitted
    pub enqueued_at: DateTime<Utc>,
    /// Object key the file is written to
    pub object_path: String,
    /// Number of attempts started
    pub attempts: u32,
    /// Reason of the last failure
    pub error: Option<String>,
}

/// A file moving through the pipeline.
///
/// Mutators keep `progress`, `uploaded_size` and `status` consistent; the
/// session is the only owner.
#[derive(Debug)]
pub(crate) struct TransferUnit {
    id: UnitId,
    name: String,
    payload: Bytes,
    status: UploadStatus,
    uploaded_size: u64,
    speed: f64,
    time_remaining: Option<Duration>,
    enqueued_at: DateTime<Utc>,
    object_path: String,
    attempts: u32,
    error: Option<String>,
    cancel: Option<CancellationToken>,
}

impl TransferUnit {
    pub(crate) fn new(file: FilePayload, object_path: String) -> Self {
        Self {
            id: UnitId::new(),
            name: file.name,
            payload: file.data,
            status: UploadStatus::Queued,
            uploaded_size: 0,
            speed: 0.0,
            time_remaining: None,
            enqueued_at: Utc::now(),
            object_path,
            attempts: 0,
            error: None,
            cancel: None,
        }
    }

    pub(crate) fn id(&self) -> UnitId {
        self.id
    }

    pub(crate) fn status(&self) -> UploadStatus {
        self.status
    }

    pub(crate) fn size(&self) -> u64 {
        self.payload.len() as u64
    }

    pub(crate) fn attempts(&self) -> u32 {
        self.attempts
    }

    pub(crate) fn object_path(&self) -> &str {
        &self.object_path
    }

    pub(crate) fn payload(&self) -> Bytes {
        self.payload.clone()
    }

    /// Enter `Uploading` with zeroed progress and a fresh cancellation token.
    pub(crate) fn begin_attempt(&mut self) -> (u32, CancellationToken) {
        let token = CancellationToken::new();
        self.attempts += 1;
        self.status = UploadStatus::Uploading;
        self.uploaded_size = 0;
        self.speed = 0.0;
        self.time_remaining = None;
        self.error = None;
        self.cancel = Some(token.clone());
        (self.attempts, token)
    }

    pub(crate) fn record_progress(&mut self, loaded: u64) {
        self.uploaded_size = loaded.min(self.size());
    }

    pub(crate) fn record_estimate(&mut self, estimate: Estimate) {
        self.speed = estimate.speed;
        self.time_remaining = estimate.time_remaining;
    }

    pub(crate) fn complete(&mut self) {
        self.status = UploadStatus::Completed;
        self.uploaded_size = self.size();
        self.settle();
    }

    pub(crate) fn fail(&mut self, reason: String) {
        self.status = UploadStatus::Failed;
        self.error = Some(reason);
        self.settle();
    }

    /// Stop the unit in place, keeping the bytes already counted.
    pub(crate) fn pause(&mut self) {
        self.status = UploadStatus::Paused;
        self.settle();
    }

    /// Put a paused unit back in line; the next attempt starts from zero.
    pub(crate) fn requeue(&mut self) {
        self.status = UploadStatus::Queued;
        self.uploaded_size = 0;
        self.settle();
    }

    /// Signal the in-flight attempt, if any, to stop.
    pub(crate) fn abort(&self) -> bool {
        match &self.cancel {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    fn settle(&mut self) {
        self.speed = 0.0;
        self.time_remaining = None;
        self.cancel = None;
    }

    pub(crate) fn snapshot(&self) -> UnitSnapshot {
        UnitSnapshot {
            id: self.id,
            name: self.name.clone(),
            size: self.size(),
            status: self.status,
            progress: if self.status == UploadStatus::Completed {
                100
            } else {
                percent(self.uploaded_size, self.size())
            },
            uploaded_size: self.uploaded_size,
            speed: self.speed,
            time_remaining: self.time_remaining,
            enqueued_at: self.enqueued_at,
            object_path: self.object_path.clone(),
            attempts: self.attempts,
            error: self.error.clone(),
        }
    }
}

/// Rounded percentage of `loaded` over `total`; zero for empty files.
pub(crate) fn percent(loaded: u64, total: u64) -> u8 {
    if total == 0 {
        return 0;
    }
    let loaded = u128::from(loaded.min(total));
    let total = u128::from(total);
    let scaled = (loaded * 100 + total / 2) / total;
    u8::try_from(scaled).unwrap_or(100)
}
