//! Batch-wide statistics derived from the live units.

use std::time::Duration;

use serde::Serialize;

use super::estimator::time_remaining;
use super::unit::{UnitSnapshot, UploadStatus};

/// Aggregate progress of every unit in the session.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchStats {
    /// Number of units
    pub total_files: usize,
    /// Units stored successfully
    pub completed_files: usize,
    /// Units that failed
    pub failed_files: usize,
    /// Units currently sending bytes
    pub uploading_files: usize,
    /// Units paused by the user
    pub paused_files: usize,
    /// Units waiting their turn
    pub queued_files: usize,
    /// Sum of unit sizes
    pub total_size: u64,
    /// Sum of uploaded bytes
    pub uploaded_size: u64,
    /// Sum of the speeds of uploading units, bytes per second
    pub overall_speed: f64,
    /// Remaining bytes over `overall_speed`; `None` when speed is zero
    #[serde(with = "super::duration_secs")]
    pub overall_time_remaining: Option<Duration>,
    /// `uploaded_size / total_size * 100`; zero for an empty batch
    pub overall_progress: f64,
}

impl BatchStats {
    /// Compute statistics over `units`.
    pub fn from_units<'a>(units: impl IntoIterator<Item = &'a UnitSnapshot>) -> Self {
        let mut stats = Self::default();
        for unit in units {
            stats.total_files += 1;
            stats.total_size += unit.size;
            stats.uploaded_size += unit.uploaded_size;
            match unit.status {
                UploadStatus::Completed => stats.completed_files += 1,
                UploadStatus::Failed => stats.failed_files += 1,
                UploadStatus::Paused => stats.paused_files += 1,
                UploadStatus::Queued => stats.queued_files += 1,
                UploadStatus::Uploading => {
                    stats.uploading_files += 1;
                    stats.overall_speed += unit.speed;
                }
            }
        }

        stats.overall_time_remaining = time_remaining(
            stats.total_size.saturating_sub(stats.uploaded_size),
            stats.overall_speed,
        );
        stats.overall_progress = if stats.total_size == 0 {
            0.0
        } else {
            stats.uploaded_size as f64 / stats.total_size as f64 * 100.0
        };
        stats
    }

    /// Whether anything is queued or uploading.
    pub fn is_active(&self) -> bool {
        self.uploading_files > 0 || self.queued_files > 0
    }
}
