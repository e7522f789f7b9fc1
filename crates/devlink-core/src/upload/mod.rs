//! Sequential, cancellable multi-file upload pipeline.
//!
//! Files submitted to an [`UploadSession`] become transfer units that are
//! uploaded one at a time, in submission order, to a [`Destination`]. Each
//! unit carries live progress, a smoothed speed and an ETA; the session
//! publishes a [`SessionSnapshot`] with all units and a [`BatchStats`]
//! aggregate after every change.
//!
//! ## Lifecycle
//!
//! ```text
//! queued -> uploading -> completed
//!                     -> failed  -> uploading (retry)
//!                     -> paused  -> queued    (resume)
//! queued -> paused
//! ```
//!
//! [`Destination`]: crate::storage::Destination

pub mod aggregate;
pub mod estimator;
pub mod executor;
pub mod scheduler;
pub mod session;
pub mod unit;

pub use aggregate::BatchStats;
pub use estimator::{Estimate, SpeedEstimator};
pub use executor::TransferOutcome;
pub use scheduler::{Dispatch, UploadQueue};
pub use session::{SessionSnapshot, UploadSession};
pub use unit::{FilePayload, UnitId, UnitSnapshot, UploadStatus};

use std::time::Duration;

use crate::config::UploadConfig;

/// Tuning for the upload pipeline.
#[derive(Debug, Clone)]
pub struct UploadSettings {
    /// Minimum spacing between speed samples
    pub sample_interval: Duration,
    /// Number of samples in the speed moving average
    pub speed_window: usize,
    /// Replace objects that already exist at the target path
    pub overwrite: bool,
}

impl Default for UploadSettings {
    fn default() -> Self {
        Self {
            sample_interval: Duration::from_millis(crate::DEFAULT_SAMPLE_INTERVAL_MS),
            speed_window: crate::DEFAULT_SPEED_WINDOW,
            overwrite: true,
        }
    }
}

impl From<&UploadConfig> for UploadSettings {
    fn from(config: &UploadConfig) -> Self {
        Self {
            sample_interval: config.sample_interval,
            speed_window: config.speed_window,
            overwrite: config.overwrite,
        }
    }
}

/// Serialize an optional duration as fractional seconds (or null).
mod duration_secs {
    use serde::Serializer;
    use std::time::Duration;

    #[allow(clippy::ref_option)]
    pub fn serialize<S>(value: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(duration) => serializer.serialize_some(&duration.as_secs_f64()),
            None => serializer.serialize_none(),
        }
    }
}
