//! Runs a single upload against an [`ObjectStore`].
//!
//! The executor never fails outward: whatever happens is folded into a
//! [`TransferOutcome`]. Progress from the store is clamped, run through a
//! [`SpeedEstimator`] and forwarded to the session as events.

use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::estimator::{Estimate, SpeedEstimator};
use super::unit::UnitId;
use super::UploadSettings;
use crate::storage::{ObjectStore, ProgressSink};

/// How a single attempt ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferOutcome {
    /// Stored successfully
    Completed,
    /// Transport failure or rejection, with the reason
    Failed(String),
    /// Cancelled before finishing
    Paused,
}

impl TransferOutcome {
    /// Whether the object was stored.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Completed)
    }
}

/// Events sent from running transfers to the session owner.
#[derive(Debug)]
pub(crate) enum ExecutorEvent {
    Progress {
        id: UnitId,
        attempt: u32,
        loaded: u64,
        estimate: Option<Estimate>,
    },
    Finished {
        id: UnitId,
        attempt: u32,
        outcome: TransferOutcome,
    },
}

/// Everything an attempt needs, detached from the unit itself.
#[derive(Debug)]
pub(crate) struct TransferJob {
    pub id: UnitId,
    pub attempt: u32,
    pub object_path: String,
    pub payload: Bytes,
}

/// Single-transfer executor.
#[derive(Debug)]
pub(crate) struct Executor<S> {
    store: Arc<S>,
    settings: UploadSettings,
}

impl<S: ObjectStore> Executor<S> {
    pub(crate) fn new(store: Arc<S>, settings: UploadSettings) -> Self {
        Self { store, settings }
    }

    /// Run one attempt to its end, reporting progress through `events`.
    pub(crate) async fn execute(
        &self,
        job: TransferJob,
        cancel: CancellationToken,
        events: &mpsc::UnboundedSender<ExecutorEvent>,
    ) -> TransferOutcome {
        let TransferJob {
            id,
            attempt,
            object_path,
            payload,
        } = job;
        let total = payload.len() as u64;

        tracing::debug!(
            "Uploading {} ({} bytes, attempt {})",
            object_path,
            total,
            attempt
        );

        let mut estimator = SpeedEstimator::with_window(
            total,
            Instant::now(),
            self.settings.sample_interval,
            self.settings.speed_window,
        );
        let (progress_tx, mut progress_rx) = mpsc::unbounded_channel();
        let upload = self.store.put_object(
            &object_path,
            payload,
            self.settings.overwrite,
            ProgressSink::new(progress_tx),
        );
        tokio::pin!(upload);

        let mut forward = |loaded: u64| {
            let loaded = loaded.min(total);
            let estimate = estimator.observe(Instant::now(), loaded);
            let _ = events.send(ExecutorEvent::Progress {
                id,
                attempt,
                loaded,
                estimate,
            });
        };

        let result = loop {
            tokio::select! {
                biased;

                () = cancel.cancelled() => {
                    tracing::info!("Upload of {} cancelled", object_path);
                    return TransferOutcome::Paused;
                }
                Some(loaded) = progress_rx.recv() => forward(loaded),
                result = &mut upload => break result,
            }
        };

        // ticks reported in the same poll that finished the request
        while let Ok(loaded) = progress_rx.try_recv() {
            forward(loaded);
        }

        match result {
            Ok(()) => {
                tracing::info!("Uploaded {}", object_path);
                TransferOutcome::Completed
            }
            Err(e) => {
                tracing::warn!("Upload of {} failed: {}", object_path, e);
                TransferOutcome::Failed(e.to_string())
            }
        }
    }

    /// Spawn an attempt on the runtime; its end is reported as
    /// [`ExecutorEvent::Finished`].
    pub(crate) fn spawn(
        self: &Arc<Self>,
        job: TransferJob,
        cancel: CancellationToken,
        events: mpsc::UnboundedSender<ExecutorEvent>,
    ) {
        let executor = Arc::clone(self);
        tokio::spawn(async move {
            let (id, attempt) = (job.id, job.attempt);
            let outcome = executor.execute(job, cancel, &events).await;
            let _ = events.send(ExecutorEvent::Finished {
                id,
                attempt,
                outcome,
            });
        });
    }
}
