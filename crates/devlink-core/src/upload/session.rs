//! Upload session: the public handle and the task that owns all state.
//!
//! Every mutation of the unit collection happens on a single owner task.
//! [`UploadSession`] is a cheap, cloneable handle that sends it commands and
//! reads the [`SessionSnapshot`] it publishes over a `watch` channel.
//! Transfers run on their own tasks and report back over a second channel;
//! their events carry the attempt number so a late event from an aborted
//! attempt cannot overwrite a newer one.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{mpsc, oneshot, watch};

use super::aggregate::BatchStats;
use super::executor::{Executor, ExecutorEvent, TransferJob, TransferOutcome};
use super::scheduler::{Dispatch, UploadQueue};
use super::unit::{FilePayload, TransferUnit, UnitId, UnitSnapshot, UploadStatus};
use super::UploadSettings;
use crate::storage::{Destination, ObjectStore};

/// Callback invoked when the directory listing should be re-fetched.
pub type RefreshCallback = Box<dyn Fn() + Send + Sync>;

/// Everything observers can see of a session.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SessionSnapshot {
    /// Units in submission order
    pub units: Vec<UnitSnapshot>,
    /// Aggregate over `units`
    pub stats: BatchStats,
    /// Whether the queue is draining
    pub draining: bool,
}

impl SessionSnapshot {
    /// Look up a unit by id.
    pub fn unit(&self, id: UnitId) -> Option<&UnitSnapshot> {
        self.units.iter().find(|u| u.id == id)
    }

    /// Status of a unit, if it is still in the session.
    pub fn status(&self, id: UnitId) -> Option<UploadStatus> {
        self.unit(id).map(|u| u.status)
    }

    /// Whether nothing is queued, uploading or draining.
    pub fn is_idle(&self) -> bool {
        !self.draining && !self.stats.is_active()
    }
}

#[derive(Debug, Clone, Copy)]
enum UnitAction {
    Cancel,
    Pause,
    Resume,
    Retry,
}

enum Command {
    Submit {
        files: Vec<FilePayload>,
        destination: Destination,
        reply: oneshot::Sender<Vec<UnitId>>,
    },
    Unit {
        id: UnitId,
        action: UnitAction,
        reply: oneshot::Sender<()>,
    },
    ClearFinished {
        reply: oneshot::Sender<bool>,
    },
    DetachDestination {
        reply: oneshot::Sender<()>,
    },
    Shutdown,
}

/// Handle to a running upload session.
///
/// Dropping every handle (or calling [`shutdown`](Self::shutdown)) aborts
/// in-flight transfers and stops the owner task. Operations never fail:
/// unknown ids and illegal transitions are ignored, and transfer failures are
/// recorded on the unit.
#[derive(Debug, Clone)]
pub struct UploadSession {
    commands: mpsc::UnboundedSender<Command>,
    snapshots: watch::Receiver<SessionSnapshot>,
}

impl UploadSession {
    /// Start a session uploading into `store`.
    ///
    /// `on_refresh` is called once each time the queue drains to empty and
    /// after every retry finishes. Must be called within a Tokio runtime.
    pub fn start<S, F>(store: Arc<S>, settings: UploadSettings, on_refresh: F) -> Self
    where
        S: ObjectStore,
        F: Fn() + Send + Sync + 'static,
    {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshot_rx) = watch::channel(SessionSnapshot::default());

        let owner = SessionOwner {
            units: Vec::new(),
            queue: UploadQueue::new(),
            destination: None,
            executor: Arc::new(Executor::new(store, settings)),
            events: event_tx,
            snapshots: snapshot_tx,
            on_refresh: Box::new(on_refresh),
        };
        tokio::spawn(owner.run(command_rx, event_rx));

        Self {
            commands: command_tx,
            snapshots: snapshot_rx,
        }
    }

    /// Queue `files` for upload into `destination`.
    ///
    /// Returns the ids of the new units in order. The destination becomes the
    /// session's current destination, which retries require.
    pub async fn submit(&self, files: Vec<FilePayload>, destination: Destination) -> Vec<UnitId> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Submit {
            files,
            destination,
            reply,
        });
        rx.await.unwrap_or_default()
    }

    /// Cancel a unit.
    ///
    /// An uploading unit is aborted and becomes paused; a queued, failed or
    /// paused unit is removed. Completed units are left alone.
    pub async fn cancel(&self, id: UnitId) {
        self.unit_action(id, UnitAction::Cancel).await;
    }

    /// Pause a queued or uploading unit.
    pub async fn pause(&self, id: UnitId) {
        self.unit_action(id, UnitAction::Pause).await;
    }

    /// Put a paused unit back at the tail of the queue. It restarts from zero.
    pub async fn resume(&self, id: UnitId) {
        self.unit_action(id, UnitAction::Resume).await;
    }

    /// Re-run a failed unit immediately, outside the queue order.
    pub async fn retry(&self, id: UnitId) {
        self.unit_action(id, UnitAction::Retry).await;
    }

    /// Remove completed and failed units.
    ///
    /// Returns `true` when nothing is uploading any more.
    pub async fn clear_finished(&self) -> bool {
        let (reply, rx) = oneshot::channel();
        self.send(Command::ClearFinished { reply });
        rx.await.unwrap_or(true)
    }

    /// Forget the current destination; later retries are ignored.
    pub async fn detach_destination(&self) {
        let (reply, rx) = oneshot::channel();
        self.send(Command::DetachDestination { reply });
        let _ = rx.await;
    }

    /// The latest published snapshot.
    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshots.borrow().clone()
    }

    /// Subscribe to snapshot updates.
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshots.clone()
    }

    /// Wait until nothing is queued or uploading.
    pub async fn wait_idle(&self) -> SessionSnapshot {
        let mut rx = self.subscribe();
        let result = rx.wait_for(SessionSnapshot::is_idle).await.map(|s| s.clone());
        result.unwrap_or_else(|_| self.snapshot())
    }

    /// Abort in-flight transfers and stop the session.
    pub fn shutdown(&self) {
        self.send(Command::Shutdown);
    }

    async fn unit_action(&self, id: UnitId, action: UnitAction) {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Unit { id, action, reply });
        let _ = rx.await;
    }

    fn send(&self, command: Command) {
        if self.commands.send(command).is_err() {
            tracing::debug!("Upload session already stopped");
        }
    }
}

/// The task owning the live unit collection.
struct SessionOwner<S> {
    units: Vec<TransferUnit>,
    queue: UploadQueue,
    destination: Option<Destination>,
    executor: Arc<Executor<S>>,
    events: mpsc::UnboundedSender<ExecutorEvent>,
    snapshots: watch::Sender<SessionSnapshot>,
    on_refresh: RefreshCallback,
}

impl<S: ObjectStore> SessionOwner<S> {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut events: mpsc::UnboundedReceiver<ExecutorEvent>,
    ) {
        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Shutdown) | None => break,
                    Some(command) => self.handle_command(command),
                },
                Some(event) = events.recv() => {
                    self.handle_event(event);
                    self.publish();
                }
            }
        }

        for unit in &self.units {
            unit.abort();
        }
        tracing::debug!("Upload session stopped");
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Submit {
                files,
                destination,
                reply,
            } => {
                let ids = self.submit(files, destination);
                self.publish();
                let _ = reply.send(ids);
            }
            Command::Unit { id, action, reply } => {
                match action {
                    UnitAction::Cancel => self.cancel(id),
                    UnitAction::Pause => self.pause(id),
                    UnitAction::Resume => self.resume(id),
                    UnitAction::Retry => self.retry(id),
                }
                self.publish();
                let _ = reply.send(());
            }
            Command::ClearFinished { reply } => {
                let dismissable = self.clear_finished();
                self.publish();
                let _ = reply.send(dismissable);
            }
            Command::DetachDestination { reply } => {
                self.destination = None;
                let _ = reply.send(());
            }
            Command::Shutdown => {}
        }
    }

    fn submit(&mut self, files: Vec<FilePayload>, destination: Destination) -> Vec<UnitId> {
        if files.is_empty() {
            return Vec::new();
        }

        let ids: Vec<UnitId> = files
            .into_iter()
            .map(|file| {
                let path = destination.object_path(&file.name);
                let unit = TransferUnit::new(file, path);
                let id = unit.id();
                self.units.push(unit);
                self.queue.enqueue(id);
                id
            })
            .collect();

        tracing::info!("Queued {} file(s) for {}", ids.len(), destination);
        self.destination = Some(destination);
        self.pump();
        ids
    }

    fn cancel(&mut self, id: UnitId) {
        let Some(status) = self.find(id).map(TransferUnit::status) else {
            return;
        };
        match status {
            UploadStatus::Uploading => {
                if let Some(unit) = self.find(id) {
                    unit.abort();
                }
            }
            UploadStatus::Queued | UploadStatus::Failed | UploadStatus::Paused => {
                self.units.retain(|u| u.id() != id);
                self.queue.remove(id);
                tracing::debug!("Removed unit {}", id);
            }
            UploadStatus::Completed => {}
        }
    }

    fn pause(&mut self, id: UnitId) {
        let Some(unit) = self.find_mut(id) else {
            return;
        };
        match unit.status() {
            UploadStatus::Queued => unit.pause(),
            UploadStatus::Uploading => {
                unit.abort();
            }
            UploadStatus::Completed | UploadStatus::Failed | UploadStatus::Paused => {}
        }
    }

    fn resume(&mut self, id: UnitId) {
        let Some(unit) = self.find_mut(id) else {
            return;
        };
        if unit.status() != UploadStatus::Paused {
            return;
        }
        unit.requeue();
        self.queue.requeue(id);
        self.pump();
    }

    fn retry(&mut self, id: UnitId) {
        if self.destination.is_none() {
            tracing::debug!("Ignoring retry of {}: no destination", id);
            return;
        }
        match self.find(id).map(TransferUnit::status) {
            Some(UploadStatus::Failed) => self.start(id),
            Some(status) => tracing::debug!("Ignoring retry of {} while {}", id, status),
            None => {}
        }
    }

    fn clear_finished(&mut self) -> bool {
        self.units.retain(|u| !u.status().is_finished());
        !self
            .units
            .iter()
            .any(|u| u.status() == UploadStatus::Uploading)
    }

    /// Start the next queue-driven transfer, or signal the end of a drain.
    fn pump(&mut self) {
        let units = &self.units;
        let dispatch = self.queue.dispatch(|id| {
            units
                .iter()
                .any(|u| u.id() == id && u.status() == UploadStatus::Queued)
        });

        match dispatch {
            Dispatch::Start(id) => self.start(id),
            Dispatch::Drained => {
                tracing::info!("Upload queue drained");
                (self.on_refresh)();
            }
            Dispatch::Busy | Dispatch::Idle => {}
        }
    }

    fn start(&mut self, id: UnitId) {
        let Some(unit) = self.find_mut(id) else {
            return;
        };
        let (attempt, cancel) = unit.begin_attempt();
        let job = TransferJob {
            id,
            attempt,
            object_path: unit.object_path().to_string(),
            payload: unit.payload(),
        };
        self.executor.spawn(job, cancel, self.events.clone());
    }

    fn handle_event(&mut self, event: ExecutorEvent) {
        match event {
            ExecutorEvent::Progress {
                id,
                attempt,
                loaded,
                estimate,
            } => {
                if let Some(unit) = self.current_attempt(id, attempt) {
                    unit.record_progress(loaded);
                    if let Some(estimate) = estimate {
                        unit.record_estimate(estimate);
                    }
                }
            }
            ExecutorEvent::Finished {
                id,
                attempt,
                outcome,
            } => {
                let Some(unit) = self.current_attempt(id, attempt) else {
                    tracing::debug!("Ignoring stale result of {} attempt {}", id, attempt);
                    return;
                };
                match outcome {
                    TransferOutcome::Completed => unit.complete(),
                    TransferOutcome::Failed(reason) => unit.fail(reason),
                    TransferOutcome::Paused => unit.pause(),
                }

                if self.queue.finish(id) {
                    self.pump();
                } else {
                    (self.on_refresh)();
                }
            }
        }
    }

    /// The unit, if `attempt` is its running attempt.
    fn current_attempt(&mut self, id: UnitId, attempt: u32) -> Option<&mut TransferUnit> {
        self.find_mut(id)
            .filter(|u| u.attempts() == attempt && u.status() == UploadStatus::Uploading)
    }

    fn find(&self, id: UnitId) -> Option<&TransferUnit> {
        self.units.iter().find(|u| u.id() == id)
    }

    fn find_mut(&mut self, id: UnitId) -> Option<&mut TransferUnit> {
        self.units.iter_mut().find(|u| u.id() == id)
    }

    fn publish(&self) {
        let units: Vec<UnitSnapshot> = self.units.iter().map(TransferUnit::snapshot).collect();
        let stats = BatchStats::from_units(&units);
        self.snapshots.send_replace(SessionSnapshot {
            units,
            stats,
            draining: self.queue.is_draining(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryObjectStore;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_empty_submit_is_noop() {
        let refreshes = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&refreshes);
        let session = UploadSession::start(
            Arc::new(MemoryObjectStore::new()),
            UploadSettings::default(),
            move || {
                counter.fetch_add(1, Ordering::SeqCst);
            },
        );

        let ids = session.submit(Vec::new(), Destination::root("dev")).await;
        assert!(ids.is_empty());
        let snap = session.snapshot();
        assert!(snap.units.is_empty());
        assert!(snap.is_idle());
        assert_eq!(refreshes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_unknown_ids_are_ignored() {
        let session = UploadSession::start(
            Arc::new(MemoryObjectStore::new()),
            UploadSettings::default(),
            || {},
        );
        let ghost = UnitId::new();
        session.cancel(ghost).await;
        session.pause(ghost).await;
        session.resume(ghost).await;
        session.retry(ghost).await;
        assert!(session.clear_finished().await);
        assert!(session.snapshot().units.is_empty());
    }

    fn owner() -> (SessionOwner<MemoryObjectStore>, mpsc::UnboundedReceiver<ExecutorEvent>) {
        let store = Arc::new(MemoryObjectStore::new().with_throughput(10, 10));
        let (events, event_rx) = mpsc::unbounded_channel();
        let (snapshots, _) = watch::channel(SessionSnapshot::default());
        let owner = SessionOwner {
            units: Vec::new(),
            queue: UploadQueue::new(),
            destination: None,
            executor: Arc::new(Executor::new(store, UploadSettings::default())),
            events,
            snapshots,
            on_refresh: Box::new(|| {}),
        };
        (owner, event_rx)
    }

    #[tokio::test(start_paused = true)]
    async fn test_events_from_earlier_attempt_are_ignored() {
        let (mut owner, _events) = owner();
        let ids = owner.submit(
            vec![FilePayload::new("a.bin", vec![0u8; 100])],
            Destination::root("dev"),
        );
        let id = ids[0];

        owner.handle_event(ExecutorEvent::Progress {
            id,
            attempt: 1,
            loaded: 30,
            estimate: None,
        });
        owner.pause(id);
        owner.handle_event(ExecutorEvent::Finished {
            id,
            attempt: 1,
            outcome: TransferOutcome::Paused,
        });
        assert_eq!(owner.find(id).map(TransferUnit::status), Some(UploadStatus::Paused));

        owner.resume(id);
        owner.handle_event(ExecutorEvent::Progress {
            id,
            attempt: 2,
            loaded: 20,
            estimate: None,
        });

        owner.handle_event(ExecutorEvent::Progress {
            id,
            attempt: 1,
            loaded: 90,
            estimate: None,
        });
        owner.handle_event(ExecutorEvent::Finished {
            id,
            attempt: 1,
            outcome: TransferOutcome::Failed("connection reset".into()),
        });
        owner.handle_event(ExecutorEvent::Finished {
            id,
            attempt: 1,
            outcome: TransferOutcome::Completed,
        });

        let snap = owner.find(id).map(TransferUnit::snapshot).unwrap();
        assert_eq!(snap.status, UploadStatus::Uploading);
        assert_eq!(snap.attempts, 2);
        assert_eq!(snap.uploaded_size, 20);
        assert!(snap.error.is_none());
        assert_eq!(owner.queue.in_flight(), Some(id));
    }

    #[tokio::test]
    async fn test_handle_survives_shutdown() {
        let session = UploadSession::start(
            Arc::new(MemoryObjectStore::new()),
            UploadSettings::default(),
            || {},
        );
        session.shutdown();
        let ids = session
            .submit(vec![FilePayload::new("a", "x")], Destination::root("dev"))
            .await;
        assert!(ids.is_empty());
        assert!(session.clear_finished().await);
    }
}
