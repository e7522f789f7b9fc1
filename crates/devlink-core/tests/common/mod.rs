//! Common test utilities for `Devlink` integration tests.
//!
//! [`ScriptedStore`] is an object store whose behaviour per object path is
//! scripted up front, and which records the order uploads start and end in.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use devlink_core::storage::{ObjectStore, ProgressSink, RawObject};
use devlink_core::upload::{FilePayload, SessionSnapshot, UnitId, UploadSession, UploadSettings};
use devlink_core::{Error, Result};
use tokio::sync::watch;

/// One step of a scripted upload.
#[derive(Debug, Clone)]
pub enum Step {
    /// Report this many bytes sent so far
    Send(u64),
    /// Wait before the next step
    Sleep(Duration),
    /// Never finish; only cancellation ends the upload
    Hang,
}

/// How a scripted upload ends.
#[derive(Debug, Clone)]
pub enum Ending {
    /// Object stored
    Stored,
    /// Connection dropped
    TransportError,
    /// Endpoint answered with this status
    Status(u16),
}

/// A full scripted upload.
#[derive(Debug, Clone)]
pub struct Script {
    pub steps: Vec<Step>,
    pub ending: Ending,
}

impl Script {
    /// Send the payload in ten even steps, 50ms apart, then store it.
    pub fn steady(size: u64) -> Self {
        let steps = (1..=10)
            .flat_map(|i| [Step::Sleep(Duration::from_millis(50)), Step::Send(size * i / 10)])
            .collect();
        Self {
            steps,
            ending: Ending::Stored,
        }
    }

    /// Send `sent` bytes, then hang until cancelled.
    pub fn stall_after(sent: u64) -> Self {
        Self {
            steps: vec![Step::Sleep(Duration::from_millis(50)), Step::Send(sent), Step::Hang],
            ending: Ending::Stored,
        }
    }

    /// Send `sent` bytes, then fail with a transport error.
    pub fn fail_after(sent: u64) -> Self {
        Self {
            steps: vec![Step::Sleep(Duration::from_millis(50)), Step::Send(sent)],
            ending: Ending::TransportError,
        }
    }
}

/// Object store driven by per-path scripts.
///
/// Paths without a script left get [`Script::steady`].
#[derive(Debug, Default)]
pub struct ScriptedStore {
    scripts: Mutex<HashMap<String, VecDeque<Script>>>,
    log: Mutex<Vec<String>>,
    stored: Mutex<Vec<String>>,
    active: AtomicUsize,
    max_active: AtomicUsize,
}

impl ScriptedStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Queue `script` for the next upload of `path`.
    pub fn script(&self, path: &str, script: Script) {
        self.scripts
            .lock()
            .unwrap()
            .entry(path.to_string())
            .or_default()
            .push_back(script);
    }

    /// `start:<path>` / `end:<path>` entries in the order they happened.
    pub fn log(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    /// Paths stored successfully, in order.
    pub fn stored(&self) -> Vec<String> {
        self.stored.lock().unwrap().clone()
    }

    /// Highest number of uploads that ran at the same time.
    pub fn max_concurrent(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    fn next_script(&self, path: &str, size: u64) -> Script {
        self.scripts
            .lock()
            .unwrap()
            .get_mut(path)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| Script::steady(size))
    }
}

struct ActiveGuard<'a>(&'a AtomicUsize);

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl ObjectStore for ScriptedStore {
    async fn put_object(
        &self,
        path: &str,
        payload: Bytes,
        _overwrite: bool,
        progress: ProgressSink,
    ) -> Result<()> {
        let script = self.next_script(path, payload.len() as u64);
        self.log.lock().unwrap().push(format!("start:{path}"));

        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);
        let _guard = ActiveGuard(&self.active);

        for step in script.steps {
            match step {
                Step::Send(n) => progress.report(n),
                Step::Sleep(d) => tokio::time::sleep(d).await,
                Step::Hang => std::future::pending::<()>().await,
            }
        }

        self.log.lock().unwrap().push(format!("end:{path}"));
        match script.ending {
            Ending::Stored => {
                self.stored.lock().unwrap().push(path.to_string());
                Ok(())
            }
            Ending::TransportError => Err(Error::Transport("connection reset".into())),
            Ending::Status(status) => Err(Error::Rejected {
                status,
                message: "rejected".into(),
            }),
        }
    }

    async fn list_objects(&self, _prefix: &str, _limit: usize) -> Result<Vec<RawObject>> {
        Ok(Vec::new())
    }

    async fn get_object(&self, path: &str) -> Result<Bytes> {
        Err(Error::NotFound(path.to_string()))
    }

    async fn remove_objects(&self, _paths: &[String]) -> Result<Vec<String>> {
        Ok(Vec::new())
    }
}

/// Session over `store` counting refresh callbacks.
pub fn start_session(store: Arc<ScriptedStore>) -> (UploadSession, Arc<AtomicUsize>) {
    let refreshes = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&refreshes);
    let session = UploadSession::start(store, UploadSettings::default(), move || {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    (session, refreshes)
}

/// A payload of `size` bytes.
pub fn file(name: &str, size: usize) -> FilePayload {
    FilePayload::new(name, vec![0xAB; size])
}

/// Wait until `pred` holds for the published snapshot.
pub async fn wait_until(
    session: &UploadSession,
    pred: impl FnMut(&SessionSnapshot) -> bool,
) -> SessionSnapshot {
    let mut rx: watch::Receiver<SessionSnapshot> = session.subscribe();
    let snapshot = rx.wait_for(pred).await.expect("session stopped").clone();
    snapshot
}

/// Wait until unit `id` has the given status.
pub async fn wait_for_status(
    session: &UploadSession,
    id: UnitId,
    status: devlink_core::upload::UploadStatus,
) -> SessionSnapshot {
    wait_until(session, |s| s.status(id) == Some(status)).await
}
