//! FIFO dispatch policy for queue-driven transfers.
//!
//! At most one queue-driven transfer is in flight. Units are dispatched in
//! the order they were enqueued; ids the session no longer considers ready
//! (paused or removed) are dropped from the line when their turn comes.

use std::collections::VecDeque;

use super::unit::UnitId;

/// What the queue decided on a dispatch attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// A transfer is already in flight
    Busy,
    /// This unit should start now
    Start(UnitId),
    /// The line just ran empty after a drain; refresh once
    Drained,
    /// Nothing pending and no drain was running
    Idle,
}

/// Pending line plus the single in-flight slot.
#[derive(Debug, Default)]
pub struct UploadQueue {
    pending: VecDeque<UnitId>,
    in_flight: Option<UnitId>,
    draining: bool,
}

impl UploadQueue {
    /// Create an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `id` to the tail of the line.
    pub fn enqueue(&mut self, id: UnitId) {
        self.pending.push_back(id);
    }

    /// Drop `id` from the line. Returns whether it was pending.
    pub fn remove(&mut self, id: UnitId) -> bool {
        let before = self.pending.len();
        self.pending.retain(|pending| *pending != id);
        self.pending.len() != before
    }

    /// Move `id` to the tail of the line.
    pub fn requeue(&mut self, id: UnitId) {
        self.remove(id);
        self.enqueue(id);
    }

    /// Pick the next unit to start.
    ///
    /// `is_ready` is asked about each pending id in order; ids it rejects are
    /// discarded.
    pub fn dispatch(&mut self, mut is_ready: impl FnMut(UnitId) -> bool) -> Dispatch {
        if self.in_flight.is_some() {
            return Dispatch::Busy;
        }
        if !self.pending.is_empty() {
            self.draining = true;
        }

        while let Some(id) = self.pending.pop_front() {
            if is_ready(id) {
                self.in_flight = Some(id);
                return Dispatch::Start(id);
            }
            tracing::trace!("Skipping unit {} at dispatch", id);
        }

        if std::mem::take(&mut self.draining) {
            Dispatch::Drained
        } else {
            Dispatch::Idle
        }
    }

    /// Release the in-flight slot if `id` holds it.
    ///
    /// Returns `false` for transfers that were not queue-driven.
    pub fn finish(&mut self, id: UnitId) -> bool {
        if self.in_flight == Some(id) {
            self.in_flight = None;
            true
        } else {
            false
        }
    }

    /// Unit holding the in-flight slot.
    pub fn in_flight(&self) -> Option<UnitId> {
        self.in_flight
    }

    /// Whether a drain is running.
    pub fn is_draining(&self) -> bool {
        self.draining
    }

    /// Number of ids waiting in line.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Whether the line is empty.
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
