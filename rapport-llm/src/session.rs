//! Extraction session — run identity, supersession, cancellation.
//!
//! One session per conversation, owned by the caller and passed in
//! explicitly. Runs are identified by a monotonically increasing id; a new
//! run supersedes every earlier one, and staleness is checked against the
//! session's current counter. No module-level state anywhere.

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tokio::sync::watch;

use rapport_core::types::SnapshotId;

/// Caller-owned extraction session state.
pub struct ExtractionSession {
    counter: AtomicU64,
    current_tx: watch::Sender<u64>,
    last_committed: Mutex<Option<SnapshotId>>,
}

impl Default for ExtractionSession {
    fn default() -> Self {
        Self::new()
    }
}

impl ExtractionSession {
    /// Create a fresh session with no runs started.
    #[must_use]
    pub fn new() -> Self {
        let (current_tx, _) = watch::channel(0);
        Self {
            counter: AtomicU64::new(0),
            current_tx,
            last_committed: Mutex::new(None),
        }
    }

    /// Begin a new run, superseding (and thereby cancelling) any prior one.
    #[must_use]
    pub fn begin_run(&self) -> RunHandle {
        let run_id = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        let _ = self.current_tx.send(run_id);
        RunHandle {
            run_id,
            current: self.current_tx.subscribe(),
        }
    }

    /// Cancel every in-flight run without starting a new one.
    pub fn cancel_all(&self) {
        let sentinel = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        let _ = self.current_tx.send(sentinel);
    }

    /// Whether `run_id` is still the current run.
    #[must_use]
    pub fn is_current(&self, run_id: u64) -> bool {
        *self.current_tx.borrow() == run_id
    }

    /// Record the snapshot a committed run produced.
    pub fn set_last_committed(&self, id: SnapshotId) {
        *self.last_committed.lock() = Some(id);
    }

    /// The snapshot id of the last committed run, if any.
    #[must_use]
    pub fn last_committed(&self) -> Option<SnapshotId> {
        *self.last_committed.lock()
    }
}

impl std::fmt::Debug for ExtractionSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtractionSession")
            .field("current_run", &*self.current_tx.borrow())
            .finish_non_exhaustive()
    }
}

/// Handle identifying one run; cheap to clone into spawned tasks.
#[derive(Debug, Clone)]
pub struct RunHandle {
    run_id: u64,
    current: watch::Receiver<u64>,
}

impl RunHandle {
    /// This run's id.
    #[must_use]
    pub fn run_id(&self) -> u64 {
        self.run_id
    }

    /// Whether this run is still the session's current run.
    #[must_use]
    pub fn is_current(&self) -> bool {
        *self.current.borrow() == self.run_id
    }

    /// Resolves when this run is superseded or cancelled. Used with
    /// `tokio::select!` to abort in-flight oracle calls.
    pub async fn cancelled(&self) {
        let mut current = self.current.clone();
        loop {
            if *current.borrow() != self.run_id {
                return;
            }
            // Sender dropped means the session is gone; treat as cancelled.
            if current.changed().await.is_err() {
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_ids_are_monotonic() {
        let session = ExtractionSession::new();
        let a = session.begin_run();
        let b = session.begin_run();
        assert!(b.run_id() > a.run_id());
    }

    #[test]
    fn new_run_supersedes_prior() {
        let session = ExtractionSession::new();
        let a = session.begin_run();
        assert!(a.is_current());
        let b = session.begin_run();
        assert!(!a.is_current());
        assert!(b.is_current());
        assert!(session.is_current(b.run_id()));
        assert!(!session.is_current(a.run_id()));
    }

    #[test]
    fn cancel_all_invalidates_current() {
        let session = ExtractionSession::new();
        let a = session.begin_run();
        session.cancel_all();
        assert!(!a.is_current());
    }

    #[tokio::test]
    async fn cancelled_resolves_on_supersession() {
        let session = ExtractionSession::new();
        let a = session.begin_run();
        let waiter = tokio::spawn({
            let handle = a.clone();
            async move {
                handle.cancelled().await;
            }
        });
        let _b = session.begin_run();
        waiter.await.expect("cancelled future resolves");
    }

    #[test]
    fn last_committed_round_trips() {
        let session = ExtractionSession::new();
        assert!(session.last_committed().is_none());
        let id = SnapshotId::new();
        session.set_last_committed(id);
        assert_eq!(session.last_committed(), Some(id));
    }
}
