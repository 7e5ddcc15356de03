//! Commit worker: consumes change events and turns them into snapshots.
//!
//! Runs on its own thread so a slow commit never stalls detection. Events are
//! handled in queue order, and each stage+commit pair happens under a single
//! acquisition of the store lock.

use crate::error::{TrackerError, WatchError};
use crate::store::SnapshotStore;
use crate::tracker::{auto_commit_message, SharedStore, TrackerStats};
use crate::watch::ChangeEvent;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::mpsc::Receiver;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info, warn};

pub(crate) struct CommitWorker {
    handle: JoinHandle<()>,
}

impl CommitWorker {
    /// Spawn the worker. It exits once every sender for `events` is dropped
    /// and the queue is drained.
    pub(crate) fn spawn(
        store: SharedStore,
        events: Receiver<ChangeEvent>,
        stats: Arc<Mutex<TrackerStats>>,
        history_dir: PathBuf,
    ) -> Result<Self, TrackerError> {
        let handle = thread::Builder::new()
            .name("conftrack-commit".to_string())
            .spawn(move || {
                for event in events.iter() {
                    handle_event(&store, &stats, &history_dir, &event);
                }
                debug!("Commit worker exiting");
            })
            .map_err(|e| TrackerError::Watch(WatchError::Spawn(e)))?;

        Ok(Self { handle })
    }

    /// Block until the worker has drained its queue and exited.
    pub(crate) fn join(self) {
        if self.handle.join().is_err() {
            warn!("Commit worker panicked");
        }
    }
}

fn handle_event(
    store: &SharedStore,
    stats: &Mutex<TrackerStats>,
    history_dir: &Path,
    event: &ChangeEvent,
) {
    let path = event.path();

    if path.is_dir() {
        debug!(path = %path.display(), "Skipping directory change");
        return;
    }
    if is_internal(path, history_dir) {
        debug!(path = %path.display(), "Skipping change inside history database");
        return;
    }

    let message = auto_commit_message(path);
    let result = {
        let mut guard = store.lock();
        guard
            .stage(path)
            .and_then(|_| guard.commit(&message))
    };

    let mut stats = stats.lock();
    match result {
        Ok(commit) => {
            stats.auto_commits += 1;
            info!(commit = %commit, path = %path.display(), kind = event.kind(), "Auto-committed change");
        }
        Err(e) => {
            stats.auto_commit_failures += 1;
            stats.last_failure = Some(format!("auto-commit of {}: {}", path.display(), e));
            error!(path = %path.display(), kind = event.kind(), error = %e, "Auto-commit failed");
        }
    }
}

fn is_internal(path: &Path, history_dir: &Path) -> bool {
    let resolved = dunce::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
    resolved.starts_with(history_dir)
}
