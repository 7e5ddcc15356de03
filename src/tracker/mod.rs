//! Tracker Coordinator
//!
//! Wires the change detector to the snapshot store under the configured
//! retention policy. The detector pushes events onto a bounded queue; a commit
//! worker stages and commits them. All store access (worker and caller alike)
//! goes through one mutex, so commits are linearizable.

mod worker;

use crate::config::TrackConfig;
use crate::error::TrackerError;
use crate::store::{CommitRecord, RetentionReport, SledSnapshotStore, SnapshotStore, HISTORY_DIR};
use crate::types::CommitId;
use crate::watch::{ChangeDetector, ChangeEvent};
use parking_lot::Mutex;
use std::path::Path;
use std::sync::mpsc;
use std::sync::Arc;
use tracing::{debug, error, info};
use worker::CommitWorker;

/// Store handle shared between the commit worker and callers
pub type SharedStore = Arc<Mutex<SledSnapshotStore>>;

/// Message used by [`TrackerCoordinator::manual_commit`]
pub const MANUAL_COMMIT_MESSAGE: &str = "Manual commit";

/// Message recorded for a change detected at `path`
pub fn auto_commit_message(path: &Path) -> String {
    format!("Auto commit: {} changed", path.display())
}

/// Auto-commit outcomes since the tracker was created
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackerStats {
    /// Change events delivered by the detector
    pub events_observed: u64,
    pub auto_commits: u64,
    pub auto_commit_failures: u64,
    /// Description of the most recent auto-commit failure
    pub last_failure: Option<String>,
}

/// Lifecycle and policy glue between detection and history
pub struct TrackerCoordinator {
    config: TrackConfig,
    store: Option<SharedStore>,
    detector: Option<ChangeDetector>,
    worker: Option<CommitWorker>,
    stats: Arc<Mutex<TrackerStats>>,
}

impl TrackerCoordinator {
    pub fn new(config: TrackConfig) -> Result<Self, TrackerError> {
        config.validate()?;
        info!(
            repo_root = %config.repo_root.display(),
            watch_paths = config.watch_paths.len(),
            "Tracker initialized"
        );
        Ok(Self {
            config,
            store: None,
            detector: None,
            worker: None,
            stats: Arc::new(Mutex::new(TrackerStats::default())),
        })
    }

    pub fn config(&self) -> &TrackConfig {
        &self.config
    }

    pub fn history_root(&self) -> &Path {
        &self.config.repo_root
    }

    pub fn is_running(&self) -> bool {
        self.detector.is_some()
    }

    pub fn stats(&self) -> TrackerStats {
        self.stats.lock().clone()
    }

    /// Open the store, start watching, and run a retention sweep if history
    /// already exists.
    ///
    /// A failing sweep is returned as an error, but the tracker keeps running;
    /// call [`stop`](Self::stop) to shut it down.
    pub fn start(&mut self) -> Result<(), TrackerError> {
        if self.is_running() {
            return Err(TrackerError::AlreadyRunning);
        }

        // The previous handle must be closed before the database is reopened.
        self.store = None;
        let mut store = SledSnapshotStore::new(&self.config.repo_root);
        store.init()?;
        let history_dir = dunce::canonicalize(store.root())
            .map_err(crate::error::StoreError::from)?
            .join(HISTORY_DIR);
        let store: SharedStore = Arc::new(Mutex::new(store));

        let mut detector = ChangeDetector::with_interval(self.config.poll_interval());
        for path in &self.config.watch_paths {
            detector.add_watch(path)?;
        }

        let stats = Arc::clone(&self.stats);
        if self.config.enable_auto_commit {
            let (events_tx, events_rx) = mpsc::sync_channel(self.config.queue_capacity);
            let worker = CommitWorker::spawn(
                Arc::clone(&store),
                events_rx,
                Arc::clone(&self.stats),
                history_dir,
            )?;

            let started = detector.start_watching(move |event: ChangeEvent| {
                stats.lock().events_observed += 1;
                if events_tx.send(event).is_err() {
                    error!("Commit worker is gone; change event dropped");
                }
            });
            if let Err(e) = started {
                worker.join();
                return Err(e.into());
            }
            self.worker = Some(worker);
        } else {
            detector.start_watching(move |event: ChangeEvent| {
                stats.lock().events_observed += 1;
                debug!(path = %event.path().display(), kind = event.kind(), "Auto-commit disabled; change not recorded");
            })?;
        }

        self.store = Some(store);
        self.detector = Some(detector);
        info!("Monitoring started");

        if self.config.retention_days > 0 {
            if self.latest_commit()?.is_some() {
                self.clean_old()?;
            } else {
                info!("Skipping retention sweep; history has no commits yet");
            }
        }

        Ok(())
    }

    /// Stop watching and wait for in-flight commits to finish.
    ///
    /// Events already queued are committed before this returns; nothing is
    /// committed automatically afterwards. The store stays open.
    pub fn stop(&mut self) {
        let was_running = self.detector.is_some();
        if let Some(mut detector) = self.detector.take() {
            detector.stop();
        }
        if let Some(worker) = self.worker.take() {
            worker.join();
        }
        if was_running {
            info!("Monitoring stopped");
        }
    }

    /// Commit the current staging index immediately.
    pub fn manual_commit(&self) -> Result<CommitId, TrackerError> {
        let id = self.store()?.lock().commit(MANUAL_COMMIT_MESSAGE)?;
        info!(commit = %id, "Manual commit recorded");
        Ok(id)
    }

    /// Run a retention sweep over the configured window. Reporting only.
    pub fn clean_old(&self) -> Result<RetentionReport, TrackerError> {
        let store = self.store()?;
        if self.config.retention_days == 0 {
            debug!("Retention disabled; sweep skipped");
            return Ok(RetentionReport::disabled());
        }
        Ok(store.lock().retention_sweep(self.config.retention_days)?)
    }

    /// Restore the history root's working tree to `hash`.
    pub fn restore_to(&self, hash: &str) -> Result<CommitId, TrackerError> {
        let id = self.store()?.lock().restore_to(hash)?;
        Ok(id)
    }

    pub fn list_commits(&self) -> Result<Vec<CommitId>, TrackerError> {
        Ok(self.store()?.lock().list_commits()?)
    }

    pub fn latest_commit(&self) -> Result<Option<CommitId>, TrackerError> {
        Ok(self.store()?.lock().latest_commit()?)
    }

    /// Commit records from HEAD back to the first commit
    pub fn log(&self) -> Result<Vec<CommitRecord>, TrackerError> {
        Ok(self.store()?.lock().log()?)
    }

    /// Content of `rel_path` in the tree of commit `id`
    pub fn file_at(&self, id: &CommitId, rel_path: &str) -> Result<Option<Vec<u8>>, TrackerError> {
        Ok(self.store()?.lock().file_at(id, rel_path)?)
    }

    fn store(&self) -> Result<&SharedStore, TrackerError> {
        self.store.as_ref().ok_or(TrackerError::NotStarted)
    }
}

impl Drop for TrackerCoordinator {
    fn drop(&mut self) {
        self.stop();
    }
}
