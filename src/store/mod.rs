//! Snapshot Store
//!
//! Durable, ordered, content-addressed history of a directory tree (the
//! history root). Supports staging, commit, enumeration, retention scans and
//! restore. The store never stages files outside its own tree: external files
//! are copied under the root by base name first.

pub mod hasher;
pub mod objects;
pub mod persistence;

pub use objects::{Commit, Object, ObjectStore, Tree};
pub use persistence::SledSnapshotStore;

use crate::error::StoreError;
use crate::types::{CommitId, ObjectId};
use chrono::{DateTime, Utc};
use std::path::Path;

/// Name of the internal directory inside the history root holding the object
/// database and the staging index. Everything else under the root is the
/// working tree.
pub const HISTORY_DIR: &str = ".history";

/// Metadata for a single commit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitRecord {
    pub id: CommitId,
    pub parent: Option<CommitId>,
    pub tree: ObjectId,
    pub timestamp: DateTime<Utc>,
    pub message: String,
}

impl CommitRecord {
    pub(crate) fn from_commit(id: ObjectId, commit: &Commit) -> Self {
        Self {
            id: CommitId::from(id),
            parent: commit.parent.map(CommitId::from),
            tree: commit.tree,
            timestamp: DateTime::from_timestamp_millis(commit.timestamp_ms).unwrap_or_default(),
            message: commit.message.clone(),
        }
    }
}

/// Outcome of a retention sweep. Sweeps only identify commits; they never
/// rewrite history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetentionReport {
    /// Retention window in days (0 = disabled)
    pub window_days: u32,
    /// Commits strictly older than this are eligible. `None` when disabled or
    /// when the window reaches back past the earliest representable time.
    pub cutoff: Option<DateTime<Utc>>,
    /// Number of commits reachable from HEAD that were inspected
    pub examined: usize,
    /// Eligible commits, newest first
    pub eligible: Vec<CommitId>,
}

impl RetentionReport {
    /// Report for a disabled retention window: nothing scanned, nothing eligible.
    pub fn disabled() -> Self {
        Self {
            window_days: 0,
            cutoff: None,
            examined: 0,
            eligible: Vec::new(),
        }
    }

    pub fn eligible_count(&self) -> usize {
        self.eligible.len()
    }
}

/// Snapshot store interface
pub trait SnapshotStore {
    /// Create the object database if absent, otherwise open it. Idempotent.
    fn init(&mut self) -> Result<(), StoreError>;

    fn is_initialized(&self) -> bool;

    /// Add the file's current content to the staging index.
    ///
    /// Returns the working-tree relative key the content was staged under.
    fn stage(&mut self, path: &Path) -> Result<String, StoreError>;

    /// Snapshot the staging index as a new commit whose parent is HEAD, then
    /// advance HEAD. An unchanged index still produces a commit.
    fn commit(&mut self, message: &str) -> Result<CommitId, StoreError>;

    /// Commit ids from HEAD back to the root commit, newest first.
    fn list_commits(&self) -> Result<Vec<CommitId>, StoreError>;

    fn latest_commit(&self) -> Result<Option<CommitId>, StoreError>;

    /// Replace the working tree with the tree of `hash` and move HEAD there.
    fn restore_to(&mut self, hash: &str) -> Result<CommitId, StoreError>;

    /// Identify commits reachable from HEAD older than `days`. Non-destructive.
    fn retention_sweep(&self, days: u32) -> Result<RetentionReport, StoreError>;
}
