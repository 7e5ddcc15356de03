//! Per-cycle comparison of watched paths against their last-seen timestamps.

use crate::watch::ChangeEvent;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, warn};

/// Last-observed modification time per path
///
/// Owned by the polling thread. Entries are created the first time a path is
/// seen and never removed: a deleted file simply stops producing events.
#[derive(Debug, Default)]
pub struct PollState {
    seen: HashMap<PathBuf, SystemTime>,
}

impl PollState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of paths observed so far
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    /// Compare one watched path against recorded state, invoking `emit` for
    /// every create/modify before returning.
    ///
    /// Directories are scanned one level deep in sorted order. A path that
    /// doesn't exist yet is skipped without error.
    pub fn check_path<F>(&mut self, path: &Path, emit: &mut F)
    where
        F: FnMut(ChangeEvent),
    {
        let metadata = match fs::metadata(path) {
            Ok(metadata) => metadata,
            Err(_) => return,
        };

        if !metadata.is_dir() {
            if let Ok(modified) = metadata.modified() {
                if let Some(event) = self.observe(path.to_path_buf(), modified) {
                    emit(event);
                }
            }
            return;
        }

        let entries = match fs::read_dir(path) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to read watched directory");
                return;
            }
        };

        let mut children: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|entry| entry.path()))
            .collect();
        children.sort();

        for child in children {
            // The entry may vanish between listing and stat.
            let modified = match fs::metadata(&child).and_then(|m| m.modified()) {
                Ok(modified) => modified,
                Err(_) => continue,
            };
            if let Some(event) = self.observe(child, modified) {
                emit(event);
            }
        }
    }

    fn observe(&mut self, path: PathBuf, modified: SystemTime) -> Option<ChangeEvent> {
        match self.seen.get_mut(&path) {
            None => {
                self.seen.insert(path.clone(), modified);
                debug!(path = %path.display(), "Detected new path");
                Some(ChangeEvent::Created(path))
            }
            Some(recorded) if *recorded != modified => {
                *recorded = modified;
                debug!(path = %path.display(), "Detected modification");
                Some(ChangeEvent::Modified(path))
            }
            Some(_) => None,
        }
    }
}
