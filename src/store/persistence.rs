//! Persistence layer for the Snapshot Store
//!
//! Objects live in a content-addressed [`ObjectStore`]; the staging index and
//! HEAD live in a sled database next to it:
//!
//! ```text
//! {root}/.history/objects/..   content-addressed blobs, trees, commits
//! {root}/.history/db           sled: `index` (path -> blob id), `refs` (HEAD)
//! {root}/<working tree files>
//! ```

use crate::error::StoreError;
use crate::store::objects::{Commit, ObjectStore, Tree};
use crate::store::{CommitRecord, RetentionReport, SnapshotStore, HISTORY_DIR};
use crate::types::{CommitId, Hash, ObjectId};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

const TREE_INDEX: &str = "index";
const TREE_REFS: &str = "refs";
const HEAD_KEY: &[u8] = b"HEAD";

struct Backend {
    objects: ObjectStore,
    db: sled::Db,
    index: sled::Tree,
    refs: sled::Tree,
}

/// Sled-backed implementation of [`SnapshotStore`]
pub struct SledSnapshotStore {
    root: PathBuf,
    backend: Option<Backend>,
}

impl SledSnapshotStore {
    /// Bind a store to `root` without touching the filesystem. Call
    /// [`SnapshotStore::init`] before any other operation.
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            backend: None,
        }
    }

    /// Bind and initialize in one step
    pub fn open<P: AsRef<Path>>(root: P) -> Result<Self, StoreError> {
        let mut store = Self::new(root);
        store.init()?;
        Ok(store)
    }

    /// The history root (also the working tree)
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Internal directory holding the object database and index
    pub fn history_dir(&self) -> PathBuf {
        self.root.join(HISTORY_DIR)
    }

    fn backend(&self) -> Result<&Backend, StoreError> {
        self.backend.as_ref().ok_or(StoreError::NotInitialized)
    }

    /// Commit with an explicit author time
    ///
    /// The recorded time is clamped to the parent's time so history walked from
    /// HEAD is never out of order, even if the wall clock steps backwards.
    pub fn commit_at(
        &mut self,
        message: &str,
        timestamp: DateTime<Utc>,
    ) -> Result<CommitId, StoreError> {
        let backend = self.backend()?;
        let id = write_commit(backend, message, timestamp).map_err(|e| {
            StoreError::CommitFailure {
                message: message.to_string(),
                reason: e.to_string(),
            }
        })?;
        info!(commit = %id, message, "Committed snapshot");
        Ok(CommitId::from(id))
    }

    /// Load the metadata of a single commit
    pub fn show(&self, id: &CommitId) -> Result<CommitRecord, StoreError> {
        let backend = self.backend()?;
        let commit = backend
            .objects
            .get_commit(&id.object_id())?
            .ok_or_else(|| StoreError::InvalidReference(id.to_hex()))?;
        Ok(CommitRecord::from_commit(id.object_id(), &commit))
    }

    /// Full commit records from HEAD back to the root commit
    pub fn log(&self) -> Result<Vec<CommitRecord>, StoreError> {
        let backend = self.backend()?;
        let mut records = Vec::new();
        let mut cursor = read_head(backend)?;

        while let Some(id) = cursor {
            let commit = backend.objects.get_commit(&id)?.ok_or_else(|| {
                StoreError::Backend(format!("history references missing commit {}", id))
            })?;
            cursor = commit.parent;
            records.push(CommitRecord::from_commit(id, &commit));
        }

        Ok(records)
    }

    /// Content of `rel_path` as recorded in commit `id`, if present in its tree
    pub fn file_at(&self, id: &CommitId, rel_path: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let backend = self.backend()?;
        let (_, tree) = resolve_tree(backend, &id.object_id())
            .map_err(|_| StoreError::InvalidReference(id.to_hex()))?;
        match tree.entries.get(rel_path) {
            Some(blob) => backend.objects.get_blob(blob),
            None => Ok(None),
        }
    }

    /// Keys currently present in the staging index, sorted
    pub fn staged_paths(&self) -> Result<Vec<String>, StoreError> {
        Ok(read_index(self.backend()?)?.into_keys().collect())
    }

    /// Resolve where `path` lives in the working tree, copying it under the
    /// root by base name when it lives elsewhere.
    fn place_in_working_tree(&self, path: &Path) -> Result<(String, PathBuf), StoreError> {
        if !path.exists() {
            return Err(StoreError::FileNotFound(path.to_path_buf()));
        }
        if !path.is_file() {
            return Err(StoreError::InvalidPath(format!(
                "{} is not a regular file",
                path.display()
            )));
        }

        let abs_root = dunce::canonicalize(&self.root)?;
        let abs_file = dunce::canonicalize(path)
            .map_err(|_| StoreError::FileNotFound(path.to_path_buf()))?;

        if abs_file.starts_with(abs_root.join(HISTORY_DIR)) {
            return Err(StoreError::InvalidPath(format!(
                "{} is inside the history database",
                path.display()
            )));
        }

        if let Ok(relative) = abs_file.strip_prefix(&abs_root) {
            return Ok((index_key(relative)?, abs_file.clone()));
        }

        // Same base name from different directories overwrites the earlier copy.
        let name = abs_file
            .file_name()
            .ok_or_else(|| StoreError::InvalidPath(format!("{} has no file name", path.display())))?;
        utf8_name(name, path)?;
        let target = abs_root.join(name);
        fs::copy(&abs_file, &target)?;
        debug!(source = %abs_file.display(), target = %target.display(), "Copied external file into history root");

        Ok((utf8_name(name, path)?.to_string(), target))
    }
}

impl SnapshotStore for SledSnapshotStore {
    fn init(&mut self) -> Result<(), StoreError> {
        if self.backend.is_some() {
            return Ok(());
        }

        let init_failure = |reason: String| StoreError::InitFailure {
            root: self.root.clone(),
            reason,
        };

        fs::create_dir_all(&self.root).map_err(|e| init_failure(e.to_string()))?;

        let history = self.history_dir();
        let db_path = history.join("db");
        let reopened = db_path.exists();

        let objects = ObjectStore::new(&history)?;
        let db = sled::open(&db_path).map_err(|e| init_failure(format!("sled: {}", e)))?;
        let index = db
            .open_tree(TREE_INDEX)
            .map_err(|e| init_failure(format!("sled: {}", e)))?;
        let refs = db
            .open_tree(TREE_REFS)
            .map_err(|e| init_failure(format!("sled: {}", e)))?;

        self.backend = Some(Backend {
            objects,
            db,
            index,
            refs,
        });

        info!(root = %self.root.display(), reopened, "Snapshot store ready");
        Ok(())
    }

    fn is_initialized(&self) -> bool {
        self.backend.is_some()
    }

    fn stage(&mut self, path: &Path) -> Result<String, StoreError> {
        let backend = self.backend()?;
        let (key, source) = self.place_in_working_tree(path)?;

        let content = fs::read(&source)?;
        let blob = backend.objects.put_blob(&content)?;
        backend
            .index
            .insert(key.as_bytes(), blob.as_bytes().as_slice())?;

        debug!(path = %path.display(), key = %key, blob = %blob, "Staged file");
        Ok(key)
    }

    fn commit(&mut self, message: &str) -> Result<CommitId, StoreError> {
        self.commit_at(message, Utc::now())
    }

    fn list_commits(&self) -> Result<Vec<CommitId>, StoreError> {
        Ok(self.log()?.into_iter().map(|record| record.id).collect())
    }

    fn latest_commit(&self) -> Result<Option<CommitId>, StoreError> {
        Ok(read_head(self.backend()?)?.map(CommitId::from))
    }

    fn restore_to(&mut self, hash: &str) -> Result<CommitId, StoreError> {
        let backend = self.backend()?;
        let target: ObjectId = hash.trim().parse()?;
        let (_, tree) = resolve_tree(backend, &target)
            .map_err(|_| StoreError::InvalidReference(hash.to_string()))?;

        // Load and verify every blob before the working tree is touched.
        let mut files = Vec::with_capacity(tree.entries.len());
        for (key, blob) in &tree.entries {
            let relative = safe_relative_path(key)?;
            let content = backend.objects.get_blob(blob)?.ok_or_else(|| {
                StoreError::Backend(format!("tree {} references missing blob {}", target, blob))
            })?;
            files.push((relative, content));
        }

        // Every file is written to a temp sibling before any target is replaced.
        let staged = write_temp_files(&self.root, &files)?;
        for (done, (temp_path, dest)) in staged.iter().enumerate() {
            if let Err(e) = fs::rename(temp_path, dest) {
                for (temp, _) in &staged[done..] {
                    let _ = fs::remove_file(temp);
                }
                return Err(StoreError::Io(e));
            }
        }
        let removed = remove_untracked(&self.root, &tree)?;

        let mut batch = sled::Batch::default();
        for key in read_index(backend)?.into_keys() {
            if !tree.entries.contains_key(&key) {
                batch.remove(key.as_bytes());
            }
        }
        for (key, blob) in &tree.entries {
            batch.insert(key.as_bytes(), blob.as_bytes().as_slice());
        }
        backend.index.apply_batch(batch)?;
        backend.refs.insert(HEAD_KEY, target.as_bytes().as_slice())?;
        backend.db.flush()?;

        info!(
            commit = %target,
            restored = files.len(),
            removed,
            "Restored working tree"
        );
        Ok(CommitId::from(target))
    }

    fn retention_sweep(&self, days: u32) -> Result<RetentionReport, StoreError> {
        // A window reaching past the earliest representable time has no cutoff:
        // every commit is younger than it.
        let cutoff = chrono::Duration::try_days(i64::from(days))
            .and_then(|window| Utc::now().checked_sub_signed(window));
        let log = self.log()?;

        let eligible: Vec<CommitId> = match cutoff {
            Some(cutoff) => log
                .iter()
                .filter(|record| record.timestamp < cutoff)
                .map(|record| record.id)
                .collect(),
            None => Vec::new(),
        };

        if eligible.is_empty() {
            info!(days, examined = log.len(), "No commits older than retention window");
        } else {
            info!(
                days,
                examined = log.len(),
                eligible = eligible.len(),
                "Commits eligible for compaction (reporting only)"
            );
        }

        Ok(RetentionReport {
            window_days: days,
            cutoff,
            examined: log.len(),
            eligible,
        })
    }
}

fn write_commit(
    backend: &Backend,
    message: &str,
    timestamp: DateTime<Utc>,
) -> Result<ObjectId, StoreError> {
    let tree = Tree {
        entries: read_index(backend)?,
    };
    let tree_id = backend.objects.put_tree(&tree)?;

    let previous = backend.refs.get(HEAD_KEY)?;
    let parent = previous.as_ref().map(|raw| object_id_from(raw)).transpose()?;

    let mut timestamp_ms = timestamp.timestamp_millis();
    if let Some(parent_id) = &parent {
        let parent_commit = backend.objects.get_commit(parent_id)?.ok_or_else(|| {
            StoreError::Backend(format!("HEAD references missing commit {}", parent_id))
        })?;
        timestamp_ms = timestamp_ms.max(parent_commit.timestamp_ms);
    }

    let commit = Commit {
        tree: tree_id,
        parent,
        timestamp_ms,
        message: message.to_string(),
    };
    let commit_id = backend.objects.put_commit(&commit)?;

    backend.refs.insert(HEAD_KEY, commit_id.as_bytes().as_slice())?;
    if let Err(e) = backend.db.flush() {
        // Put HEAD back so a failed commit is never reported as the new HEAD.
        let rollback = match &previous {
            Some(raw) => backend.refs.insert(HEAD_KEY, raw.clone()).map(|_| ()),
            None => backend.refs.remove(HEAD_KEY).map(|_| ()),
        };
        if let Err(rollback_err) = rollback {
            warn!(error = %rollback_err, "Failed to roll back HEAD after flush error");
        }
        return Err(e.into());
    }

    Ok(commit_id)
}

fn read_head(backend: &Backend) -> Result<Option<ObjectId>, StoreError> {
    backend
        .refs
        .get(HEAD_KEY)?
        .map(|raw| object_id_from(&raw))
        .transpose()
}

fn read_index(backend: &Backend) -> Result<BTreeMap<String, ObjectId>, StoreError> {
    let mut entries = BTreeMap::new();
    for item in backend.index.iter() {
        let (key, value) = item?;
        let key = String::from_utf8(key.to_vec())
            .map_err(|_| StoreError::Backend("index holds a non UTF-8 path".to_string()))?;
        entries.insert(key, object_id_from(&value)?);
    }
    Ok(entries)
}

fn resolve_tree(backend: &Backend, id: &ObjectId) -> Result<(Commit, Tree), StoreError> {
    let commit = backend
        .objects
        .get_commit(id)?
        .ok_or_else(|| StoreError::InvalidReference(id.to_hex()))?;
    let tree = backend.objects.get_tree(&commit.tree)?.ok_or_else(|| {
        StoreError::Backend(format!("commit {} references missing tree {}", id, commit.tree))
    })?;
    Ok((commit, tree))
}

fn object_id_from(raw: &[u8]) -> Result<ObjectId, StoreError> {
    let bytes: Hash = raw
        .try_into()
        .map_err(|_| StoreError::Backend(format!("stored id has {} bytes, expected 32", raw.len())))?;
    Ok(ObjectId::from_bytes(bytes))
}

/// Working-tree relative path rendered with `/` separators
fn index_key(relative: &Path) -> Result<String, StoreError> {
    let parts: Vec<String> = relative
        .components()
        .map(|component| match component {
            Component::Normal(part) => utf8_name(part, relative).map(str::to_string),
            other => Err(StoreError::InvalidPath(format!(
                "unexpected path component {:?} in {}",
                other,
                relative.display()
            ))),
        })
        .collect::<Result<_, _>>()?;

    if parts.is_empty() {
        return Err(StoreError::InvalidPath(
            "cannot stage the history root itself".to_string(),
        ));
    }
    Ok(parts.join("/"))
}

/// Path names are stored as UTF-8; anything else cannot round-trip.
fn utf8_name<'a>(name: &'a std::ffi::OsStr, path: &Path) -> Result<&'a str, StoreError> {
    name.to_str().ok_or_else(|| {
        StoreError::InvalidPath(format!("{} is not valid UTF-8", path.display()))
    })
}

/// Reject tree keys that would escape the working tree
fn safe_relative_path(key: &str) -> Result<PathBuf, StoreError> {
    let path = PathBuf::from(key);
    let escapes = path
        .components()
        .any(|component| !matches!(component, Component::Normal(_)));
    if escapes || key.is_empty() || key == HISTORY_DIR || key.starts_with(&format!("{}/", HISTORY_DIR)) {
        return Err(StoreError::InvalidPath(format!("unsafe tree entry {:?}", key)));
    }
    Ok(path)
}

/// Write each file's content next to its target under a temp name.
///
/// Returns `(temp, target)` pairs. On failure every temp file written so far
/// is removed and no target has been touched.
fn write_temp_files(
    root: &Path,
    files: &[(PathBuf, Vec<u8>)],
) -> Result<Vec<(PathBuf, PathBuf)>, StoreError> {
    let mut staged: Vec<(PathBuf, PathBuf)> = Vec::with_capacity(files.len());

    for (relative, content) in files {
        let target = root.join(relative);
        let temp_path = temp_sibling(&target);
        let written = target
            .parent()
            .map_or(Ok(()), fs::create_dir_all)
            .and_then(|_| fs::write(&temp_path, content));

        if let Err(e) = written {
            let _ = fs::remove_file(&temp_path);
            for (temp, _) in &staged {
                let _ = fs::remove_file(temp);
            }
            return Err(StoreError::Io(e));
        }
        staged.push((temp_path, target));
    }

    Ok(staged)
}

fn temp_sibling(target: &Path) -> PathBuf {
    let mut name = std::ffi::OsString::from(".");
    name.push(target.file_name().unwrap_or_default());
    name.push(".restore.tmp");
    target.with_file_name(name)
}

/// Delete working-tree files absent from `tree`, then prune emptied directories.
fn remove_untracked(root: &Path, tree: &Tree) -> Result<usize, StoreError> {
    let mut removed = 0;
    let mut directories = Vec::new();

    let walker = WalkDir::new(root)
        .min_depth(1)
        .follow_links(false)
        .into_iter()
        .filter_entry(|entry| !(entry.depth() == 1 && entry.file_name() == HISTORY_DIR));

    for entry in walker {
        let entry = entry.map_err(|e| {
            StoreError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                format!("Failed to walk working tree: {}", e),
            ))
        })?;

        if entry.file_type().is_dir() {
            directories.push(entry.path().to_path_buf());
            continue;
        }

        let relative = entry
            .path()
            .strip_prefix(root)
            .map_err(|e| StoreError::InvalidPath(e.to_string()))?;
        // Names that cannot form an index key are never tracked.
        let tracked = index_key(relative).map_or(false, |key| tree.entries.contains_key(&key));
        if !tracked {
            fs::remove_file(entry.path())?;
            removed += 1;
        }
    }

    // Deepest first so nested empty directories collapse.
    directories.sort_by_key(|dir| std::cmp::Reverse(dir.components().count()));
    for dir in directories {
        if fs::read_dir(&dir)?.next().is_none() {
            fs::remove_dir(&dir)?;
        }
    }

    Ok(removed)
}
