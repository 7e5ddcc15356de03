//! Content-addressed object storage
//!
//! Blobs, trees and commits are stored on the filesystem at paths derived from
//! their ObjectId. Objects are immutable: writing an id that already exists is a
//! no-op, and every read re-derives the id to detect corruption.

use crate::error::StoreError;
use crate::store::hasher::{self, COMMIT_TAG, TREE_TAG};
use crate::types::ObjectId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Flat manifest of working-tree relative path (`/`-separated) to blob id
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tree {
    pub entries: BTreeMap<String, ObjectId>,
}

/// A recorded snapshot, linked to at most one parent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commit {
    pub tree: ObjectId,
    pub parent: Option<ObjectId>,
    /// Author time, UTC milliseconds since the epoch
    pub timestamp_ms: i64,
    pub message: String,
}

/// Any object the store knows how to persist
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Object {
    Blob(Vec<u8>),
    Tree(Tree),
    Commit(Commit),
}

impl Object {
    /// Compute the content-derived id of this object
    pub fn id(&self) -> Result<ObjectId, StoreError> {
        Ok(match self {
            Object::Blob(content) => hasher::compute_blob_id(content),
            Object::Tree(tree) => hasher::compute_object_id(TREE_TAG, &bincode::serialize(tree)?),
            Object::Commit(commit) => {
                hasher::compute_object_id(COMMIT_TAG, &bincode::serialize(commit)?)
            }
        })
    }

    fn kind(&self) -> &'static str {
        match self {
            Object::Blob(_) => "blob",
            Object::Tree(_) => "tree",
            Object::Commit(_) => "commit",
        }
    }
}

/// Content-addressed object storage
///
/// Layout: `{root}/objects/{hex[0..2]}/{hex[2..4]}/{hex}.obj`
pub struct ObjectStore {
    root: PathBuf,
}

impl ObjectStore {
    /// Open (creating if needed) object storage under `root`
    pub fn new<P: AsRef<Path>>(root: P) -> Result<Self, StoreError> {
        let root = root.as_ref().to_path_buf();
        let objects_dir = root.join("objects");
        fs::create_dir_all(&objects_dir).map_err(|e| StoreError::InitFailure {
            root: objects_dir.clone(),
            reason: e.to_string(),
        })?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Store an object and return its id
    ///
    /// Uses write-to-temp then rename so a crash never leaves a truncated object
    /// under its final name. Already-present ids are skipped.
    pub fn put(&self, object: &Object) -> Result<ObjectId, StoreError> {
        let id = object.id()?;
        if self.exists(&id) {
            return Ok(id);
        }

        let object_path = self.object_path(&id);
        let temp_path = object_path.with_extension("obj.tmp");

        if let Some(parent) = object_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let serialized = bincode::serialize(object)?;
        fs::write(&temp_path, &serialized)?;
        fs::rename(&temp_path, &object_path).map_err(|e| {
            let _ = fs::remove_file(&temp_path);
            StoreError::Io(e)
        })?;

        Ok(id)
    }

    pub fn put_blob(&self, content: &[u8]) -> Result<ObjectId, StoreError> {
        self.put(&Object::Blob(content.to_vec()))
    }

    pub fn put_tree(&self, tree: &Tree) -> Result<ObjectId, StoreError> {
        self.put(&Object::Tree(tree.clone()))
    }

    pub fn put_commit(&self, commit: &Commit) -> Result<ObjectId, StoreError> {
        self.put(&Object::Commit(commit.clone()))
    }

    /// Retrieve an object by id
    ///
    /// Returns `None` if the object doesn't exist, `HashMismatch` if the bytes
    /// on disk no longer hash to `id`.
    pub fn get(&self, id: &ObjectId) -> Result<Option<Object>, StoreError> {
        let object_path = self.object_path(id);
        if !object_path.exists() {
            return Ok(None);
        }

        let bytes = fs::read(&object_path)?;
        let object: Object = bincode::deserialize(&bytes)?;

        let actual = object.id()?;
        if actual != *id {
            return Err(StoreError::HashMismatch {
                expected: *id,
                actual,
            });
        }

        Ok(Some(object))
    }

    pub fn get_blob(&self, id: &ObjectId) -> Result<Option<Vec<u8>>, StoreError> {
        match self.get(id)? {
            Some(Object::Blob(content)) => Ok(Some(content)),
            Some(other) => Err(wrong_kind(id, "blob", &other)),
            None => Ok(None),
        }
    }

    pub fn get_tree(&self, id: &ObjectId) -> Result<Option<Tree>, StoreError> {
        match self.get(id)? {
            Some(Object::Tree(tree)) => Ok(Some(tree)),
            Some(other) => Err(wrong_kind(id, "tree", &other)),
            None => Ok(None),
        }
    }

    /// Look up a commit. Ids that exist but name a blob or tree resolve to `None`.
    pub fn get_commit(&self, id: &ObjectId) -> Result<Option<Commit>, StoreError> {
        match self.get(id)? {
            Some(Object::Commit(commit)) => Ok(Some(commit)),
            _ => Ok(None),
        }
    }

    pub fn exists(&self, id: &ObjectId) -> bool {
        self.object_path(id).exists()
    }

    fn object_path(&self, id: &ObjectId) -> PathBuf {
        let hex = id.to_hex();
        self.root
            .join("objects")
            .join(&hex[0..2])
            .join(&hex[2..4])
            .join(format!("{}.obj", hex))
    }
}

fn wrong_kind(id: &ObjectId, expected: &str, found: &Object) -> StoreError {
    StoreError::Backend(format!(
        "object {} is a {}, expected a {}",
        id,
        found.kind(),
        expected
    ))
}
