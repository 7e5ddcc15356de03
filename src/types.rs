//! Core identifier types shared by the snapshot store and the tracker.

use crate::error::StoreError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Raw BLAKE3 digest
pub type Hash = [u8; 32];

/// Length of a rendered identifier (lowercase hex of a 32-byte digest)
pub const ID_HEX_LEN: usize = 64;

/// Content-derived identifier of any stored object (blob, tree or commit)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectId(Hash);

impl ObjectId {
    pub fn from_bytes(bytes: Hash) -> Self {
        ObjectId(bytes)
    }

    pub fn as_bytes(&self) -> &Hash {
        &self.0
    }

    /// Lowercase hex rendering, always `ID_HEX_LEN` characters.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl FromStr for ObjectId {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != ID_HEX_LEN {
            return Err(StoreError::InvalidReference(s.to_string()));
        }
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(s.to_ascii_lowercase(), &mut bytes)
            .map_err(|_| StoreError::InvalidReference(s.to_string()))?;
        Ok(ObjectId(bytes))
    }
}

/// Identifier of a commit. The only handle callers use to reference history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CommitId(ObjectId);

impl CommitId {
    pub fn object_id(&self) -> ObjectId {
        self.0
    }

    pub fn to_hex(&self) -> String {
        self.0.to_hex()
    }
}

impl From<ObjectId> for CommitId {
    fn from(id: ObjectId) -> Self {
        CommitId(id)
    }
}

impl fmt::Display for CommitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl FromStr for CommitId {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(CommitId(s.parse()?))
    }
}
