//! Object id computation using BLAKE3

use crate::types::ObjectId;
use blake3::Hasher;

/// Object kind discriminators mixed into every id
pub const BLOB_TAG: &[u8] = b"blob";
pub const TREE_TAG: &[u8] = b"tree";
pub const COMMIT_TAG: &[u8] = b"commit";

/// Compute the id of an object payload
///
/// ObjectId = hash(tag || payload_len || payload)
///
/// The tag keeps a blob whose bytes happen to equal an encoded tree from
/// colliding with that tree.
pub fn compute_object_id(tag: &[u8], payload: &[u8]) -> ObjectId {
    let mut hasher = Hasher::new();

    hasher.update(tag);

    // Payload length (8 bytes, big-endian for determinism)
    hasher.update(&(payload.len() as u64).to_be_bytes());

    hasher.update(payload);

    ObjectId::from_bytes(*hasher.finalize().as_bytes())
}

/// Id of raw file content
pub fn compute_blob_id(content: &[u8]) -> ObjectId {
    compute_object_id(BLOB_TAG, content)
}
