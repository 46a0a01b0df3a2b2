//! Content-addressed blob store: encrypted
//! envelope bytes are stored on disk keyed by their BLAKE3 content hash, so
//! a re-upload of already-seen ciphertext is a cheap metadata operation.

use std::path::{Path, PathBuf};

use crate::crypto::hash::hash_content;
use crate::error::ContextMateError;

/// On-disk content-addressed store, sharded two hex chars deep to keep any
/// one directory from growing unbounded.
pub struct BlobStore {
	root: PathBuf,
}

impl BlobStore {
	pub fn new(root: PathBuf) -> Result<Self, ContextMateError> {
		std::fs::create_dir_all(&root)?;
		Ok(BlobStore { root })
	}

	fn path_for(&self, hash_hex: &str) -> PathBuf {
		let (shard, rest) = hash_hex.split_at(2.min(hash_hex.len()));
		self.root.join(shard).join(rest)
	}

	/// Whether a blob with this hash is already stored.
	pub fn contains(&self, hash_hex: &str) -> bool {
		self.path_for(hash_hex).is_file()
	}

	/// Store `bytes` under their own BLAKE3 hash, returning the hash. A
	/// write for an already-present hash is a no-op (content-addressed
	/// storage is idempotent by construction).
	pub fn put(&self, bytes: &[u8]) -> Result<String, ContextMateError> {
		let hash_hex = hash_content(bytes);
		let dest = self.path_for(&hash_hex);
		if dest.is_file() {
			return Ok(hash_hex);
		}
		if let Some(parent) = dest.parent() {
			std::fs::create_dir_all(parent)?;
		}
		let tmp = dest.with_extension("tmp");
		std::fs::write(&tmp, bytes)?;
		std::fs::rename(&tmp, &dest)?;
		Ok(hash_hex)
	}

	/// Fetch a blob by hash.
	pub fn get(&self, hash_hex: &str) -> Result<Vec<u8>, ContextMateError> {
		let path = self.path_for(hash_hex);
		std::fs::read(&path).map_err(|e| {
			if e.kind() == std::io::ErrorKind::NotFound {
				ContextMateError::NotFound { what: format!("blob {}", hash_hex) }
			} else {
				ContextMateError::Io(e)
			}
		})
	}

	/// Remove a blob. Missing blobs are not an error (delete is idempotent).
	pub fn remove(&self, hash_hex: &str) -> Result<(), ContextMateError> {
		let path = self.path_for(hash_hex);
		match std::fs::remove_file(&path) {
			Ok(()) => Ok(()),
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
			Err(e) => Err(ContextMateError::Io(e)),
		}
	}

	pub fn root(&self) -> &Path {
		&self.root
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use tempfile::tempdir;

	#[test]
	fn put_then_get_round_trips() {
		let dir = tempdir().unwrap();
		let store = BlobStore::new(dir.path().join("blobs")).unwrap();
		let hash = store.put(b"envelope bytes").unwrap();
		assert_eq!(store.get(&hash).unwrap(), b"envelope bytes");
	}

	#[test]
	fn put_is_idempotent_for_identical_content() {
		let dir = tempdir().unwrap();
		let store = BlobStore::new(dir.path().join("blobs")).unwrap();
		let h1 = store.put(b"same").unwrap();
		let h2 = store.put(b"same").unwrap();
		assert_eq!(h1, h2);
	}

	#[test]
	fn missing_blob_is_not_found() {
		let dir = tempdir().unwrap();
		let store = BlobStore::new(dir.path().join("blobs")).unwrap();
		let err = store.get(&"0".repeat(64)).unwrap_err();
		assert!(matches!(err, ContextMateError::NotFound { .. }));
	}

	#[test]
	fn remove_is_idempotent() {
		let dir = tempdir().unwrap();
		let store = BlobStore::new(dir.path().join("blobs")).unwrap();
		let hash = store.put(b"data").unwrap();
		store.remove(&hash).unwrap();
		store.remove(&hash).unwrap();
		assert!(!store.contains(&hash));
	}
}

// vim: ts=4
