//! Black-box coverage of the server's optimistic-concurrency file storage
//!.

use contextmate::server::storage::ServerStorage;
use contextmate::ContextMateError;
use tempfile::tempdir;

#[test]
fn first_upload_creates_version_one() {
	let dir = tempdir().unwrap();
	let storage = ServerStorage::open(&dir.path().join("server.redb")).unwrap();
	let record = storage.upsert_file_cas("u1", "skills/rust.md", 0, "hash-a", 100, 1_000).unwrap();
	assert_eq!(record.version, 1);
	assert_eq!(record.encrypted_hash, "hash-a");
}

#[test]
fn matching_expected_version_bumps_it() {
	let dir = tempdir().unwrap();
	let storage = ServerStorage::open(&dir.path().join("server.redb")).unwrap();
	storage.upsert_file_cas("u1", "skills/rust.md", 0, "hash-a", 100, 1_000).unwrap();
	let record = storage.upsert_file_cas("u1", "skills/rust.md", 1, "hash-b", 120, 2_000).unwrap();
	assert_eq!(record.version, 2);
	assert_eq!(record.encrypted_hash, "hash-b");
}

#[test]
fn stale_expected_version_is_rejected_without_mutation() {
	let dir = tempdir().unwrap();
	let storage = ServerStorage::open(&dir.path().join("server.redb")).unwrap();
	storage.upsert_file_cas("u1", "skills/rust.md", 0, "hash-a", 100, 1_000).unwrap();
	storage.upsert_file_cas("u1", "skills/rust.md", 1, "hash-b", 120, 2_000).unwrap();

	let result = storage.upsert_file_cas("u1", "skills/rust.md", 1, "hash-c", 130, 3_000);
	match result {
		Err(ContextMateError::VersionConflict { current_version, expected_version, .. }) => {
			assert_eq!(current_version, 2);
			assert_eq!(expected_version, 1);
		}
		other => panic!("expected a version conflict, got {:?}", other),
	}

	// The conflicting write must not have mutated server state.
	let current = storage.get_file("u1", "skills/rust.md").unwrap().unwrap();
	assert_eq!(current.version, 2);
	assert_eq!(current.encrypted_hash, "hash-b");
}

#[test]
fn files_are_scoped_per_user() {
	let dir = tempdir().unwrap();
	let storage = ServerStorage::open(&dir.path().join("server.redb")).unwrap();
	storage.upsert_file_cas("alice", "skills/rust.md", 0, "hash-alice", 10, 1_000).unwrap();
	storage.upsert_file_cas("bob", "skills/rust.md", 0, "hash-bob", 20, 1_000).unwrap();

	let alice_files = storage.list_files("alice").unwrap();
	let bob_files = storage.list_files("bob").unwrap();
	assert_eq!(alice_files.len(), 1);
	assert_eq!(bob_files.len(), 1);
	assert_eq!(alice_files[0].encrypted_hash, "hash-alice");
	assert_eq!(bob_files[0].encrypted_hash, "hash-bob");
}

#[test]
fn deleting_a_file_removes_it_from_listings() {
	let dir = tempdir().unwrap();
	let storage = ServerStorage::open(&dir.path().join("server.redb")).unwrap();
	storage.upsert_file_cas("u1", "skills/rust.md", 0, "hash-a", 100, 1_000).unwrap();
	assert!(storage.delete_file("u1", "skills/rust.md").unwrap());
	assert!(storage.list_files("u1").unwrap().is_empty());
	assert!(!storage.delete_file("u1", "skills/rust.md").unwrap());
}
