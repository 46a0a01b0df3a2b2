//! Durable catalogue of tracked files, backed by `redb` (the same embedded
//! KV store used for the file-metadata cache this module is modeled on).

use redb::{ReadableTable, TableDefinition};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::ContextMateError;
use crate::state::audit::{ActionLogEntry, ActionQuery, AuditAction};

/// Table definition for tracked-file records.
/// Key: vault-relative path. Value: JSON-serialized `TrackedFile`.
const FILES_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("files");

/// Table definition for the append-only action log.
/// Key: auto-incrementing id (big-endian so range scans sort naturally).
/// Value: JSON-serialized `ActionLogEntry`.
const LOG_TABLE: TableDefinition<u64, &[u8]> = TableDefinition::new("action_log");

/// Sync state of a tracked file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
	Pending,
	Modified,
	Synced,
	Conflict,
	Deleted,
}

/// Local state record for one tracked file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackedFile {
	pub id: u128,
	pub path: String,
	pub content_hash: String,
	pub encrypted_hash: String,
	pub version: u64,
	pub size: u64,
	pub sync_state: SyncState,
	pub last_modified: u64,
	pub last_synced: Option<u64>,
}

/// Durable local state store. All writes are atomic per call (single redb
/// write transaction).
pub struct StateStore {
	db: redb::Database,
}

impl StateStore {
	/// Open or create the state database at `db_path`.
	pub fn open(db_path: &Path) -> Result<Self, ContextMateError> {
		let db = redb::Database::create(db_path)?;
		{
			let write_txn = db.begin_write()?;
			let _ = write_txn.open_table(FILES_TABLE)?;
			let _ = write_txn.open_table(LOG_TABLE)?;
			write_txn.commit()?;
		}
		Ok(StateStore { db })
	}

	/// Fetch the tracked record for `path`, if any.
	pub fn get(&self, path: &str) -> Result<Option<TrackedFile>, ContextMateError> {
		let read_txn = self.db.begin_read()?;
		let table = read_txn.open_table(FILES_TABLE)?;
		match table.get(path)? {
			Some(entry) => Ok(Some(serde_json::from_slice(entry.value())?)),
			None => Ok(None),
		}
	}

	/// Insert or replace the record for `record.path`. Idempotent: calling
	/// `upsert(r)` twice in a row is equivalent to calling it once.
	pub fn upsert(&self, record: &TrackedFile) -> Result<(), ContextMateError> {
		let bytes = serde_json::to_vec(record)?;
		let write_txn = self.db.begin_write()?;
		{
			let mut table = write_txn.open_table(FILES_TABLE)?;
			table.insert(record.path.as_str(), bytes.as_slice())?;
		}
		write_txn.commit()?;
		Ok(())
	}

	/// All tracked records, in path order.
	pub fn all(&self) -> Result<Vec<TrackedFile>, ContextMateError> {
		let read_txn = self.db.begin_read()?;
		let table = read_txn.open_table(FILES_TABLE)?;
		let mut out = Vec::new();
		for entry in table.iter()? {
			let (_, value) = entry?;
			out.push(serde_json::from_slice(value.value())?);
		}
		Ok(out)
	}

	/// All tracked records with the given sync state.
	pub fn by_state(&self, state: SyncState) -> Result<Vec<TrackedFile>, ContextMateError> {
		Ok(self.all()?.into_iter().filter(|f| f.sync_state == state).collect())
	}

	/// Records in `modified` or `pending` state — the set the full sweep
	/// uploads first.
	pub fn modified_or_pending(&self) -> Result<Vec<TrackedFile>, ContextMateError> {
		Ok(self
			.all()?
			.into_iter()
			.filter(|f| matches!(f.sync_state, SyncState::Modified | SyncState::Pending))
			.collect())
	}

	/// Mark a path synced at the given server-agreed version and hash.
	/// Idempotent once the target version is reached: calling it again with
	/// the same version/hash is a no-op beyond rewriting identical bytes.
	pub fn mark_synced(
		&self,
		path: &str,
		version: u64,
		encrypted_hash: &str,
		content_hash: &str,
		size: u64,
		now_ms: u64,
	) -> Result<(), ContextMateError> {
		let mut record = self.get(path)?.unwrap_or_else(|| TrackedFile {
			id: new_file_id(),
			path: path.to_string(),
			content_hash: content_hash.to_string(),
			encrypted_hash: encrypted_hash.to_string(),
			version,
			size,
			sync_state: SyncState::Synced,
			last_modified: now_ms,
			last_synced: Some(now_ms),
		});
		record.content_hash = content_hash.to_string();
		record.encrypted_hash = encrypted_hash.to_string();
		record.version = version;
		record.size = size;
		record.sync_state = SyncState::Synced;
		record.last_synced = Some(now_ms);
		self.upsert(&record)
	}

	/// Move a tracked record into `conflict` state, recording the remote's
	/// version and hash.
	pub fn mark_conflict(
		&self,
		path: &str,
		remote_version: u64,
		remote_encrypted_hash: &str,
		now_ms: u64,
	) -> Result<(), ContextMateError> {
		let mut record = self.get(path)?.ok_or_else(|| ContextMateError::NotFound {
			what: format!("tracked file {}", path),
		})?;
		record.version = remote_version;
		record.encrypted_hash = remote_encrypted_hash.to_string();
		record.sync_state = SyncState::Conflict;
		record.last_modified = now_ms;
		self.upsert(&record)
	}

	/// Remove the tracked record for `path` (local delete / remote delete).
	pub fn remove(&self, path: &str) -> Result<(), ContextMateError> {
		let write_txn = self.db.begin_write()?;
		{
			let mut table = write_txn.open_table(FILES_TABLE)?;
			table.remove(path)?;
		}
		write_txn.commit()?;
		Ok(())
	}

	/// Append an entry to the action log.
	pub fn append_action(&self, entry: ActionLogEntry) -> Result<(), ContextMateError> {
		let write_txn = self.db.begin_write()?;
		{
			let mut table = write_txn.open_table(LOG_TABLE)?;
			let next_id = table.iter()?.next_back().map(|r| r.map(|(k, _)| k.value() + 1)).transpose()?.unwrap_or(0);
			let mut stamped = entry;
			stamped.id = next_id;
			let bytes = serde_json::to_vec(&stamped)?;
			table.insert(next_id, bytes.as_slice())?;
		}
		write_txn.commit()?;
		Ok(())
	}

	/// Query the action log. Results are returned in reverse insertion
	/// order (ties broken by descending id — the log's id is already
	/// monotonic so this is simply a reverse scan).
	pub fn query_actions(&self, query: &ActionQuery) -> Result<Vec<ActionLogEntry>, ContextMateError> {
		let read_txn = self.db.begin_read()?;
		let table = read_txn.open_table(LOG_TABLE)?;
		let mut all: Vec<ActionLogEntry> = Vec::new();
		for entry in table.iter()? {
			let (_, value) = entry?;
			all.push(serde_json::from_slice(value.value())?);
		}
		all.reverse();
		all.retain(|e| {
			if let Some(action) = &query.action {
				if e.action != *action {
					return false;
				}
			}
			if let Some(prefix) = &query.path_prefix {
				if !e.path.starts_with(prefix.as_str()) {
					return false;
				}
			}
			if let Some(since) = query.since {
				if e.timestamp < since {
					return false;
				}
			}
			true
		});
		let offset = query.offset.unwrap_or(0);
		let limit = query.limit.unwrap_or(usize::MAX);
		Ok(all.into_iter().skip(offset).take(limit).collect())
	}
}

/// Allocate a fresh 128-bit identifier for a first-observed file.
pub fn new_file_id() -> u128 {
	uuid::Uuid::new_v4().as_u128()
}

/// Compute the sibling conflict path for `path`: a `.md` suffix becomes
/// `.conflict.md`; otherwise `.conflict` is appended.
pub fn conflict_sibling_path(path: &str) -> PathBuf {
	if let Some(stem) = path.strip_suffix(".md") {
		PathBuf::from(format!("{}.conflict.md", stem))
	} else {
		PathBuf::from(format!("{}.conflict", path))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use tempfile::tempdir;

	fn fresh_store() -> (StateStore, tempfile::TempDir) {
		let dir = tempdir().unwrap();
		let store = StateStore::open(&dir.path().join("state.redb")).unwrap();
		(store, dir)
	}

	fn sample(path: &str) -> TrackedFile {
		TrackedFile {
			id: new_file_id(),
			path: path.to_string(),
			content_hash: "a".repeat(64),
			encrypted_hash: "b".repeat(64),
			version: 0,
			size: 3,
			sync_state: SyncState::Pending,
			last_modified: 1000,
			last_synced: None,
		}
	}

	#[test]
	fn upsert_then_get_round_trips() {
		let (store, _dir) = fresh_store();
		let record = sample("skills/a/SKILL.md");
		store.upsert(&record).unwrap();
		let fetched = store.get("skills/a/SKILL.md").unwrap().unwrap();
		assert_eq!(fetched.content_hash, record.content_hash);
	}

	#[test]
	fn upsert_is_idempotent() {
		let (store, _dir) = fresh_store();
		let record = sample("a.md");
		store.upsert(&record).unwrap();
		store.upsert(&record).unwrap();
		assert_eq!(store.all().unwrap().len(), 1);
	}

	#[test]
	fn mark_synced_sets_state_and_version() {
		let (store, _dir) = fresh_store();
		store.upsert(&sample("a.md")).unwrap();
		store.mark_synced("a.md", 1, &"c".repeat(64), &"d".repeat(64), 10, 2000).unwrap();
		let record = store.get("a.md").unwrap().unwrap();
		assert_eq!(record.sync_state, SyncState::Synced);
		assert_eq!(record.version, 1);
		assert_eq!(record.last_synced, Some(2000));
	}

	#[test]
	fn mark_synced_is_idempotent_at_target_version() {
		let (store, _dir) = fresh_store();
		store.upsert(&sample("a.md")).unwrap();
		store.mark_synced("a.md", 1, &"c".repeat(64), &"d".repeat(64), 10, 2000).unwrap();
		store.mark_synced("a.md", 1, &"c".repeat(64), &"d".repeat(64), 10, 2000).unwrap();
		let record = store.get("a.md").unwrap().unwrap();
		assert_eq!(record.version, 1);
	}

	#[test]
	fn remove_deletes_record() {
		let (store, _dir) = fresh_store();
		store.upsert(&sample("a.md")).unwrap();
		store.remove("a.md").unwrap();
		assert!(store.get("a.md").unwrap().is_none());
	}

	#[test]
	fn by_state_filters() {
		let (store, _dir) = fresh_store();
		let mut modified = sample("m.md");
		modified.sync_state = SyncState::Modified;
		store.upsert(&modified).unwrap();
		store.upsert(&sample("p.md")).unwrap();
		let pending = store.by_state(SyncState::Pending).unwrap();
		assert_eq!(pending.len(), 1);
		assert_eq!(pending[0].path, "p.md");
	}

	#[test]
	fn action_log_returns_reverse_insertion_order() {
		let (store, _dir) = fresh_store();
		for i in 0..3 {
			store
				.append_action(ActionLogEntry {
					id: 0,
					action: AuditAction::Upload,
					path: format!("f{}.md", i),
					version: Some(i),
					size: None,
					timestamp: 100 + i,
					details: None,
				})
				.unwrap();
		}
		let results = store.query_actions(&ActionQuery::default()).unwrap();
		assert_eq!(results.len(), 3);
		assert_eq!(results[0].path, "f2.md");
		assert_eq!(results[2].path, "f0.md");
	}

	#[test]
	fn conflict_sibling_path_rules() {
		assert_eq!(conflict_sibling_path("a/SKILL.md"), PathBuf::from("a/SKILL.conflict.md"));
		assert_eq!(conflict_sibling_path("a/notes.txt"), PathBuf::from("a/notes.txt.conflict"));
	}
}

// vim: ts=4
