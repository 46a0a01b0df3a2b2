//! Server-side metadata storage: `redb` tables holding per-user file
//! records, keeping blob bytes on disk and only metadata in the embedded
//! database.

use redb::{ReadableTable, TableDefinition};
use serde::{Deserialize, Serialize};

use crate::error::ContextMateError;
use crate::state::{ActionLogEntry, ActionQuery, AuditAction};

const USERS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("users");
const USERS_BY_AUTH_HASH: TableDefinition<&str, &str> = TableDefinition::new("users_by_auth_hash");
const DEVICES_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("devices");
const FILES_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("files");
const API_KEYS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("api_keys");
const API_KEYS_BY_HASH: TableDefinition<&str, &str> = TableDefinition::new("api_keys_by_hash");
const AUDIT_TABLE: TableDefinition<u64, &[u8]> = TableDefinition::new("server_audit_log");

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRecord {
	pub id: String,
	pub auth_key_hash: String,
	pub salt: String,
	pub encrypted_master_key: String,
	pub created_at: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceRecord {
	pub id: String,
	pub user_id: String,
	pub name: String,
	pub public_key: String,
	pub encrypted_settings: Option<String>,
	pub created_at: u64,
	pub last_seen_at: Option<u64>,
}

/// Server file record. Plaintext is never
/// present; the blob itself lives in the content-addressed store
/// (`server::blobs`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerFileRecord {
	pub id: String,
	pub user_id: String,
	pub path: String,
	pub version: u64,
	pub encrypted_hash: String,
	pub size: u64,
	pub created_at: u64,
	pub updated_at: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApiKeyPermissions {
	Read,
	Write,
	ReadWrite,
}

impl ApiKeyPermissions {
	pub fn can_read(&self) -> bool {
		matches!(self, ApiKeyPermissions::Read | ApiKeyPermissions::ReadWrite)
	}

	pub fn can_write(&self) -> bool {
		matches!(self, ApiKeyPermissions::Write | ApiKeyPermissions::ReadWrite)
	}
}

/// API key record. `key_hash` is BLAKE3 of the
/// bearer secret; the secret itself is returned to the caller exactly once
/// at creation time and never stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKeyRecord {
	pub id: String,
	pub user_id: String,
	pub name: String,
	pub key_hash: String,
	pub scope: String,
	pub permissions: ApiKeyPermissions,
	pub created_at: u64,
	pub revoked_at: Option<u64>,
}

fn file_key(user_id: &str, path: &str) -> String {
	format!("{}\u{0}{}", user_id, path)
}

/// Embedded metadata store for the server: users, devices, file records,
/// API keys, and the server-side audit log.
pub struct ServerStorage {
	db: redb::Database,
}

impl ServerStorage {
	pub fn open(db_path: &std::path::Path) -> Result<Self, ContextMateError> {
		let db = redb::Database::create(db_path)?;
		{
			let write_txn = db.begin_write()?;
			let _ = write_txn.open_table(USERS_TABLE)?;
			let _ = write_txn.open_table(USERS_BY_AUTH_HASH)?;
			let _ = write_txn.open_table(DEVICES_TABLE)?;
			let _ = write_txn.open_table(FILES_TABLE)?;
			let _ = write_txn.open_table(API_KEYS_TABLE)?;
			let _ = write_txn.open_table(API_KEYS_BY_HASH)?;
			let _ = write_txn.open_table(AUDIT_TABLE)?;
			write_txn.commit()?;
		}
		Ok(ServerStorage { db })
	}

	// --- Users ---

	pub fn create_user(&self, user: &UserRecord) -> Result<(), ContextMateError> {
		let bytes = serde_json::to_vec(user)?;
		let write_txn = self.db.begin_write()?;
		{
			let mut users = write_txn.open_table(USERS_TABLE)?;
			users.insert(user.id.as_str(), bytes.as_slice())?;
			let mut by_hash = write_txn.open_table(USERS_BY_AUTH_HASH)?;
			by_hash.insert(user.auth_key_hash.as_str(), user.id.as_str())?;
		}
		write_txn.commit()?;
		Ok(())
	}

	pub fn get_user(&self, user_id: &str) -> Result<Option<UserRecord>, ContextMateError> {
		let read_txn = self.db.begin_read()?;
		let table = read_txn.open_table(USERS_TABLE)?;
		match table.get(user_id)? {
			Some(entry) => Ok(Some(serde_json::from_slice(entry.value())?)),
			None => Ok(None),
		}
	}

	pub fn find_user_by_auth_hash(&self, auth_key_hash: &str) -> Result<Option<UserRecord>, ContextMateError> {
		let read_txn = self.db.begin_read()?;
		let by_hash = read_txn.open_table(USERS_BY_AUTH_HASH)?;
		let user_id = match by_hash.get(auth_key_hash)? {
			Some(v) => v.value().to_string(),
			None => return Ok(None),
		};
		drop(by_hash);
		let table = read_txn.open_table(USERS_TABLE)?;
		match table.get(user_id.as_str())? {
			Some(entry) => Ok(Some(serde_json::from_slice(entry.value())?)),
			None => Ok(None),
		}
	}

	pub fn auth_hash_registered(&self, auth_key_hash: &str) -> Result<bool, ContextMateError> {
		Ok(self.find_user_by_auth_hash(auth_key_hash)?.is_some())
	}

	// --- Devices ---

	pub fn create_device(&self, device: &DeviceRecord) -> Result<(), ContextMateError> {
		let bytes = serde_json::to_vec(device)?;
		let write_txn = self.db.begin_write()?;
		{
			let mut table = write_txn.open_table(DEVICES_TABLE)?;
			table.insert(device.id.as_str(), bytes.as_slice())?;
		}
		write_txn.commit()?;
		Ok(())
	}

	pub fn get_device(&self, device_id: &str) -> Result<Option<DeviceRecord>, ContextMateError> {
		let read_txn = self.db.begin_read()?;
		let table = read_txn.open_table(DEVICES_TABLE)?;
		match table.get(device_id)? {
			Some(entry) => Ok(Some(serde_json::from_slice(entry.value())?)),
			None => Ok(None),
		}
	}

	pub fn list_devices(&self, user_id: &str) -> Result<Vec<DeviceRecord>, ContextMateError> {
		let read_txn = self.db.begin_read()?;
		let table = read_txn.open_table(DEVICES_TABLE)?;
		let mut out = Vec::new();
		for entry in table.iter()? {
			let (_, value) = entry?;
			let record: DeviceRecord = serde_json::from_slice(value.value())?;
			if record.user_id == user_id {
				out.push(record);
			}
		}
		Ok(out)
	}

	pub fn update_device(&self, device: &DeviceRecord) -> Result<(), ContextMateError> {
		self.create_device(device)
	}

	pub fn delete_device(&self, device_id: &str) -> Result<(), ContextMateError> {
		let write_txn = self.db.begin_write()?;
		{
			let mut table = write_txn.open_table(DEVICES_TABLE)?;
			table.remove(device_id)?;
		}
		write_txn.commit()?;
		Ok(())
	}

	// --- Files ---

	pub fn get_file(&self, user_id: &str, path: &str) -> Result<Option<ServerFileRecord>, ContextMateError> {
		let key = file_key(user_id, path);
		let read_txn = self.db.begin_read()?;
		let table = read_txn.open_table(FILES_TABLE)?;
		match table.get(key.as_str())? {
			Some(entry) => Ok(Some(serde_json::from_slice(entry.value())?)),
			None => Ok(None),
		}
	}

	pub fn list_files(&self, user_id: &str) -> Result<Vec<ServerFileRecord>, ContextMateError> {
		let read_txn = self.db.begin_read()?;
		let table = read_txn.open_table(FILES_TABLE)?;
		let mut out = Vec::new();
		for entry in table.iter()? {
			let (_, value) = entry?;
			let record: ServerFileRecord = serde_json::from_slice(value.value())?;
			if record.user_id == user_id {
				out.push(record);
			}
		}
		Ok(out)
	}

	pub fn list_files_since(&self, user_id: &str, since_ms: u64) -> Result<Vec<ServerFileRecord>, ContextMateError> {
		Ok(self.list_files(user_id)?.into_iter().filter(|f| f.updated_at >= since_ms).collect())
	}

	/// Upload CAS. Returns the new version on
	/// success, or `Err(ContextMateError::VersionConflict)` carrying the
	/// server's current version when `expected_version` doesn't match.
	pub fn upsert_file_cas(
		&self,
		user_id: &str,
		path: &str,
		expected_version: u64,
		encrypted_hash: &str,
		size: u64,
		now_ms: u64,
	) -> Result<ServerFileRecord, ContextMateError> {
		let key = file_key(user_id, path);
		let write_txn = self.db.begin_write()?;
		let result = {
			let mut table = write_txn.open_table(FILES_TABLE)?;
			let existing: Option<ServerFileRecord> = match table.get(key.as_str())? {
				Some(entry) => Some(serde_json::from_slice(entry.value())?),
				None => None,
			};
			match existing {
				None => {
					let record = ServerFileRecord {
						id: uuid::Uuid::new_v4().to_string(),
						user_id: user_id.to_string(),
						path: path.to_string(),
						version: 1,
						encrypted_hash: encrypted_hash.to_string(),
						size,
						created_at: now_ms,
						updated_at: now_ms,
					};
					let bytes = serde_json::to_vec(&record)?;
					table.insert(key.as_str(), bytes.as_slice())?;
					Ok(record)
				}
				Some(record) if record.version == expected_version => {
					let updated = ServerFileRecord {
						version: record.version + 1,
						encrypted_hash: encrypted_hash.to_string(),
						size,
						updated_at: now_ms,
						..record
					};
					let bytes = serde_json::to_vec(&updated)?;
					table.insert(key.as_str(), bytes.as_slice())?;
					Ok(updated)
				}
				Some(record) => Err(ContextMateError::VersionConflict {
					path: path.to_string(),
					current_version: record.version,
					expected_version,
				}),
			}
		};
		match &result {
			Ok(_) => {
				write_txn.commit()?;
			}
			Err(_) => {
				// Nothing was mutated on the conflict path, but the
				// transaction still needs to be closed out.
				write_txn.commit()?;
			}
		}
		result
	}

	pub fn delete_file(&self, user_id: &str, path: &str) -> Result<bool, ContextMateError> {
		let key = file_key(user_id, path);
		let write_txn = self.db.begin_write()?;
		let existed = {
			let mut table = write_txn.open_table(FILES_TABLE)?;
			table.remove(key.as_str())?.is_some()
		};
		write_txn.commit()?;
		Ok(existed)
	}

	// --- API keys ---

	pub fn create_api_key(&self, key: &ApiKeyRecord) -> Result<(), ContextMateError> {
		let bytes = serde_json::to_vec(key)?;
		let write_txn = self.db.begin_write()?;
		{
			let mut table = write_txn.open_table(API_KEYS_TABLE)?;
			table.insert(key.id.as_str(), bytes.as_slice())?;
			let mut by_hash = write_txn.open_table(API_KEYS_BY_HASH)?;
			by_hash.insert(key.key_hash.as_str(), key.id.as_str())?;
		}
		write_txn.commit()?;
		Ok(())
	}

	pub fn find_api_key_by_hash(&self, key_hash: &str) -> Result<Option<ApiKeyRecord>, ContextMateError> {
		let read_txn = self.db.begin_read()?;
		let by_hash = read_txn.open_table(API_KEYS_BY_HASH)?;
		let id = match by_hash.get(key_hash)? {
			Some(v) => v.value().to_string(),
			None => return Ok(None),
		};
		drop(by_hash);
		let table = read_txn.open_table(API_KEYS_TABLE)?;
		match table.get(id.as_str())? {
			Some(entry) => Ok(Some(serde_json::from_slice(entry.value())?)),
			None => Ok(None),
		}
	}

	pub fn list_api_keys(&self, user_id: &str) -> Result<Vec<ApiKeyRecord>, ContextMateError> {
		let read_txn = self.db.begin_read()?;
		let table = read_txn.open_table(API_KEYS_TABLE)?;
		let mut out = Vec::new();
		for entry in table.iter()? {
			let (_, value) = entry?;
			let record: ApiKeyRecord = serde_json::from_slice(value.value())?;
			if record.user_id == user_id {
				out.push(record);
			}
		}
		Ok(out)
	}

	pub fn revoke_api_key(&self, key_id: &str, now_ms: u64) -> Result<bool, ContextMateError> {
		let write_txn = self.db.begin_write()?;
		let found = {
			let mut table = write_txn.open_table(API_KEYS_TABLE)?;
			match table.get(key_id)? {
				Some(entry) => {
					let mut record: ApiKeyRecord = serde_json::from_slice(entry.value())?;
					drop(entry);
					record.revoked_at = Some(now_ms);
					let bytes = serde_json::to_vec(&record)?;
					table.insert(key_id, bytes.as_slice())?;
					true
				}
				None => false,
			}
		};
		write_txn.commit()?;
		Ok(found)
	}

	// --- Audit log ---

	pub fn append_audit(&self, user_id: &str, mut entry: ActionLogEntry) -> Result<(), ContextMateError> {
		let write_txn = self.db.begin_write()?;
		{
			let mut table = write_txn.open_table(AUDIT_TABLE)?;
			let next_id =
				table.iter()?.next_back().map(|r| r.map(|(k, _)| k.value() + 1)).transpose()?.unwrap_or(0);
			entry.id = next_id;
			let stamped = ServerAuditRow { user_id: user_id.to_string(), entry };
			let bytes = serde_json::to_vec(&stamped)?;
			table.insert(next_id, bytes.as_slice())?;
		}
		write_txn.commit()?;
		Ok(())
	}

	pub fn query_audit(&self, user_id: &str, query: &ActionQuery) -> Result<Vec<ActionLogEntry>, ContextMateError> {
		let read_txn = self.db.begin_read()?;
		let table = read_txn.open_table(AUDIT_TABLE)?;
		let mut all: Vec<ActionLogEntry> = Vec::new();
		for entry in table.iter()? {
			let (_, value) = entry?;
			let row: ServerAuditRow = serde_json::from_slice(value.value())?;
			if row.user_id == user_id {
				all.push(row.entry);
			}
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

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ServerAuditRow {
	user_id: String,
	entry: ActionLogEntry,
}

#[cfg(test)]
mod tests {
	use super::*;
	use tempfile::tempdir;

	fn fresh_storage() -> (ServerStorage, tempfile::TempDir) {
		let dir = tempdir().unwrap();
		let storage = ServerStorage::open(&dir.path().join("server.redb")).unwrap();
		(storage, dir)
	}

	#[test]
	fn upload_cas_creates_then_bumps_version() {
		let (storage, _dir) = fresh_storage();
		let record = storage.upsert_file_cas("u1", "a.md", 0, &"a".repeat(64), 3, 1000).unwrap();
		assert_eq!(record.version, 1);
		let record = storage.upsert_file_cas("u1", "a.md", 1, &"b".repeat(64), 4, 2000).unwrap();
		assert_eq!(record.version, 2);
	}

	#[test]
	fn upload_cas_conflict_does_not_mutate() {
		let (storage, _dir) = fresh_storage();
		storage.upsert_file_cas("u1", "a.md", 0, &"a".repeat(64), 3, 1000).unwrap();
		let err = storage.upsert_file_cas("u1", "a.md", 5, &"c".repeat(64), 3, 3000).unwrap_err();
		match err {
			ContextMateError::VersionConflict { current_version, expected_version, .. } => {
				assert_eq!(current_version, 1);
				assert_eq!(expected_version, 5);
			}
			other => panic!("expected VersionConflict, got {:?}", other),
		}
		let record = storage.get_file("u1", "a.md").unwrap().unwrap();
		assert_eq!(record.version, 1);
	}

	#[test]
	fn concurrent_uploads_one_wins_one_conflicts() {
		let (storage, _dir) = fresh_storage();
		storage.upsert_file_cas("u1", "a.md", 0, &"a".repeat(64), 3, 1000).unwrap();
		let first = storage.upsert_file_cas("u1", "a.md", 1, &"b".repeat(64), 4, 2000);
		let second = storage.upsert_file_cas("u1", "a.md", 1, &"c".repeat(64), 5, 2001);
		assert!(first.is_ok());
		assert!(second.is_err());
	}

	#[test]
	fn users_are_keyed_by_id_and_auth_hash() {
		let (storage, _dir) = fresh_storage();
		let user = UserRecord {
			id: "u1".to_string(),
			auth_key_hash: "hash1".to_string(),
			salt: "salt".to_string(),
			encrypted_master_key: "emk".to_string(),
			created_at: 1,
		};
		storage.create_user(&user).unwrap();
		assert!(storage.get_user("u1").unwrap().is_some());
		assert_eq!(storage.find_user_by_auth_hash("hash1").unwrap().unwrap().id, "u1");
		assert!(storage.auth_hash_registered("hash1").unwrap());
		assert!(!storage.auth_hash_registered("missing").unwrap());
	}
}

// vim: ts=4
