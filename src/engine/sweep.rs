//! Full sweep: one pass over the union of local and remote file
//! sets, pushing and pulling to convergence.

use std::collections::HashMap;
use std::path::Path;

use super::{now_ms, SyncEngine};
use crate::client::RemoteFile;
use crate::error::ContextMateError;
use crate::logging::*;
use crate::state::{AuditAction, SyncState, TrackedFile};

impl SyncEngine {
	/// Run one full sweep: list the remote set, diff against local state,
	/// and converge.
	pub async fn full_sweep(&self) -> Result<(), ContextMateError> {
		// Step 5: re-import extra paths before discovering untracked local files.
		for manager in &self.extra_paths {
			if let Err(e) = manager.import_to_vault(self) {
				warn!(error = %e, "extra-paths import failed during full sweep");
			}
		}

		// Step 1.
		let remote = self.transport.list().await.map_err(ContextMateError::from)?;
		let remote_by_path: HashMap<&str, &RemoteFile> =
			remote.iter().map(|f| (f.path.as_str(), f)).collect();
		let local = self.store.all()?;
		let local_by_path: HashMap<&str, &TrackedFile> =
			local.iter().map(|f| (f.path.as_str(), f)).collect();

		// Step 2: local files on disk, untracked, and absent remotely.
		let disk_files = walk_vault_files(&self.vault_root, &self.ignore);
		for rel in &disk_files {
			if local_by_path.contains_key(rel.as_str()) || remote_by_path.contains_key(rel.as_str()) {
				continue;
			}
			let _guard = self.locks.acquire(rel).await;
			if let Err(e) = self.push_new_local_file(rel).await {
				warn!(path = %rel, error = %e, "sweep: failed to upload untracked local file");
			}
		}

		// Step 3: tracked files pending upload.
		for record in self.store.modified_or_pending()? {
			let _guard = self.locks.acquire(&record.path).await;
			if let Err(e) = self.push_tracked_file(&record).await {
				warn!(path = %record.path, error = %e, "sweep: failed to upload tracked file");
			}
		}

		// Step 4: remote files with a newer version (or untracked locally).
		for remote_file in &remote {
			let local_record = local_by_path.get(remote_file.path.as_str());
			let should_pull = match local_record {
				Some(record) => remote_file.version > record.version,
				None => true,
			};
			if !should_pull {
				continue;
			}
			let _guard = self.locks.acquire(&remote_file.path).await;
			if let Err(e) = self.pull_path(&remote_file.path, local_record.copied_state()).await {
				warn!(path = %remote_file.path, error = %e, "sweep: failed to pull remote file");
			}
		}

		Ok(())
	}

	async fn push_new_local_file(&self, path: &str) -> Result<(), ContextMateError> {
		let plaintext = self.read_plaintext(path)?;
		self.upload_path(path, 0, &plaintext).await
	}

	async fn push_tracked_file(&self, record: &TrackedFile) -> Result<(), ContextMateError> {
		let plaintext = self.read_plaintext(&record.path)?;
		self.upload_path(&record.path, record.version, &plaintext).await
	}

	/// Shared upload path used by both the full sweep and the local-change
	/// handler.
	pub(crate) async fn upload_path(
		&self,
		path: &str,
		expected_version: u64,
		plaintext: &[u8],
	) -> Result<(), ContextMateError> {
		let content_hash = self.content_hash_of(plaintext);
		let envelope_bytes = self.encrypt_for_path(path, plaintext)?;
		let encrypted_hash = self.content_hash_of(&envelope_bytes);

		match self.transport.upload(path, &envelope_bytes, &encrypted_hash, expected_version).await {
			Ok(new_version) => {
				self.store.mark_synced(
					path,
					new_version,
					&encrypted_hash,
					&content_hash,
					plaintext.len() as u64,
					now_ms(),
				)?;
				self.log_action(AuditAction::Upload, path, Some(new_version), Some(plaintext.len() as u64), None)?;
				Ok(())
			}
			Err(crate::error::ApiError::Conflict { current_version, .. }) => {
				self.resolve_upload_conflict(path, current_version).await
			}
			Err(e) => Err(e.into()),
		}
	}

	/// Resolve a 409 on upload: preserve the
	/// local plaintext in its conflict sibling, download the authoritative
	/// remote copy, decrypt it to the canonical path, and record `conflict`
	/// state at the remote's version/hash.
	pub(crate) async fn resolve_upload_conflict(
		&self,
		path: &str,
		_current_version: u64,
	) -> Result<(), ContextMateError> {
		self.materialize_conflict_sibling(path)?;
		let (envelope_bytes, remote_version, remote_encrypted_hash) =
			self.transport.download(path).await.map_err(ContextMateError::from)?;
		let plaintext = self.decrypt_for_path(path, &envelope_bytes)?;
		self.write_plaintext(path, &plaintext)?;
		self.store.mark_conflict(path, remote_version, &remote_encrypted_hash, now_ms())?;
		self.log_action(AuditAction::Conflict, path, Some(remote_version), None, None)?;
		Ok(())
	}

	/// Download, decrypt, and write `path` to disk. If the local record was
	/// `modified`, the on-disk content is preserved in a conflict sibling
	/// first. Returns the
	/// plaintext bytes written so callers (e.g. the extra-paths mirror in
	/// reconcile.rs) can reuse them without re-reading from disk.
	pub(crate) async fn pull_path(
		&self,
		path: &str,
		local_state: Option<SyncState>,
	) -> Result<Vec<u8>, ContextMateError> {
		if local_state == Some(SyncState::Modified) {
			self.materialize_conflict_sibling(path)?;
		}
		let (envelope_bytes, version, encrypted_hash) =
			self.transport.download(path).await.map_err(ContextMateError::from)?;
		let plaintext = self.decrypt_for_path(path, &envelope_bytes)?;
		self.write_plaintext(path, &plaintext)?;
		let content_hash = self.content_hash_of(&plaintext);
		self.store.mark_synced(
			path,
			version,
			&encrypted_hash,
			&content_hash,
			plaintext.len() as u64,
			now_ms(),
		)?;
		if local_state == Some(SyncState::Modified) {
			self.log_action(AuditAction::Conflict, path, Some(version), None, None)?;
		} else {
			self.log_action(AuditAction::Download, path, Some(version), Some(plaintext.len() as u64), None)?;
		}
		Ok(plaintext)
	}
}

/// Small convenience so `Option<&TrackedFile>` can be matched against
/// `SyncState` without an extra `.map(|r| r.sync_state)` at each call site.
trait CopiedState {
	fn copied_state(&self) -> Option<SyncState>;
}

impl CopiedState for Option<&TrackedFile> {
	fn copied_state(&self) -> Option<SyncState> {
		self.map(|r| r.sync_state)
	}
}

/// Recursively enumerate vault-relative paths of regular files under
/// `root`, skipping anything the ignore predicate excludes.
fn walk_vault_files(root: &Path, ignore: &crate::watcher::IgnorePredicate) -> Vec<String> {
	let mut out = Vec::new();
	walk_dir(root, root, ignore, &mut out);
	out
}

fn walk_dir(root: &Path, dir: &Path, ignore: &crate::watcher::IgnorePredicate, out: &mut Vec<String>) {
	let entries = match std::fs::read_dir(dir) {
		Ok(entries) => entries,
		Err(_) => return,
	};
	for entry in entries.flatten() {
		let path = entry.path();
		let rel = match path.strip_prefix(root) {
			Ok(rel) => rel.to_string_lossy().replace('\\', "/"),
			Err(_) => continue,
		};
		let is_dir = path.is_dir();
		if ignore.is_ignored(&rel, is_dir) {
			continue;
		}
		if is_dir {
			walk_dir(root, &path, ignore, out);
		} else if path.is_file() {
			out.push(rel);
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::watcher::IgnorePredicate;
	use tempfile::tempdir;

	#[test]
	fn walk_vault_files_skips_ignored_entries() {
		let dir = tempdir().unwrap();
		std::fs::create_dir_all(dir.path().join("skills/a")).unwrap();
		std::fs::write(dir.path().join("skills/a/SKILL.md"), b"# A").unwrap();
		std::fs::write(dir.path().join(".hidden"), b"x").unwrap();
		std::fs::create_dir_all(dir.path().join("node_modules")).unwrap();
		std::fs::write(dir.path().join("node_modules/pkg.json"), b"{}").unwrap();

		let ignore = IgnorePredicate::new(dir.path(), &[]).unwrap();
		let mut files = walk_vault_files(dir.path(), &ignore);
		files.sort();
		assert_eq!(files, vec!["skills/a/SKILL.md".to_string()]);
	}
}

// vim: ts=4
