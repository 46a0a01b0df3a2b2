//! Local-change and remote-notification handlers, plus local
//! and remote delete. These are invoked from the engine's event loop with
//! the relevant path already locked.

use super::SyncEngine;
use crate::client::subscription::ChangeEvent;
use crate::error::ContextMateError;
use crate::logging::*;
use crate::state::AuditAction;
use crate::watcher::FileEvent;

impl SyncEngine {
	/// Dispatch a watcher event to the appropriate handler, acquiring the
	/// per-path lock for the duration.
	pub async fn handle_local_event(&self, event: FileEvent) -> Result<(), ContextMateError> {
		let path = event.path().to_string();
		let _guard = self.locks.acquire(&path).await;
		match event {
			FileEvent::Added(_) | FileEvent::Changed(_) => self.handle_local_write(&path).await,
			FileEvent::Removed(_) => self.handle_local_delete(&path).await,
		}
	}

	/// Local add/change: skip if the content
	/// hash is unchanged, otherwise upload at the tracked (or 0) version.
	async fn handle_local_write(&self, path: &str) -> Result<(), ContextMateError> {
		let plaintext = match self.read_plaintext(path) {
			Ok(bytes) => bytes,
			// The watcher can fire a Changed event for a file that was
			// removed again before we got to read it; nothing to do.
			Err(ContextMateError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
			Err(e) => return Err(e),
		};
		let content_hash = self.content_hash_of(&plaintext);
		let tracked = self.store.get(path)?;
		if let Some(record) = &tracked {
			if record.content_hash == content_hash {
				return Ok(());
			}
		}
		let expected_version = tracked.as_ref().map(|r| r.version).unwrap_or(0);
		self.upload_path(path, expected_version, &plaintext).await
	}

	/// Local delete: remove the
	/// tracked record and log the deletion. No further action.
	async fn handle_local_delete(&self, path: &str) -> Result<(), ContextMateError> {
		if self.store.get(path)?.is_none() {
			return Ok(());
		}
		self.store.remove(path)?;
		self.log_action(AuditAction::Delete, path, None, None, None)?;
		Ok(())
	}

	/// Dispatch a server-pushed notification, acquiring the per-path lock
	/// for the duration.
	pub async fn handle_remote_event(&self, event: ChangeEvent) -> Result<(), ContextMateError> {
		match event {
			ChangeEvent::FileUpdated { path, version } => {
				let _guard = self.locks.acquire(&path).await;
				self.handle_remote_update(&path, version).await
			}
			ChangeEvent::FileDeleted { path } => {
				let _guard = self.locks.acquire(&path).await;
				self.handle_remote_delete(&path).await
			}
		}
	}

	/// Handle an incoming remote-update notification for `path`.
	///
	/// A notification whose version does not *exceed* the locally tracked
	/// version (i.e. is equal or stale) is treated as an idempotent no-op
	/// and ignored.
	async fn handle_remote_update(&self, path: &str, notified_version: u64) -> Result<(), ContextMateError> {
		let tracked = self.store.get(path)?;
		if let Some(record) = &tracked {
			if record.version >= notified_version {
				return Ok(());
			}
		}
		let local_state = tracked.as_ref().map(|r| r.sync_state);
		let plaintext = self.pull_path(path, local_state).await?;
		self.mirror_to_extra_path_source(path, &plaintext);
		Ok(())
	}

	/// Remote delete: remove the tracked record and log the deletion.
	async fn handle_remote_delete(&self, path: &str) -> Result<(), ContextMateError> {
		if self.store.get(path)?.is_none() {
			return Ok(());
		}
		self.store.remove(path)?;
		self.log_action(AuditAction::Delete, path, None, None, None)?;
		Ok(())
	}

	/// If `path` falls under an extra-paths mapping, mirror the pulled
	/// plaintext back to the external source location. Failure is tolerated — logged, not propagated.
	fn mirror_to_extra_path_source(&self, path: &str, plaintext: &[u8]) {
		for manager in &self.extra_paths {
			if manager.owns_vault_path(path) {
				if let Err(e) = manager.write_back(path, plaintext) {
					warn!(path = %path, error = %e, "extra-paths write-back failed (tolerated)");
				}
				return;
			}
		}
	}
}

// vim: ts=4
