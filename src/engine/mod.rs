//! Sync engine: the reconciliation loop binding the watcher, the server
//! API client, the change subscription, and the local state store
//! together.
//!
//! The engine owns no transport concretely — it is generic over
//! `client::Transport` so it can be driven in tests against an in-memory
//! fake instead of a running server.

pub mod locks;
pub mod reconcile;
pub mod sweep;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::mpsc;

use crate::adapter::extra_paths::ExtraPathsManager;
use crate::client::Transport;
use crate::config::ClientConfig;
use crate::crypto::{decrypt_envelope, encrypt_envelope, hash_content, Envelope, KeyRing};
use crate::error::ContextMateError;
use crate::logging::*;
use crate::state::{ActionLogEntry, AuditAction, StateStore};
use crate::vault_path::resolve_under_root;
use crate::watcher::{FileEvent, FileWatcher, IgnorePredicate};

pub use locks::PathLocks;

/// Current wall-clock time in milliseconds. All `TrackedFile` timestamps
/// use this.
pub fn now_ms() -> u64 {
	SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis() as u64).unwrap_or(0)
}

/// The reconciliation engine. One instance per running client session.
pub struct SyncEngine {
	pub(crate) vault_root: PathBuf,
	pub(crate) keyring: Arc<KeyRing>,
	pub(crate) transport: Arc<dyn Transport>,
	pub(crate) store: Arc<StateStore>,
	pub(crate) locks: Arc<PathLocks>,
	pub(crate) ignore: Arc<IgnorePredicate>,
	pub(crate) extra_paths: Vec<ExtraPathsManager>,
	pub(crate) config: ClientConfig,
}

impl SyncEngine {
	/// Construct an engine. Opens (or creates) the local state store at
	/// `config.data_dir/state.redb` and builds the watcher's ignore
	/// predicate from `config.vault_dir`.
	pub fn new(
		config: ClientConfig,
		keyring: KeyRing,
		transport: Arc<dyn Transport>,
		extra_paths: Vec<ExtraPathsManager>,
	) -> Result<Self, ContextMateError> {
		std::fs::create_dir_all(&config.data_dir)?;
		std::fs::create_dir_all(&config.vault_dir)?;
		let store = Arc::new(StateStore::open(&config.data_dir.join("state.redb"))?);
		let ignore = Arc::new(IgnorePredicate::new(&config.vault_dir, &[])?);
		Ok(SyncEngine {
			vault_root: config.vault_dir.clone(),
			keyring: Arc::new(keyring),
			transport,
			store,
			locks: Arc::new(PathLocks::new()),
			ignore,
			extra_paths,
			config,
		})
	}

	pub fn store(&self) -> &StateStore {
		&self.store
	}

	pub fn vault_root(&self) -> &std::path::Path {
		&self.vault_root
	}

	/// Start the watcher, the engine's event-driven reconciliation loop,
	/// and the periodic full-sweep timer. The change subscription's event
	/// stream is supplied by the caller (it is opened separately because
	/// it also carries the `register-device` handshake).
	pub async fn start(
		self: Arc<Self>,
		change_rx: mpsc::UnboundedReceiver<crate::client::subscription::ChangeEvent>,
	) -> Result<EngineHandle, ContextMateError> {
		let (mut watcher, watcher_rx) = FileWatcher::start(
			self.vault_root.clone(),
			std::time::Duration::from_millis(self.config.debounce_ms),
			IgnorePredicate::new(&self.vault_root, &[])?,
		)?;
		watcher.ready().await;

		self.full_sweep().await?;

		let (stop_tx, stop_rx) = mpsc::channel::<()>(1);
		let engine = self.clone();
		let join = tokio::spawn(async move {
			engine.run_loop(watcher_rx, change_rx, stop_rx).await;
		});

		Ok(EngineHandle { watcher, stop_tx: Some(stop_tx), join: Some(join) })
	}

	/// Event-driven reconciliation loop: drains watcher and subscription
	/// events as they arrive and runs a full sweep every
	/// `config.poll_interval_ms`. Exits when `stop_rx` fires.
	async fn run_loop(
		self: Arc<Self>,
		mut watcher_rx: mpsc::UnboundedReceiver<FileEvent>,
		mut change_rx: mpsc::UnboundedReceiver<crate::client::subscription::ChangeEvent>,
		mut stop_rx: mpsc::Receiver<()>,
	) {
		let mut poll = tokio::time::interval(std::time::Duration::from_millis(self.config.poll_interval_ms));
		poll.tick().await; // first tick fires immediately; already swept in start()

		loop {
			tokio::select! {
				_ = stop_rx.recv() => {
					info!("sync engine stop requested");
					return;
				}
				event = watcher_rx.recv() => {
					match event {
						Some(event) => {
							if let Err(e) = self.handle_local_event(event).await {
								error!(error = %e, "local event handling failed");
								let _ = self.store.append_action(ActionLogEntry {
									id: 0,
									action: AuditAction::Error,
									path: String::new(),
									version: None,
									size: None,
									timestamp: now_ms(),
									details: Some(e.to_string()),
								});
							}
						}
						None => return,
					}
				}
				event = change_rx.recv() => {
					match event {
						Some(event) => {
							if let Err(e) = self.handle_remote_event(event).await {
								error!(error = %e, "remote event handling failed");
							}
						}
						None => return,
					}
				}
				_ = poll.tick() => {
					if let Err(e) = self.full_sweep().await {
						error!(error = %e, "periodic full sweep failed");
					}
				}
			}
		}
	}

	/// Resolve a vault-relative path to an absolute on-disk path, rejecting
	/// anything that would escape the vault root.
	pub(crate) fn resolve(&self, path: &str) -> Result<PathBuf, ContextMateError> {
		resolve_under_root(&self.vault_root, path)
	}

	pub(crate) fn read_plaintext(&self, path: &str) -> Result<Vec<u8>, ContextMateError> {
		let abs = self.resolve(path)?;
		Ok(std::fs::read(abs)?)
	}

	/// Write `bytes` to `path`, creating parent directories as needed.
	pub(crate) fn write_plaintext(&self, path: &str, bytes: &[u8]) -> Result<(), ContextMateError> {
		let abs = self.resolve(path)?;
		if let Some(parent) = abs.parent() {
			std::fs::create_dir_all(parent)?;
		}
		std::fs::write(abs, bytes)?;
		Ok(())
	}

	pub(crate) fn encrypt_for_path(&self, path: &str, plaintext: &[u8]) -> Result<Vec<u8>, ContextMateError> {
		let key = self.keyring.path_key(path)?;
		let envelope = encrypt_envelope(plaintext, key.as_bytes())?;
		Ok(envelope.to_bytes())
	}

	pub(crate) fn decrypt_for_path(&self, path: &str, envelope_bytes: &[u8]) -> Result<Vec<u8>, ContextMateError> {
		let key = self.keyring.path_key(path)?;
		let envelope = Envelope::from_bytes(envelope_bytes)?;
		Ok(decrypt_envelope(&envelope, key.as_bytes())?)
	}

	/// Move the current on-disk plaintext at `path` aside to its conflict
	/// sibling. No-op if the
	/// path doesn't currently exist on disk.
	pub(crate) fn materialize_conflict_sibling(&self, path: &str) -> Result<(), ContextMateError> {
		let abs = self.resolve(path)?;
		if !abs.exists() {
			return Ok(());
		}
		let sibling_rel = crate::state::store::conflict_sibling_path(path);
		let sibling_rel_str = sibling_rel.to_string_lossy().replace('\\', "/");
		let sibling_abs = self.resolve(&sibling_rel_str)?;
		if let Some(parent) = sibling_abs.parent() {
			std::fs::create_dir_all(parent)?;
		}
		std::fs::copy(&abs, &sibling_abs)?;
		Ok(())
	}

	pub(crate) fn log_action(
		&self,
		action: AuditAction,
		path: &str,
		version: Option<u64>,
		size: Option<u64>,
		details: Option<String>,
	) -> Result<(), ContextMateError> {
		self.store.append_action(ActionLogEntry {
			id: 0,
			action,
			path: path.to_string(),
			version,
			size,
			timestamp: now_ms(),
			details,
		})
	}

	pub(crate) fn content_hash_of(&self, bytes: &[u8]) -> String {
		hash_content(bytes)
	}
}

/// Handle to a running engine. `stop()` cancels the poll timer, stops and
/// awaits the watcher, and joins the reconciliation loop task in that
/// order (subscription closing is the caller's responsibility since it
/// owns the subscription).
pub struct EngineHandle {
	watcher: FileWatcher,
	stop_tx: Option<mpsc::Sender<()>>,
	join: Option<tokio::task::JoinHandle<()>>,
}

impl EngineHandle {
	pub async fn stop(mut self) {
		if let Some(tx) = self.stop_tx.take() {
			let _ = tx.send(()).await;
		}
		self.watcher.stop().await;
		if let Some(join) = self.join.take() {
			let _ = join.await;
		}
	}
}

// vim: ts=4
