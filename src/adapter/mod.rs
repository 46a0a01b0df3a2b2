//! Adapter/symlink reconciliation: turning an external agent directory
//! into a vault-backed symlink farm, detecting editor-induced breakage,
//! and syncing the edit back.
//!
//! The three concrete variants (Agent-A, Agent-B, Mirror) share one
//! lifecycle implementation (`import`/`linkify`/`verify`/`unlinkify`/
//! `sync_back`) via default trait methods over a `discover()`-produced
//! mapping; only discovery and path-rewriting differ per variant.

pub mod agent_a;
pub mod agent_b;
pub mod extra_paths;
pub mod mirror;

use std::fs;
use std::os::unix::fs::symlink;
use std::path::{Path, PathBuf};

use crate::error::AdapterError;

pub use agent_a::AgentAAdapter;
pub use agent_b::AgentBAdapter;
pub use extra_paths::ExtraPathsManager;
pub use mirror::MirrorAdapter;

/// One file-or-directory mapping between the external agent directory `E`
/// and a vault-relative path, as produced by an adapter's discovery pass.
#[derive(Debug, Clone)]
pub struct MappedEntry {
	/// Absolute path of the entry inside `E`.
	pub external: PathBuf,
	/// Vault-relative path (already carrying the adapter's prefix).
	pub vault_rel: String,
	/// Whether this entry is a directory subtree (Agent-B's skills/
	/// memories/rules) or a single file.
	pub is_dir: bool,
}

#[derive(Debug, Default)]
pub struct ImportReport {
	pub imported: Vec<String>,
	pub skipped: Vec<String>,
}

#[derive(Debug, Default)]
pub struct LinkifyReport {
	pub linked: Vec<String>,
	pub already_linked: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryStatus {
	Valid,
	Broken,
}

#[derive(Debug, Default)]
pub struct VerifyReport {
	pub statuses: Vec<(String, EntryStatus)>,
}

impl VerifyReport {
	pub fn all_valid(&self) -> bool {
		self.statuses.iter().all(|(_, s)| *s == EntryStatus::Valid)
	}
}

#[derive(Debug, Default)]
pub struct UnlinkifyReport {
	pub restored: Vec<String>,
}

#[derive(Debug, Default)]
pub struct SyncBackReport {
	pub synced: Vec<String>,
}

/// Shared capability set for an adapter variant: `{name, detect,
/// import, link, verify, unlink, sync_back}`. `detect` is implicit in
/// `discover` returning a non-empty mapping.
pub trait Adapter: Send + Sync {
	fn name(&self) -> &'static str;

	/// Root directory used to back up originals before linkify, one per adapter so variants never collide.
	fn backup_root(&self) -> PathBuf;

	/// Enumerate the external↔vault mapping for this adapter's current
	/// configuration. Missing ancestors in `E` are tolerated — they simply
	/// contribute no entries.
	fn discover(&self) -> Result<Vec<MappedEntry>, AdapterError>;

	/// Import: copy `E`→vault for any entry whose vault copy doesn't
	/// already match byte-for-byte.
	fn import(&self, vault_root: &Path) -> Result<ImportReport, AdapterError> {
		let mut report = ImportReport::default();
		for entry in self.discover()? {
			if !entry.external.exists() {
				continue;
			}
			let vault_path = vault_root.join(&entry.vault_rel);
			let identical = vault_path.exists() && trees_equal(&entry.external, &vault_path, entry.is_dir)?;
			if identical {
				report.skipped.push(entry.vault_rel);
				continue;
			}
			copy_tree(&entry.external, &vault_path, entry.is_dir)?;
			report.imported.push(entry.vault_rel);
		}
		Ok(report)
	}

	/// Linkify: back up any non-symlink entry, then atomically replace it
	/// with a symlink into the vault.
	fn linkify(&self, vault_root: &Path) -> Result<LinkifyReport, AdapterError> {
		let mut report = LinkifyReport::default();
		for entry in self.discover()? {
			let vault_path = vault_root.join(&entry.vault_rel);
			let meta = fs::symlink_metadata(&entry.external);
			if let Ok(meta) = &meta {
				if meta.file_type().is_symlink() {
					report.already_linked.push(entry.vault_rel);
					continue;
				}
			}
			if entry.external.exists() {
				let backup_path = self.backup_root().join(backup_relative(&entry.external));
				if let Some(parent) = backup_path.parent() {
					fs::create_dir_all(parent)
						.map_err(|e| AdapterError::BackupFailed { message: e.to_string() })?;
				}
				copy_tree(&entry.external, &backup_path, entry.is_dir)
					.map_err(|_| AdapterError::BackupFailed {
						message: format!("failed to back up {}", entry.external.display()),
					})?;
				remove_tree(&entry.external, entry.is_dir)
					.map_err(|e| AdapterError::LinkFailed { message: e.to_string() })?;
			}
			atomic_symlink(&vault_path, &entry.external)?;
			report.linked.push(entry.vault_rel);
		}
		Ok(report)
	}

	/// Verify: report `Valid` for entries that are a symlink whose target
	/// resolves, `Broken` otherwise.
	fn verify(&self) -> Result<VerifyReport, AdapterError> {
		let mut report = VerifyReport::default();
		for entry in self.discover()? {
			let status = match fs::symlink_metadata(&entry.external) {
				Ok(meta) if meta.file_type().is_symlink() => match fs::metadata(&entry.external) {
					Ok(_) => EntryStatus::Valid,
					Err(_) => EntryStatus::Broken,
				},
				_ => EntryStatus::Broken,
			};
			report.statuses.push((entry.vault_rel, status));
		}
		Ok(report)
	}

	/// Unlinkify (restore): delete the symlink, then restore the backed-up
	/// original if present, else copy from the vault. Directories that were backed up are restored
	/// recursively.
	fn unlinkify(&self, vault_root: &Path) -> Result<UnlinkifyReport, AdapterError> {
		let mut report = UnlinkifyReport::default();
		for entry in self.discover()? {
			let is_symlink = fs::symlink_metadata(&entry.external)
				.map(|m| m.file_type().is_symlink())
				.unwrap_or(false);
			if !is_symlink {
				continue;
			}
			fs::remove_file(&entry.external).or_else(|_| fs::remove_dir(&entry.external)).map_err(|e| {
				AdapterError::LinkFailed { message: format!("failed to remove symlink: {}", e) }
			})?;
			let backup_path = self.backup_root().join(backup_relative(&entry.external));
			let source = if backup_path.exists() { &backup_path } else { &vault_root.join(&entry.vault_rel) };
			if source.exists() {
				copy_tree(source, &entry.external, entry.is_dir)
					.map_err(|e| AdapterError::BackupFailed { message: e.to_string() })?;
			}
			report.restored.push(entry.vault_rel);
		}
		Ok(report)
	}

	/// Sync-back (editor recovery): an entry that has become a regular
	/// file (an editor overwrote the symlink) is
	/// compared against the vault copy; if identical, the symlink is
	/// simply recreated, otherwise the new content is copied into the
	/// vault first.
	fn sync_back(&self, vault_root: &Path) -> Result<SyncBackReport, AdapterError> {
		let mut report = SyncBackReport::default();
		for entry in self.discover()? {
			if entry.is_dir {
				// Directory-granularity entries cannot be silently
				// overwritten with a single regular file by an editor;
				// nothing to reconcile at this granularity.
				continue;
			}
			let meta = match fs::symlink_metadata(&entry.external) {
				Ok(meta) => meta,
				Err(_) => continue,
			};
			if meta.file_type().is_symlink() || !meta.file_type().is_file() {
				continue;
			}
			let vault_path = vault_root.join(&entry.vault_rel);
			let new_content = fs::read(&entry.external)
				.map_err(|e| AdapterError::LinkFailed { message: e.to_string() })?;
			let vault_content = fs::read(&vault_path).unwrap_or_default();
			if new_content != vault_content {
				if let Some(parent) = vault_path.parent() {
					fs::create_dir_all(parent)
						.map_err(|e| AdapterError::LinkFailed { message: e.to_string() })?;
				}
				fs::write(&vault_path, &new_content)
					.map_err(|e| AdapterError::LinkFailed { message: e.to_string() })?;
			}
			fs::remove_file(&entry.external)
				.map_err(|e| AdapterError::LinkFailed { message: e.to_string() })?;
			atomic_symlink(&vault_path, &entry.external)?;
			report.synced.push(entry.vault_rel);
		}
		Ok(report)
	}
}

/// Registry of configured adapters, looked up by name.
#[derive(Default)]
pub struct AdapterRegistry {
	adapters: Vec<Box<dyn Adapter>>,
}

impl AdapterRegistry {
	pub fn new() -> Self {
		AdapterRegistry { adapters: Vec::new() }
	}

	pub fn register(&mut self, adapter: Box<dyn Adapter>) {
		self.adapters.push(adapter);
	}

	pub fn get(&self, name: &str) -> Option<&dyn Adapter> {
		self.adapters.iter().find(|a| a.name() == name).map(|a| a.as_ref())
	}

	pub fn iter(&self) -> impl Iterator<Item = &dyn Adapter> {
		self.adapters.iter().map(|a| a.as_ref())
	}
}

/// Replace `link_path` with a symlink pointing at `target`, atomically:
/// the symlink is created at a sibling temp path and renamed over
/// `link_path`, so a crash never leaves `link_path` half-written.
fn atomic_symlink(target: &Path, link_path: &Path) -> Result<(), AdapterError> {
	let parent = link_path.parent().unwrap_or_else(|| Path::new("."));
	fs::create_dir_all(parent).map_err(|e| AdapterError::LinkFailed { message: e.to_string() })?;
	let tmp_path = parent.join(format!(
		".{}.contextmate-tmp",
		link_path.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default()
	));
	let _ = fs::remove_file(&tmp_path);
	symlink(target, &tmp_path).map_err(|e| AdapterError::LinkFailed { message: e.to_string() })?;
	fs::rename(&tmp_path, link_path).map_err(|e| AdapterError::LinkFailed { message: e.to_string() })?;
	Ok(())
}

fn copy_tree(src: &Path, dst: &Path, is_dir: bool) -> std::io::Result<()> {
	if is_dir {
		copy_dir_recursive(src, dst)
	} else {
		if let Some(parent) = dst.parent() {
			fs::create_dir_all(parent)?;
		}
		fs::copy(src, dst)?;
		Ok(())
	}
}

fn copy_dir_recursive(src: &Path, dst: &Path) -> std::io::Result<()> {
	fs::create_dir_all(dst)?;
	for entry in fs::read_dir(src)? {
		let entry = entry?;
		let from = entry.path();
		let to = dst.join(entry.file_name());
		if entry.file_type()?.is_dir() {
			copy_dir_recursive(&from, &to)?;
		} else {
			fs::copy(&from, &to)?;
		}
	}
	Ok(())
}

fn remove_tree(path: &Path, is_dir: bool) -> std::io::Result<()> {
	if is_dir {
		fs::remove_dir_all(path)
	} else {
		fs::remove_file(path)
	}
}

/// Byte-for-byte equality check, recursive for directories.
fn trees_equal(a: &Path, b: &Path, is_dir: bool) -> Result<bool, AdapterError> {
	if !is_dir {
		let (ba, bb) = (fs::read(a), fs::read(b));
		return Ok(matches!((ba, bb), (Ok(x), Ok(y)) if x == y));
	}
	let mut names_a: Vec<_> = fs::read_dir(a)
		.map_err(|e| AdapterError::BackupFailed { message: e.to_string() })?
		.filter_map(|e| e.ok().map(|e| e.file_name()))
		.collect();
	let mut names_b: Vec<_> = match fs::read_dir(b) {
		Ok(rd) => rd.filter_map(|e| e.ok().map(|e| e.file_name())).collect(),
		Err(_) => return Ok(false),
	};
	names_a.sort();
	names_b.sort();
	if names_a != names_b {
		return Ok(false);
	}
	for name in names_a {
		let pa = a.join(&name);
		let pb = b.join(&name);
		let sub_is_dir = pa.is_dir();
		if !trees_equal(&pa, &pb, sub_is_dir)? {
			return Ok(false);
		}
	}
	Ok(true)
}

/// Mirror an absolute external path under a backup root, stripping the
/// leading root component so backups nest predictably.
fn backup_relative(external: &Path) -> PathBuf {
	let mut out = PathBuf::new();
	for component in external.components() {
		if let std::path::Component::Normal(part) = component {
			out.push(part);
		}
	}
	out
}


// vim: ts=4
