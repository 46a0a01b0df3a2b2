//! Mirror adapter: an arbitrary user-chosen external
//! directory, mirrored verbatim into the vault under a `custom/mirror/`
//! prefix. Rejects configurations where the external root and the vault
//! root overlap.

use std::fs;
use std::path::{Path, PathBuf};

use super::{Adapter, MappedEntry};
use crate::error::AdapterError;

const VAULT_PREFIX: &str = "custom/mirror/";

pub struct MirrorAdapter {
	external_root: PathBuf,
	backup_root: PathBuf,
}

impl MirrorAdapter {
	/// Construct a Mirror adapter, rejecting configurations where
	/// `external_root` is inside `vault_root` or vice versa.
	pub fn new(
		external_root: PathBuf,
		vault_root: &Path,
		backup_root: PathBuf,
	) -> Result<Self, AdapterError> {
		let norm_external = best_effort_canonicalize(&external_root);
		let norm_vault = best_effort_canonicalize(vault_root);
		if norm_external.starts_with(&norm_vault) || norm_vault.starts_with(&norm_external) {
			return Err(AdapterError::OverlappingRoots {
				external: external_root.display().to_string(),
				vault: vault_root.display().to_string(),
			});
		}
		Ok(MirrorAdapter { external_root, backup_root })
	}
}

fn best_effort_canonicalize(path: &Path) -> PathBuf {
	fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

impl Adapter for MirrorAdapter {
	fn name(&self) -> &'static str {
		"mirror"
	}

	fn backup_root(&self) -> PathBuf {
		self.backup_root.clone()
	}

	fn discover(&self) -> Result<Vec<MappedEntry>, AdapterError> {
		let mut entries = Vec::new();
		if self.external_root.exists() {
			walk(&self.external_root, &self.external_root, &mut entries);
		}
		Ok(entries)
	}
}

fn walk(root: &Path, dir: &Path, out: &mut Vec<MappedEntry>) {
	let entries = match fs::read_dir(dir) {
		Ok(entries) => entries,
		Err(_) => return,
	};
	for entry in entries.flatten() {
		let path = entry.path();
		let file_name = entry.file_name();
		let name = file_name.to_string_lossy();
		if name.starts_with('.') || name == "node_modules" {
			continue;
		}
		if path.is_dir() {
			walk(root, &path, out);
		} else if path.is_file() {
			if let Ok(rel) = path.strip_prefix(root) {
				let rel_str = rel.to_string_lossy().replace('\\', "/");
				out.push(MappedEntry {
					external: path.clone(),
					vault_rel: format!("{}{}", VAULT_PREFIX, rel_str),
					is_dir: false,
				});
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use tempfile::tempdir;

	#[test]
	fn rejects_overlapping_roots() {
		let root = tempdir().unwrap();
		let vault = root.path().join("vault");
		fs::create_dir_all(&vault).unwrap();
		let external_inside_vault = vault.join("external");
		fs::create_dir_all(&external_inside_vault).unwrap();

		let result = MirrorAdapter::new(external_inside_vault, &vault, root.path().join(".backup"));
		assert!(result.is_err());
	}

	#[test]
	fn discovers_nested_files_under_custom_prefix() {
		let external = tempdir().unwrap();
		let vault = tempdir().unwrap();
		fs::create_dir_all(external.path().join("notes")).unwrap();
		fs::write(external.path().join("notes/todo.md"), b"todo").unwrap();

		let adapter =
			MirrorAdapter::new(external.path().to_path_buf(), vault.path(), external.path().join(".backup"))
				.unwrap();
		let entries = adapter.discover().unwrap();
		assert_eq!(entries.len(), 1);
		assert_eq!(entries[0].vault_rel, "custom/mirror/notes/todo.md");
	}
}

// vim: ts=4
