//! Extra paths: user-defined globs mirroring external files
//! into the vault under a distinguished `custom/` prefix, independent of
//! the three adapter variants (no symlink farm involved — just mirroring).

use std::path::{Path, PathBuf};

use crate::engine::SyncEngine;
use crate::error::ContextMateError;

/// One configured extra-paths mapping: a base directory plus glob patterns
/// resolved relative to it (mirrors `AgentAAdapter`'s `extra_globs`
/// resolution, generalized to an arbitrary base rather than the agent's
/// external root).
#[derive(Debug, Clone)]
pub struct ExtraPathsManager {
	name: String,
	base_dir: PathBuf,
	globs: Vec<String>,
	vault_prefix: String,
}

impl ExtraPathsManager {
	pub fn new(name: impl Into<String>, base_dir: PathBuf, globs: Vec<String>) -> Self {
		let name = name.into();
		let vault_prefix = format!("custom/extra/{}/", name);
		ExtraPathsManager { name, base_dir, globs, vault_prefix }
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	/// Minimal set of ancestor directories to observe.
	/// Non-existent ancestors are tolerated — callers decide whether to
	/// watch them anyway.
	pub fn watch_paths(&self) -> Vec<PathBuf> {
		vec![self.base_dir.clone()]
	}

	fn discover_matches(&self) -> Vec<PathBuf> {
		let mut out = Vec::new();
		for pattern in &self.globs {
			let full_pattern = self.base_dir.join(pattern);
			let full_pattern = full_pattern.to_string_lossy().to_string();
			let Ok(matches) = glob::glob(&full_pattern) else { continue };
			for path in matches.flatten() {
				if path.is_file() && !is_excluded(&self.base_dir, &path) {
					out.push(path);
				}
			}
		}
		out
	}

	/// `null` if `abs_path` doesn't match any configured glob, otherwise
	/// the vault-relative path under `custom/extra/<name>/`.
	pub fn source_to_vault(&self, abs_path: &Path) -> Option<String> {
		if is_excluded(&self.base_dir, abs_path) {
			return None;
		}
		let rel = abs_path.strip_prefix(&self.base_dir).ok()?;
		let rel_str = rel.to_string_lossy().replace('\\', "/");
		if !self.discover_matches().iter().any(|m| m == abs_path) {
			return None;
		}
		Some(format!("{}{}", self.vault_prefix, rel_str))
	}

	/// Whether `vault_rel` belongs to this manager's namespace.
	pub fn owns_vault_path(&self, vault_rel: &str) -> bool {
		vault_rel.starts_with(&self.vault_prefix)
	}

	/// Mirror `bytes` back to the external source for `vault_rel`. Skips
	/// the write if the external file already holds identical bytes, to
	/// avoid a watcher-induced echo.
	pub fn write_back(&self, vault_rel: &str, bytes: &[u8]) -> Result<(), ContextMateError> {
		let rel = vault_rel.strip_prefix(&self.vault_prefix).ok_or_else(|| ContextMateError::Internal {
			message: format!("{} is not owned by extra-paths manager {}", vault_rel, self.name),
		})?;
		let external_path = self.base_dir.join(rel);
		if let Ok(existing) = std::fs::read(&external_path) {
			if existing == bytes {
				return Ok(());
			}
		}
		if let Some(parent) = external_path.parent() {
			std::fs::create_dir_all(parent)?;
		}
		std::fs::write(external_path, bytes)?;
		Ok(())
	}

	/// One-shot discovery and copy into the vault. New
	/// files discovered here enter the next full-sweep upload pass as
	/// regular untracked vault files.
	pub fn import_to_vault(&self, engine: &SyncEngine) -> Result<(), ContextMateError> {
		for abs_path in self.discover_matches() {
			let Some(vault_rel) = self.source_to_vault(&abs_path) else { continue };
			let bytes = std::fs::read(&abs_path)?;
			let existing = engine.vault_root().join(&vault_rel);
			if let Ok(current) = std::fs::read(&existing) {
				if current == bytes {
					continue;
				}
			}
			engine.write_plaintext(&vault_rel, &bytes)?;
		}
		Ok(())
	}
}

/// Dotfiles and vendor directories are excluded from discovery.
fn is_excluded(base: &Path, path: &Path) -> bool {
	let Ok(rel) = path.strip_prefix(base) else { return true };
	rel.components().any(|c| {
		let s = c.as_os_str().to_string_lossy();
		s.starts_with('.') || s == "node_modules"
	})
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::fs;
	use tempfile::tempdir;

	#[test]
	fn source_to_vault_maps_matched_files_under_prefix() {
		let dir = tempdir().unwrap();
		fs::create_dir_all(dir.path().join("projects/app")).unwrap();
		fs::write(dir.path().join("projects/app/NOTES.md"), b"n").unwrap();

		let manager = ExtraPathsManager::new(
			"docs",
			dir.path().to_path_buf(),
			vec!["projects/*/NOTES.md".to_string()],
		);
		let matched = dir.path().join("projects/app/NOTES.md");
		assert_eq!(
			manager.source_to_vault(&matched),
			Some("custom/extra/docs/projects/app/NOTES.md".to_string())
		);
	}

	#[test]
	fn unmatched_path_returns_none() {
		let dir = tempdir().unwrap();
		let manager =
			ExtraPathsManager::new("docs", dir.path().to_path_buf(), vec!["*.md".to_string()]);
		assert!(manager.source_to_vault(&dir.path().join("other.txt")).is_none());
	}

	#[test]
	fn excludes_dotfiles_and_node_modules() {
		let dir = tempdir().unwrap();
		assert!(is_excluded(dir.path(), &dir.path().join(".git/config")));
		assert!(is_excluded(dir.path(), &dir.path().join("node_modules/pkg/index.js")));
		assert!(!is_excluded(dir.path(), &dir.path().join("notes/a.md")));
	}

	#[test]
	fn owns_vault_path_matches_prefix() {
		let manager = ExtraPathsManager::new("docs", PathBuf::from("/tmp"), vec![]);
		assert!(manager.owns_vault_path("custom/extra/docs/a.md"));
		assert!(!manager.owns_vault_path("custom/extra/other/a.md"));
	}
}

// vim: ts=4
