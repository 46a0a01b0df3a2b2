//! Agent-A adapter: fixed list of well-known files in the
//! external agent directory, plus configurable extra files and glob
//! patterns. Modeled as the simplest of the three variants — pure
//! file-level mapping, no subtree path-rewriting.

use std::path::{Path, PathBuf};

use super::{Adapter, MappedEntry};
use crate::error::AdapterError;

/// Files Agent-A is known to read/write at the root of its directory,
/// regardless of user configuration.
pub const WELL_KNOWN_FILES: &[&str] = &["CLAUDE.md", "AGENTS.md", ".claude/settings.json"];

pub struct AgentAAdapter {
	external_root: PathBuf,
	backup_root: PathBuf,
	vault_prefix: String,
	extra_files: Vec<String>,
	extra_globs: Vec<String>,
}

impl AgentAAdapter {
	pub fn new(
		external_root: PathBuf,
		backup_root: PathBuf,
		extra_files: Vec<String>,
		extra_globs: Vec<String>,
	) -> Self {
		AgentAAdapter {
			external_root,
			backup_root,
			vault_prefix: "agent_a/".to_string(),
			extra_files,
			extra_globs,
		}
	}

	fn vault_rel_for(&self, rel: &str) -> String {
		format!("{}{}", self.vault_prefix, rel)
	}
}

impl Adapter for AgentAAdapter {
	fn name(&self) -> &'static str {
		"agent_a"
	}

	fn backup_root(&self) -> PathBuf {
		self.backup_root.clone()
	}

	fn discover(&self) -> Result<Vec<MappedEntry>, AdapterError> {
		let mut seen = std::collections::HashSet::new();
		let mut rels: Vec<String> = Vec::new();
		for rel in WELL_KNOWN_FILES.iter().map(|s| s.to_string()).chain(self.extra_files.iter().cloned()) {
			if seen.insert(rel.clone()) {
				rels.push(rel);
			}
		}
		for pattern in &self.extra_globs {
			let full_pattern = self.external_root.join(pattern);
			let full_pattern = full_pattern.to_string_lossy().to_string();
			let matches = glob::glob(&full_pattern)
				.map_err(|e| AdapterError::BackupFailed { message: e.to_string() })?;
			for entry in matches.flatten() {
				if let Ok(rel) = entry.strip_prefix(&self.external_root) {
					let rel_str = rel.to_string_lossy().replace('\\', "/");
					if is_excluded(&rel_str) {
						continue;
					}
					if seen.insert(rel_str.clone()) {
						rels.push(rel_str);
					}
				}
			}
		}

		Ok(rels
			.into_iter()
			.map(|rel| MappedEntry {
				external: self.external_root.join(&rel),
				vault_rel: self.vault_rel_for(&rel),
				is_dir: false,
			})
			.collect())
	}
}

/// Dotfiles and vendor directories are excluded from glob discovery.
fn is_excluded(rel: &str) -> bool {
	rel.split('/').any(|segment| segment.starts_with('.') || segment == "node_modules")
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::fs;
	use tempfile::tempdir;

	#[test]
	fn discovers_well_known_and_extra_files() {
		let dir = tempdir().unwrap();
		fs::write(dir.path().join("CLAUDE.md"), b"hi").unwrap();
		fs::create_dir_all(dir.path().join("notes")).unwrap();
		fs::write(dir.path().join("notes/a.md"), b"a").unwrap();

		let adapter = AgentAAdapter::new(
			dir.path().to_path_buf(),
			dir.path().join(".backup"),
			vec!["notes/a.md".to_string()],
			vec![],
		);
		let entries = adapter.discover().unwrap();
		let rels: Vec<_> = entries.iter().map(|e| e.vault_rel.clone()).collect();
		assert!(rels.contains(&"agent_a/CLAUDE.md".to_string()));
		assert!(rels.contains(&"agent_a/notes/a.md".to_string()));
	}

	#[test]
	fn glob_patterns_exclude_dotfiles_and_vendor_dirs() {
		let dir = tempdir().unwrap();
		fs::create_dir_all(dir.path().join("skills")).unwrap();
		fs::write(dir.path().join("skills/one.md"), b"1").unwrap();
		fs::create_dir_all(dir.path().join("node_modules")).unwrap();
		fs::write(dir.path().join("node_modules/x.md"), b"x").unwrap();

		let adapter = AgentAAdapter::new(
			dir.path().to_path_buf(),
			dir.path().join(".backup"),
			vec![],
			vec!["**/*.md".to_string()],
		);
		let entries = adapter.discover().unwrap();
		let rels: Vec<_> = entries.iter().map(|e| e.vault_rel.clone()).collect();
		assert!(rels.contains(&"agent_a/skills/one.md".to_string()));
		assert!(!rels.iter().any(|r| r.contains("node_modules")));
	}
}

// vim: ts=4
