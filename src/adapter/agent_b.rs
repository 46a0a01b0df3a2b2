//! Agent-B adapter: several subtrees (skills, per-project
//! memories, rules) plus a distinguished root file, merged into one vault
//! sub-tree via per-subtree path-rewriting rules.
//!
//! Subtrees are mapped at directory granularity: one symlink per subtree,
//! not per file. `unlinkify` restores backed-up directories recursively,
//! which only makes sense because these entries are directory-level
//! symlinks to begin with.

use std::path::PathBuf;

use super::{Adapter, MappedEntry};
use crate::error::AdapterError;

/// Subtree name -> (external relative dir, vault-relative destination).
const SUBTREES: &[(&str, &str)] =
	&[("skills", "agent_b/skills"), ("memory", "agent_b/memories"), ("rules", "agent_b/rules")];

/// The distinguished root file.
const ROOT_FILE: &str = "AGENT.md";

pub struct AgentBAdapter {
	external_root: PathBuf,
	backup_root: PathBuf,
}

impl AgentBAdapter {
	pub fn new(external_root: PathBuf, backup_root: PathBuf) -> Self {
		AgentBAdapter { external_root, backup_root }
	}
}

impl Adapter for AgentBAdapter {
	fn name(&self) -> &'static str {
		"agent_b"
	}

	fn backup_root(&self) -> PathBuf {
		self.backup_root.clone()
	}

	fn discover(&self) -> Result<Vec<MappedEntry>, AdapterError> {
		let mut entries = Vec::new();
		for (subtree, vault_dest) in SUBTREES {
			entries.push(MappedEntry {
				external: self.external_root.join(subtree),
				vault_rel: vault_dest.to_string(),
				is_dir: true,
			});
		}
		entries.push(MappedEntry {
			external: self.external_root.join(ROOT_FILE),
			vault_rel: format!("agent_b/{}", ROOT_FILE),
			is_dir: false,
		});
		Ok(entries)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::fs;
	use tempfile::tempdir;

	#[test]
	fn discover_lists_all_subtrees_and_root_file() {
		let dir = tempdir().unwrap();
		let adapter = AgentBAdapter::new(dir.path().to_path_buf(), dir.path().join(".backup"));
		let entries = adapter.discover().unwrap();
		let rels: Vec<_> = entries.iter().map(|e| e.vault_rel.clone()).collect();
		assert!(rels.contains(&"agent_b/skills".to_string()));
		assert!(rels.contains(&"agent_b/memories".to_string()));
		assert!(rels.contains(&"agent_b/rules".to_string()));
		assert!(rels.contains(&"agent_b/AGENT.md".to_string()));
	}

	#[test]
	fn import_pulls_subtree_contents_into_vault() {
		let external_dir = tempdir().unwrap();
		let vault_dir = tempdir().unwrap();
		fs::create_dir_all(external_dir.path().join("skills/writer")).unwrap();
		fs::write(external_dir.path().join("skills/writer/SKILL.md"), b"write well").unwrap();

		let adapter = AgentBAdapter::new(external_dir.path().to_path_buf(), external_dir.path().join(".backup"));
		let report = adapter.import(vault_dir.path()).unwrap();
		assert!(report.imported.contains(&"agent_b/skills".to_string()));
		assert_eq!(
			fs::read(vault_dir.path().join("agent_b/skills/writer/SKILL.md")).unwrap(),
			b"write well"
		);
	}
}

// vim: ts=4
