//! Black-box coverage of the Agent-A adapter's full symlink reconciliation
//! lifecycle.

use contextmate::adapter::agent_a::AgentAAdapter;
use contextmate::adapter::Adapter;
use std::fs;
use std::os::unix::fs::symlink;
use tempfile::tempdir;

#[test]
fn full_lifecycle_round_trips_a_well_known_file() {
	let external = tempdir().unwrap();
	let vault = tempdir().unwrap();
	let backup = tempdir().unwrap();

	fs::write(external.path().join("CLAUDE.md"), b"hello from agent A").unwrap();

	let adapter = AgentAAdapter::new(
		external.path().to_path_buf(),
		backup.path().to_path_buf(),
		Vec::new(),
		Vec::new(),
	);

	let import = adapter.import(vault.path()).unwrap();
	assert!(import.imported.contains(&"agent_a/CLAUDE.md".to_string()));
	assert_eq!(fs::read(vault.path().join("agent_a/CLAUDE.md")).unwrap(), b"hello from agent A");

	let linkify = adapter.linkify(vault.path()).unwrap();
	assert!(linkify.linked.contains(&"agent_a/CLAUDE.md".to_string()));
	let link_meta = fs::symlink_metadata(external.path().join("CLAUDE.md")).unwrap();
	assert!(link_meta.file_type().is_symlink());

	let verify = adapter.verify().unwrap();
	assert!(verify.all_valid());

	// Re-running linkify on an already-linked entry is a no-op.
	let relink = adapter.linkify(vault.path()).unwrap();
	assert!(relink.already_linked.contains(&"agent_a/CLAUDE.md".to_string()));
	assert!(relink.linked.is_empty());
}

#[test]
fn broken_symlink_is_flagged_and_sync_back_repairs_it() {
	let external = tempdir().unwrap();
	let vault = tempdir().unwrap();
	let backup = tempdir().unwrap();

	fs::create_dir_all(vault.path().join("agent_a")).unwrap();
	fs::write(vault.path().join("agent_a/AGENTS.md"), b"vault copy").unwrap();
	symlink(vault.path().join("agent_a/AGENTS.md"), external.path().join("AGENTS.md")).unwrap();

	let adapter = AgentAAdapter::new(
		external.path().to_path_buf(),
		backup.path().to_path_buf(),
		Vec::new(),
		Vec::new(),
	);

	// Simulate an editor replacing the symlink with a plain file.
	fs::remove_file(external.path().join("AGENTS.md")).unwrap();
	fs::write(external.path().join("AGENTS.md"), b"edited in place").unwrap();

	let verify = adapter.verify().unwrap();
	assert!(!verify.all_valid());

	let sync_back = adapter.sync_back(vault.path()).unwrap();
	assert!(sync_back.synced.contains(&"agent_a/AGENTS.md".to_string()));
	assert_eq!(fs::read(vault.path().join("agent_a/AGENTS.md")).unwrap(), b"edited in place");
	assert!(fs::symlink_metadata(external.path().join("AGENTS.md")).unwrap().file_type().is_symlink());

	let verify_after = adapter.verify().unwrap();
	assert!(verify_after.all_valid());
}

#[test]
fn unlinkify_restores_the_backed_up_original() {
	let external = tempdir().unwrap();
	let vault = tempdir().unwrap();
	let backup = tempdir().unwrap();

	fs::write(external.path().join("CLAUDE.md"), b"original content").unwrap();

	let adapter = AgentAAdapter::new(
		external.path().to_path_buf(),
		backup.path().to_path_buf(),
		Vec::new(),
		Vec::new(),
	);

	adapter.import(vault.path()).unwrap();
	adapter.linkify(vault.path()).unwrap();
	let unlink = adapter.unlinkify(vault.path()).unwrap();
	assert!(unlink.restored.contains(&"agent_a/CLAUDE.md".to_string()));
	assert!(!fs::symlink_metadata(external.path().join("CLAUDE.md")).unwrap().file_type().is_symlink());
	assert_eq!(fs::read(external.path().join("CLAUDE.md")).unwrap(), b"original content");
}
