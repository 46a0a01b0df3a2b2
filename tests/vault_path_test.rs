//! Black-box coverage of vault-relative path validation (shared between
//! the client engine and the server route handlers).

use contextmate::vault_path::{resolve_under_root, validate_vault_path};
use std::path::Path;

#[test]
fn accepts_ordinary_nested_paths() {
	assert!(validate_vault_path("skills/rust/idioms.md").is_ok());
}

#[test]
fn rejects_absolute_paths() {
	assert!(validate_vault_path("/etc/passwd").is_err());
}

#[test]
fn rejects_parent_traversal() {
	assert!(validate_vault_path("skills/../../etc/passwd").is_err());
}

#[test]
fn rejects_dot_segments() {
	assert!(validate_vault_path("skills/./rust.md").is_err());
}

#[test]
fn rejects_empty_path() {
	assert!(validate_vault_path("").is_err());
}

#[test]
fn rejects_backslashes() {
	assert!(validate_vault_path("skills\\rust.md").is_err());
}

#[test]
fn rejects_nul_bytes() {
	assert!(validate_vault_path("skills/rust\0.md").is_err());
}

#[test]
fn rejects_overlong_paths() {
	let long = "a/".repeat(1024);
	assert!(validate_vault_path(&long).is_err());
}

#[test]
fn resolve_under_root_stays_within_bounds() {
	let root = Path::new("/vault");
	let resolved = resolve_under_root(root, "skills/rust.md").unwrap();
	assert_eq!(resolved, Path::new("/vault/skills/rust.md"));
}

#[test]
fn resolve_under_root_rejects_escaping_paths() {
	let root = Path::new("/vault");
	assert!(validate_vault_path("../outside.md").is_err());
	// Even if validation were bypassed, resolution must still catch it.
	let result = resolve_under_root(root, "../outside.md");
	assert!(result.is_err());
}
