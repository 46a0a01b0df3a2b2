//! Black-box coverage of API key scope matching.

use contextmate::server::scope::{matches_any_scope, matches_scope};

#[test]
fn wildcard_scope_matches_everything() {
	assert!(matches_scope("skills/rust.md", "*"));
	assert!(matches_scope("", "*"));
}

#[test]
fn prefix_scope_matches_only_under_the_prefix() {
	assert!(matches_scope("skills/rust.md", "skills/*"));
	assert!(matches_scope("skills/nested/rust.md", "skills/*"));
	assert!(!matches_scope("memories/rust.md", "skills/*"));
}

#[test]
fn prefix_scope_does_not_match_a_sibling_with_shared_prefix() {
	// "skills-extra/foo.md" shares a textual prefix with "skills" but is a
	// different top-level directory; the prefix match must not blur them.
	assert!(!matches_scope("skills-extra/foo.md", "skills/*"));
}

#[test]
fn exact_scope_matches_only_that_path() {
	assert!(matches_scope("skills/rust.md", "skills/rust.md"));
	assert!(!matches_scope("skills/rust2.md", "skills/rust.md"));
}

#[test]
fn any_scope_matches_if_one_of_several_scopes_matches() {
	let scopes = vec!["memories/*".to_string(), "skills/rust.md".to_string()];
	assert!(matches_any_scope("skills/rust.md", &scopes));
	assert!(matches_any_scope("memories/today.md", &scopes));
	assert!(!matches_any_scope("rules/style.md", &scopes));
}
