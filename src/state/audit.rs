//! Append-only action log entries, shared
//! shape between the local state store and the server's own audit log.

use serde::{Deserialize, Serialize};

/// Kinds of actions recorded in the audit/action log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
	Upload,
	Download,
	Delete,
	Conflict,
	Error,
}

/// One append-only log entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionLogEntry {
	pub id: u64,
	pub action: AuditAction,
	pub path: String,
	pub version: Option<u64>,
	pub size: Option<u64>,
	pub timestamp: u64,
	pub details: Option<String>,
}

/// Query parameters for the action log.
#[derive(Debug, Clone, Default)]
pub struct ActionQuery {
	pub action: Option<AuditAction>,
	pub path_prefix: Option<String>,
	pub since: Option<u64>,
	pub limit: Option<usize>,
	pub offset: Option<usize>,
}

// vim: ts=4
