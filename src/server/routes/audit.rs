//! Audit log query route.

use axum::extract::{Query, State};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use crate::state::{ActionLogEntry, ActionQuery, AuditAction};

use super::auth::AuthContext;
use crate::server::AppState;

#[derive(Debug, Deserialize)]
struct AuditLogQuery {
	action: Option<String>,
	path: Option<String>,
	since: Option<u64>,
	limit: Option<usize>,
	offset: Option<usize>,
}

fn parse_action(value: &str) -> Option<AuditAction> {
	match value {
		"upload" => Some(AuditAction::Upload),
		"download" => Some(AuditAction::Download),
		"delete" => Some(AuditAction::Delete),
		"conflict" => Some(AuditAction::Conflict),
		"error" => Some(AuditAction::Error),
		_ => None,
	}
}

#[derive(Debug, Serialize)]
struct AuditLogResponse {
	entries: Vec<ActionLogEntry>,
}

async fn get_audit_log(
	State(state): State<AppState>,
	auth: AuthContext,
	Query(query): Query<AuditLogQuery>,
) -> Response {
	let action_query = ActionQuery {
		action: query.action.as_deref().and_then(parse_action),
		path_prefix: query.path,
		since: query.since,
		limit: query.limit,
		offset: query.offset,
	};
	match state.storage.query_audit(auth.user_id(), &action_query) {
		Ok(entries) => Json(AuditLogResponse { entries }).into_response(),
		Err(_) => axum::http::StatusCode::INTERNAL_SERVER_ERROR.into_response(),
	}
}

pub fn router() -> Router<AppState> {
	Router::new().route("/audit-log", get(get_audit_log))
}

// vim: ts=4
