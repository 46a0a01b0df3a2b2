//! File CRUD + CAS upload routes.
//!
//! Response shapes here are pinned to what `client::api::ApiClient` already
//! parses (see `ListResponse`/`UploadOkResponse`/`ConflictResponse` there):
//! listings use `RemoteFile`'s `camelCase` rename, but the upload-conflict
//! body intentionally stays `snake_case` to match the client's
//! `ConflictResponse`, which has no rename attribute of its own.

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use crate::client::RemoteFile;
use crate::crypto::hash::hash_content;
use crate::server::storage::ServerFileRecord;
use crate::server::{now_ms, AppState};
use crate::vault_path::validate_vault_path;

use super::auth::AuthContext;

#[derive(Debug, Serialize)]
struct ErrorBody {
	error: String,
}

fn to_remote_file(record: ServerFileRecord) -> RemoteFile {
	RemoteFile {
		path: record.path,
		version: record.version,
		encrypted_hash: record.encrypted_hash,
		size: record.size,
		updated_at: record.updated_at,
	}
}

#[derive(Debug, Serialize)]
struct ListResponse {
	files: Vec<RemoteFile>,
}

async fn list_files(State(state): State<AppState>, auth: AuthContext) -> Response {
	let files = match state.storage.list_files(auth.user_id()) {
		Ok(files) => files,
		Err(_) => return internal_error(),
	};
	let files = files.into_iter().filter(|f| auth.can_read(&f.path)).map(to_remote_file).collect();
	Json(ListResponse { files }).into_response()
}

#[derive(Debug, Deserialize)]
struct SinceQuery {
	since: Option<u64>,
}

async fn list_changes(
	State(state): State<AppState>,
	auth: AuthContext,
	Query(query): Query<SinceQuery>,
) -> Response {
	let since = query.since.unwrap_or(0);
	let files = match state.storage.list_files_since(auth.user_id(), since) {
		Ok(files) => files,
		Err(_) => return internal_error(),
	};
	let files = files.into_iter().filter(|f| auth.can_read(&f.path)).map(to_remote_file).collect();
	Json(ListResponse { files }).into_response()
}

fn decode_path(raw: &str) -> Result<String, Response> {
	let decoded = urlencoding::decode(raw)
		.map(|cow| cow.into_owned())
		.map_err(|_| (StatusCode::BAD_REQUEST, Json(ErrorBody { error: "malformed path encoding".to_string() })).into_response())?;
	validate_vault_path(&decoded)
		.map_err(|e| (StatusCode::BAD_REQUEST, Json(ErrorBody { error: e.to_string() })).into_response())?;
	Ok(decoded)
}

async fn get_file(State(state): State<AppState>, auth: AuthContext, Path(raw_path): Path<String>) -> Response {
	let path = match decode_path(&raw_path) {
		Ok(path) => path,
		Err(resp) => return resp,
	};
	if !auth.can_read(&path) {
		return forbidden();
	}
	let record = match state.storage.get_file(auth.user_id(), &path) {
		Ok(Some(record)) => record,
		Ok(None) => return not_found("unknown path"),
		Err(_) => return internal_error(),
	};
	let bytes = match state.blobs.get(&record.encrypted_hash) {
		Ok(bytes) => bytes,
		Err(_) => return not_found("blob not found"),
	};
	(
		StatusCode::OK,
		[("x-version", record.version.to_string()), ("x-content-hash", record.encrypted_hash.clone())],
		bytes,
	)
		.into_response()
}

#[derive(Debug, Serialize)]
struct UploadOkResponse {
	path: String,
	version: u64,
}

#[derive(Debug, Serialize)]
struct ConflictBody {
	error: Option<String>,
	current_version: u64,
	expected_version: u64,
}

async fn put_file(
	State(state): State<AppState>,
	auth: AuthContext,
	Path(raw_path): Path<String>,
	headers: axum::http::HeaderMap,
	body: Bytes,
) -> Response {
	let path = match decode_path(&raw_path) {
		Ok(path) => path,
		Err(resp) => return resp,
	};
	if !auth.can_write(&path) {
		return forbidden();
	}
	let max = state.config.max_upload_size;
	if body.len() as u64 > max {
		return (StatusCode::PAYLOAD_TOO_LARGE, Json(ErrorBody { error: "payload too large".to_string() }))
			.into_response();
	}
	let claimed_hash = match headers.get("x-content-hash").and_then(|v| v.to_str().ok()) {
		Some(hash) => hash.to_string(),
		None => {
			return (StatusCode::BAD_REQUEST, Json(ErrorBody { error: "missing X-Content-Hash".to_string() }))
				.into_response()
		}
	};
	let expected_version = match headers.get("x-version").and_then(|v| v.to_str().ok()).and_then(|v| v.parse().ok()) {
		Some(v) => v,
		None => {
			return (StatusCode::BAD_REQUEST, Json(ErrorBody { error: "missing X-Version".to_string() })).into_response()
		}
	};
	if hash_content(&body) != claimed_hash {
		return (StatusCode::BAD_REQUEST, Json(ErrorBody { error: "content hash mismatch".to_string() }))
			.into_response();
	}

	let record = match state.storage.upsert_file_cas(
		auth.user_id(),
		&path,
		expected_version,
		&claimed_hash,
		body.len() as u64,
		now_ms(),
	) {
		Ok(record) => record,
		Err(crate::error::ContextMateError::VersionConflict { current_version, expected_version, .. }) => {
			return (
				StatusCode::CONFLICT,
				Json(ConflictBody { error: None, current_version, expected_version }),
			)
				.into_response();
		}
		Err(_) => return internal_error(),
	};

	if state.blobs.put(&body).is_err() {
		return internal_error();
	}

	let _ = state.storage.append_audit(
		auth.user_id(),
		crate::state::ActionLogEntry {
			id: 0,
			action: crate::state::AuditAction::Upload,
			path: path.clone(),
			version: Some(record.version),
			size: Some(record.size),
			timestamp: now_ms(),
			details: None,
		},
	);

	state.notify.publish(
		auth.user_id(),
		crate::client::ChangeEvent::FileUpdated { path: path.clone(), version: record.version },
		auth.device_id(),
	);

	Json(UploadOkResponse { path, version: record.version }).into_response()
}

async fn delete_file(State(state): State<AppState>, auth: AuthContext, Path(raw_path): Path<String>) -> Response {
	let path = match decode_path(&raw_path) {
		Ok(path) => path,
		Err(resp) => return resp,
	};
	if !auth.can_write(&path) {
		return forbidden();
	}
	let record = match state.storage.get_file(auth.user_id(), &path) {
		Ok(Some(record)) => record,
		Ok(None) => return StatusCode::NOT_FOUND.into_response(),
		Err(_) => return internal_error(),
	};
	match state.storage.delete_file(auth.user_id(), &path) {
		Ok(true) => {}
		Ok(false) => return StatusCode::NOT_FOUND.into_response(),
		Err(_) => return internal_error(),
	}
	let _ = state.blobs.remove(&record.encrypted_hash);
	let _ = state.storage.append_audit(
		auth.user_id(),
		crate::state::ActionLogEntry {
			id: 0,
			action: crate::state::AuditAction::Delete,
			path: path.clone(),
			version: None,
			size: None,
			timestamp: now_ms(),
			details: None,
		},
	);
	state.notify.publish(auth.user_id(), crate::client::ChangeEvent::FileDeleted { path }, auth.device_id());
	StatusCode::OK.into_response()
}

fn internal_error() -> Response {
	(StatusCode::INTERNAL_SERVER_ERROR, Json(ErrorBody { error: "internal error".to_string() })).into_response()
}

fn forbidden() -> Response {
	(StatusCode::FORBIDDEN, Json(ErrorBody { error: "forbidden".to_string() })).into_response()
}

fn not_found(what: &str) -> Response {
	(StatusCode::NOT_FOUND, Json(ErrorBody { error: what.to_string() })).into_response()
}

pub fn router() -> Router<AppState> {
	Router::new()
		.route("/files", get(list_files))
		.route("/files/changes", get(list_changes))
		.route("/files/:path", get(get_file).put(put_file).delete(delete_file))
}

// vim: ts=4
