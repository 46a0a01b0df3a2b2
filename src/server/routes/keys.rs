//! API key management.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, post};
use axum::{Json, Router};
use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::server::routes::auth::{AuthContext, API_KEY_PREFIX};
use crate::server::storage::ApiKeyRecord;
use crate::server::{now_ms, AppState};

#[derive(Debug, Serialize)]
struct ErrorBody {
	error: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateKeyRequest {
	name: String,
	scope: String,
	permissions: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateKeyResponse {
	id: String,
	key: String,
	scope: String,
	permissions: String,
}

fn parse_permissions(value: &str) -> Option<crate::server::storage::ApiKeyPermissions> {
	use crate::server::storage::ApiKeyPermissions::*;
	match value {
		"read" => Some(Read),
		"write" => Some(Write),
		"readwrite" => Some(ReadWrite),
		_ => None,
	}
}

fn permissions_to_str(p: crate::server::storage::ApiKeyPermissions) -> &'static str {
	use crate::server::storage::ApiKeyPermissions::*;
	match p {
		Read => "read",
		Write => "write",
		ReadWrite => "readwrite",
	}
}

/// Generate a fresh bearer secret, returned to the caller exactly once.
fn generate_api_key_secret() -> String {
	let mut raw = [0u8; 24];
	rand::thread_rng().fill_bytes(&mut raw);
	format!("{}{}", API_KEY_PREFIX, hex::encode(raw))
}

async fn create_key(State(state): State<AppState>, auth: AuthContext, Json(body): Json<CreateKeyRequest>) -> Response {
	if auth.require_session().is_err() {
		return (StatusCode::FORBIDDEN, Json(ErrorBody { error: "session auth required".to_string() })).into_response();
	}
	let Some(permissions) = parse_permissions(&body.permissions) else {
		return (StatusCode::BAD_REQUEST, Json(ErrorBody { error: "invalid permissions".to_string() })).into_response();
	};
	let secret = generate_api_key_secret();
	let key_hash = crate::crypto::hash::hash_content(secret.strip_prefix(API_KEY_PREFIX).unwrap().as_bytes());
	let record = ApiKeyRecord {
		id: uuid::Uuid::new_v4().to_string(),
		user_id: auth.user_id().to_string(),
		name: body.name,
		key_hash,
		scope: body.scope.clone(),
		permissions,
		created_at: now_ms(),
		revoked_at: None,
	};
	if state.storage.create_api_key(&record).is_err() {
		return internal_error();
	}
	(
		StatusCode::CREATED,
		Json(CreateKeyResponse {
			id: record.id,
			key: secret,
			scope: record.scope,
			permissions: permissions_to_str(record.permissions).to_string(),
		}),
	)
		.into_response()
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct KeyView {
	id: String,
	name: String,
	scope: String,
	permissions: String,
	created_at: u64,
	revoked_at: Option<u64>,
}

#[derive(Debug, Serialize)]
struct KeyListResponse {
	keys: Vec<KeyView>,
}

async fn list_keys(State(state): State<AppState>, auth: AuthContext) -> Response {
	if auth.require_session().is_err() {
		return (StatusCode::FORBIDDEN, Json(ErrorBody { error: "session auth required".to_string() })).into_response();
	}
	match state.storage.list_api_keys(auth.user_id()) {
		Ok(keys) => {
			let keys = keys
				.into_iter()
				.map(|k| KeyView {
					id: k.id,
					name: k.name,
					scope: k.scope,
					permissions: permissions_to_str(k.permissions).to_string(),
					created_at: k.created_at,
					revoked_at: k.revoked_at,
				})
				.collect();
			Json(KeyListResponse { keys }).into_response()
		}
		Err(_) => internal_error(),
	}
}

async fn revoke_key(State(state): State<AppState>, auth: AuthContext, Path(id): Path<String>) -> Response {
	if auth.require_session().is_err() {
		return (StatusCode::FORBIDDEN, Json(ErrorBody { error: "session auth required".to_string() })).into_response();
	}
	let keys = match state.storage.list_api_keys(auth.user_id()) {
		Ok(keys) => keys,
		Err(_) => return internal_error(),
	};
	if !keys.iter().any(|k| k.id == id) {
		return (StatusCode::NOT_FOUND, Json(ErrorBody { error: "unknown key".to_string() })).into_response();
	}
	match state.storage.revoke_api_key(&id, now_ms()) {
		Ok(true) => StatusCode::OK.into_response(),
		Ok(false) => (StatusCode::NOT_FOUND, Json(ErrorBody { error: "unknown key".to_string() })).into_response(),
		Err(_) => internal_error(),
	}
}

fn internal_error() -> Response {
	(StatusCode::INTERNAL_SERVER_ERROR, Json(ErrorBody { error: "internal error".to_string() })).into_response()
}

pub fn router() -> Router<AppState> {
	Router::new().route("/keys", post(create_key).get(list_keys)).route("/keys/:id", delete(revoke_key))
}

// vim: ts=4
