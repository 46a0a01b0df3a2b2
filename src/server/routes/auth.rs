//! Passphrase-session and API-key authentication.

use std::net::SocketAddr;

use axum::extract::{ConnectInfo, FromRequestParts, Path, State};
use axum::http::{request::Parts, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::crypto::hash::constant_time_eq_hex;
use crate::error::ContextMateError;
use crate::server::scope::matches_scope;
use crate::server::storage::{ApiKeyPermissions, DeviceRecord, UserRecord};
use crate::server::{now_ms, AppState};

/// JWT claims for a passphrase session token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClaims {
	pub sub: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub device_id: Option<String>,
	pub exp: usize,
}

pub fn issue_session_token(
	secret: &str,
	user_id: &str,
	device_id: Option<&str>,
	ttl_secs: u64,
) -> Result<String, ContextMateError> {
	let exp = (now_ms() / 1000) as usize + ttl_secs as usize;
	let claims =
		SessionClaims { sub: user_id.to_string(), device_id: device_id.map(str::to_string), exp };
	encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_bytes()))
		.map_err(|e| ContextMateError::Internal { message: format!("token signing failed: {}", e) })
}

fn verify_session_token(secret: &str, token: &str) -> Result<SessionClaims, ContextMateError> {
	decode::<SessionClaims>(token, &DecodingKey::from_secret(secret.as_bytes()), &Validation::default())
		.map(|data| data.claims)
		.map_err(|_| ContextMateError::AuthRejected { message: "invalid or expired session token".to_string() })
}

/// API-key bearer secrets carry this prefix so the auth middleware can tell
/// them apart from JWTs without attempting a decode first.
pub const API_KEY_PREFIX: &str = "cmk_";

/// Resolved identity for an authenticated request: either a passphrase
/// session (full access to its own vault) or a scoped API key.
#[derive(Debug, Clone)]
pub enum AuthContext {
	Session { user_id: String, device_id: Option<String> },
	ApiKey { user_id: String, key_id: String, scope: String, permissions: ApiKeyPermissions },
}

impl AuthContext {
	pub fn user_id(&self) -> &str {
		match self {
			AuthContext::Session { user_id, .. } => user_id,
			AuthContext::ApiKey { user_id, .. } => user_id,
		}
	}

	pub fn device_id(&self) -> Option<&str> {
		match self {
			AuthContext::Session { device_id, .. } => device_id.as_deref(),
			AuthContext::ApiKey { .. } => None,
		}
	}

	/// Whether this identity may read `path`.
	pub fn can_read(&self, path: &str) -> bool {
		match self {
			AuthContext::Session { .. } => true,
			AuthContext::ApiKey { scope, permissions, .. } => {
				permissions.can_read() && matches_scope(path, scope)
			}
		}
	}

	/// Whether this identity may write (or delete) `path`.
	pub fn can_write(&self, path: &str) -> bool {
		match self {
			AuthContext::Session { .. } => true,
			AuthContext::ApiKey { scope, permissions, .. } => {
				permissions.can_write() && matches_scope(path, scope)
			}
		}
	}

	/// Only a passphrase session may manage devices or mint new API keys.
	pub fn require_session(&self) -> Result<(), ApiAuthError> {
		match self {
			AuthContext::Session { .. } => Ok(()),
			AuthContext::ApiKey { .. } => Err(ApiAuthError::SessionRequired),
		}
	}
}

#[derive(Debug)]
pub enum ApiAuthError {
	MissingCredentials,
	Invalid,
	SessionRequired,
}

impl IntoResponse for ApiAuthError {
	fn into_response(self) -> Response {
		let status = match self {
			ApiAuthError::MissingCredentials | ApiAuthError::Invalid => StatusCode::UNAUTHORIZED,
			ApiAuthError::SessionRequired => StatusCode::FORBIDDEN,
		};
		(status, Json(ErrorBody { error: "unauthorized".to_string() })).into_response()
	}
}

impl FromRequestParts<AppState> for AuthContext {
	type Rejection = ApiAuthError;

	async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
		let header = parts
			.headers
			.get(axum::http::header::AUTHORIZATION)
			.and_then(|v| v.to_str().ok())
			.ok_or(ApiAuthError::MissingCredentials)?;
		let token = header.strip_prefix("Bearer ").ok_or(ApiAuthError::Invalid)?;
		resolve_bearer(state, token).await
	}
}

/// Resolve a bearer token (session or API key) to a user id, for callers
/// that don't need the full `AuthContext`.
pub async fn resolve_session_or_key(state: &AppState, token: &str) -> Option<String> {
	resolve_bearer(state, token).await.ok().map(|ctx| ctx.user_id().to_string())
}

async fn resolve_bearer(state: &AppState, token: &str) -> Result<AuthContext, ApiAuthError> {
	if let Some(secret) = token.strip_prefix(API_KEY_PREFIX) {
		let key_hash = crate::crypto::hash::hash_content(secret.as_bytes());
		let record = state
			.storage
			.find_api_key_by_hash(&key_hash)
			.map_err(|_| ApiAuthError::Invalid)?
			.ok_or(ApiAuthError::Invalid)?;
		if record.revoked_at.is_some() {
			return Err(ApiAuthError::Invalid);
		}
		return Ok(AuthContext::ApiKey {
			user_id: record.user_id,
			key_id: record.id,
			scope: record.scope,
			permissions: record.permissions,
		});
	}
	let claims = verify_session_token(&state.config.token_signing_secret, token).map_err(|_| ApiAuthError::Invalid)?;
	Ok(AuthContext::Session { user_id: claims.sub, device_id: claims.device_id })
}

#[derive(Debug, Serialize)]
struct ErrorBody {
	error: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SaltResponse {
	salt: String,
}

async fn get_salt(
	State(state): State<AppState>,
	ConnectInfo(addr): ConnectInfo<SocketAddr>,
	Path(user_id): Path<String>,
) -> Response {
	if !state.rate_limiter.check(&addr.ip().to_string()) {
		return (StatusCode::TOO_MANY_REQUESTS, Json(ErrorBody { error: "rate limited".to_string() }))
			.into_response();
	}
	match state.storage.get_user(&user_id) {
		Ok(Some(user)) => (StatusCode::OK, Json(SaltResponse { salt: user.salt })).into_response(),
		Ok(None) => (StatusCode::NOT_FOUND, Json(ErrorBody { error: "unknown user".to_string() })).into_response(),
		Err(_) => internal_error(),
	}
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RegisterRequest {
	auth_key_hash: String,
	salt: String,
	encrypted_master_key: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RegisterResponse {
	user_id: String,
	token: String,
}

async fn register(State(state): State<AppState>, Json(body): Json<RegisterRequest>) -> Response {
	match state.storage.auth_hash_registered(&body.auth_key_hash) {
		Ok(true) => {
			return (StatusCode::CONFLICT, Json(ErrorBody { error: "already registered".to_string() }))
				.into_response()
		}
		Ok(false) => {}
		Err(_) => return internal_error(),
	}
	let user = UserRecord {
		id: uuid::Uuid::new_v4().to_string(),
		auth_key_hash: body.auth_key_hash,
		salt: body.salt,
		encrypted_master_key: body.encrypted_master_key,
		created_at: now_ms(),
	};
	if state.storage.create_user(&user).is_err() {
		return internal_error();
	}
	match issue_session_token(
		&state.config.token_signing_secret,
		&user.id,
		None,
		state.config.session_token_ttl_secs,
	) {
		Ok(token) => (StatusCode::CREATED, Json(RegisterResponse { user_id: user.id, token })).into_response(),
		Err(_) => internal_error(),
	}
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoginRequest {
	auth_key_hash: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct LoginResponse {
	user_id: String,
	token: String,
}

async fn login(State(state): State<AppState>, Json(body): Json<LoginRequest>) -> Response {
	let user = match state.storage.find_user_by_auth_hash(&body.auth_key_hash) {
		Ok(Some(user)) => user,
		Ok(None) => return unauthorized(),
		Err(_) => return internal_error(),
	};
	if !constant_time_eq_hex(&user.auth_key_hash, &body.auth_key_hash) {
		return unauthorized();
	}
	match issue_session_token(
		&state.config.token_signing_secret,
		&user.id,
		None,
		state.config.session_token_ttl_secs,
	) {
		Ok(token) => (StatusCode::OK, Json(LoginResponse { user_id: user.id, token })).into_response(),
		Err(_) => internal_error(),
	}
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateDeviceRequest {
	name: String,
	public_key: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateDeviceResponse {
	device_id: String,
}

async fn create_device(
	State(state): State<AppState>,
	auth: AuthContext,
	Json(body): Json<CreateDeviceRequest>,
) -> Response {
	if auth.require_session().is_err() {
		return ApiAuthError::SessionRequired.into_response();
	}
	let device = DeviceRecord {
		id: uuid::Uuid::new_v4().to_string(),
		user_id: auth.user_id().to_string(),
		name: body.name,
		public_key: body.public_key,
		encrypted_settings: None,
		created_at: now_ms(),
		last_seen_at: None,
	};
	if state.storage.create_device(&device).is_err() {
		return internal_error();
	}
	(StatusCode::CREATED, Json(CreateDeviceResponse { device_id: device.id })).into_response()
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DeviceView {
	id: String,
	name: String,
	public_key: String,
	created_at: u64,
	last_seen_at: Option<u64>,
}

impl From<DeviceRecord> for DeviceView {
	fn from(d: DeviceRecord) -> Self {
		DeviceView { id: d.id, name: d.name, public_key: d.public_key, created_at: d.created_at, last_seen_at: d.last_seen_at }
	}
}

#[derive(Debug, Serialize)]
struct DeviceListResponse {
	devices: Vec<DeviceView>,
}

async fn list_devices(State(state): State<AppState>, auth: AuthContext) -> Response {
	if auth.require_session().is_err() {
		return ApiAuthError::SessionRequired.into_response();
	}
	match state.storage.list_devices(auth.user_id()) {
		Ok(devices) => Json(DeviceListResponse { devices: devices.into_iter().map(DeviceView::from).collect() })
			.into_response(),
		Err(_) => internal_error(),
	}
}

async fn delete_device(State(state): State<AppState>, auth: AuthContext, Path(id): Path<String>) -> Response {
	if auth.require_session().is_err() {
		return ApiAuthError::SessionRequired.into_response();
	}
	match state.storage.get_device(&id) {
		Ok(Some(device)) if device.user_id == auth.user_id() => {
			match state.storage.delete_device(&id) {
				Ok(()) => StatusCode::OK.into_response(),
				Err(_) => internal_error(),
			}
		}
		Ok(_) => (StatusCode::NOT_FOUND, Json(ErrorBody { error: "unknown device".to_string() })).into_response(),
		Err(_) => internal_error(),
	}
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateDeviceSettingsRequest {
	encrypted_settings: String,
}

async fn update_device_settings(
	State(state): State<AppState>,
	auth: AuthContext,
	Path(id): Path<String>,
	Json(body): Json<UpdateDeviceSettingsRequest>,
) -> Response {
	if auth.require_session().is_err() {
		return ApiAuthError::SessionRequired.into_response();
	}
	let mut device = match state.storage.get_device(&id) {
		Ok(Some(device)) if device.user_id == auth.user_id() => device,
		Ok(_) => return (StatusCode::NOT_FOUND, Json(ErrorBody { error: "unknown device".to_string() })).into_response(),
		Err(_) => return internal_error(),
	};
	device.encrypted_settings = Some(body.encrypted_settings);
	match state.storage.update_device(&device) {
		Ok(()) => StatusCode::OK.into_response(),
		Err(_) => internal_error(),
	}
}

fn internal_error() -> Response {
	(StatusCode::INTERNAL_SERVER_ERROR, Json(ErrorBody { error: "internal error".to_string() })).into_response()
}

fn unauthorized() -> Response {
	(StatusCode::UNAUTHORIZED, Json(ErrorBody { error: "unauthorized".to_string() })).into_response()
}

pub fn router() -> Router<AppState> {
	Router::new()
		.route("/auth/salt/:userId", get(get_salt))
		.route("/auth/register", post(register))
		.route("/auth/login", post(login))
		.route("/auth/devices", post(create_device).get(list_devices))
		.route("/auth/devices/:id", delete(delete_device))
		.route("/auth/devices/:id/settings", put(update_device_settings))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn session_token_round_trips() {
		let token = issue_session_token("s".repeat(32).as_str(), "user-1", Some("device-1"), 3600).unwrap();
		let claims = verify_session_token("s".repeat(32).as_str(), &token).unwrap();
		assert_eq!(claims.sub, "user-1");
		assert_eq!(claims.device_id.as_deref(), Some("device-1"));
	}

	#[test]
	fn expired_token_is_rejected() {
		let token = issue_session_token("s".repeat(32).as_str(), "user-1", None, 0).unwrap();
		std::thread::sleep(std::time::Duration::from_millis(1100));
		assert!(verify_session_token("s".repeat(32).as_str(), &token).is_err());
	}

	#[test]
	fn wrong_secret_is_rejected() {
		let token = issue_session_token("s".repeat(32).as_str(), "user-1", None, 3600).unwrap();
		assert!(verify_session_token("other".repeat(32).as_str(), &token).is_err());
	}
}

// vim: ts=4
