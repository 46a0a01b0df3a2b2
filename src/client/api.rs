//! HTTP/JSON + binary blob server API client.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::ApiError;
use crate::logging::*;

/// Maximum retry attempts for retriable failures.
pub const MAX_RETRIES: u32 = 3;

/// Backoff schedule: 1s, 2s, 4s.
fn backoff_for_attempt(attempt: u32) -> Duration {
	Duration::from_secs(1u64 << attempt.min(2))
}

/// How the client authenticates outbound requests.
#[derive(Debug, Clone)]
pub enum AuthMode {
	Bearer(String),
	ApiKey(String),
}

impl AuthMode {
	fn header_value(&self) -> String {
		match self {
			AuthMode::Bearer(token) => format!("Bearer {}", token),
			AuthMode::ApiKey(key) => format!("Bearer {}", key),
		}
	}
}

/// One entry of the server's file listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteFile {
	pub path: String,
	pub version: u64,
	pub encrypted_hash: String,
	pub size: u64,
	pub updated_at: u64,
}

/// Transport abstraction over the server API. Lets the sync engine be
/// exercised against an in-memory fake in tests without a running server.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
	async fn list(&self) -> Result<Vec<RemoteFile>, ApiError>;
	async fn list_since(&self, since_ms: u64) -> Result<Vec<RemoteFile>, ApiError>;
	async fn upload(
		&self,
		path: &str,
		envelope_bytes: &[u8],
		encrypted_hash: &str,
		expected_version: u64,
	) -> Result<u64, ApiError>;
	async fn download(&self, path: &str) -> Result<(Vec<u8>, u64, String), ApiError>;
	async fn delete(&self, path: &str) -> Result<(), ApiError>;
}

/// Thin HTTP/JSON client over the ContextMate server API.
pub struct ApiClient {
	base_url: String,
	http: reqwest::Client,
	auth: AuthMode,
}

impl ApiClient {
	pub fn new(base_url: impl Into<String>, auth: AuthMode) -> Self {
		ApiClient {
			base_url: base_url.into(),
			http: reqwest::Client::new(),
			auth,
		}
	}

	fn encoded_path_url(&self, path: &str) -> String {
		let encoded = urlencoding::encode(path);
		format!("{}/files/{}", self.base_url, encoded)
	}

	/// Upload `envelope_bytes` at `path` with optimistic-concurrency control.
	/// Retries transient failures up to `MAX_RETRIES` times; never retries a
	/// 409 (surfaced immediately as `ApiError::Conflict`).
	pub async fn upload(
		&self,
		path: &str,
		envelope_bytes: &[u8],
		encrypted_hash: &str,
		expected_version: u64,
	) -> Result<u64, ApiError> {
		let url = self.encoded_path_url(path);
		self.with_retries(|| async {
			let response = self
				.http
				.put(&url)
				.header("Authorization", self.auth.header_value())
				.header("X-Content-Hash", encrypted_hash)
				.header("X-Version", expected_version.to_string())
				.body(envelope_bytes.to_vec())
				.send()
				.await?;
			handle_upload_response(path, response).await
		})
		.await
	}

	/// Download the envelope bytes, version, and encrypted hash for `path`.
	pub async fn download(&self, path: &str) -> Result<(Vec<u8>, u64, String), ApiError> {
		let url = self.encoded_path_url(path);
		self.with_retries(|| async {
			let response =
				self.http.get(&url).header("Authorization", self.auth.header_value()).send().await?;
			handle_download_response(path, response).await
		})
		.await
	}

	/// List all files visible to the authenticated user.
	pub async fn list(&self) -> Result<Vec<RemoteFile>, ApiError> {
		let url = format!("{}/files", self.base_url);
		self.with_retries(|| async {
			let response =
				self.http.get(&url).header("Authorization", self.auth.header_value()).send().await?;
			let body = handle_json_response(response).await?;
			let parsed: ListResponse = serde_json::from_str(&body)
				.map_err(|e| ApiError::Protocol { message: e.to_string() })?;
			Ok(parsed.files)
		})
		.await
	}

	/// List files changed since `since_ms`.
	pub async fn list_since(&self, since_ms: u64) -> Result<Vec<RemoteFile>, ApiError> {
		let url = format!("{}/files/changes?since={}", self.base_url, since_ms);
		self.with_retries(|| async {
			let response =
				self.http.get(&url).header("Authorization", self.auth.header_value()).send().await?;
			let body = handle_json_response(response).await?;
			let parsed: ListResponse = serde_json::from_str(&body)
				.map_err(|e| ApiError::Protocol { message: e.to_string() })?;
			Ok(parsed.files)
		})
		.await
	}

	/// Delete `path` on the server.
	pub async fn delete(&self, path: &str) -> Result<(), ApiError> {
		let url = self.encoded_path_url(path);
		self.with_retries(|| async {
			let response = self
				.http
				.delete(&url)
				.header("Authorization", self.auth.header_value())
				.send()
				.await?;
			match response.status().as_u16() {
				200 | 404 => Ok(()),
				status => Err(classify_status(status, response).await),
			}
		})
		.await
	}

	/// Retry wrapper: network failure, 5xx, and 429 are retried up to
	/// `MAX_RETRIES` times; anything else (including `Conflict`) is
	/// surfaced immediately.
	async fn with_retries<T, F, Fut>(&self, mut op: F) -> Result<T, ApiError>
	where
		F: FnMut() -> Fut,
		Fut: std::future::Future<Output = Result<T, ApiError>>,
	{
		let mut attempt = 0;
		loop {
			match op().await {
				Ok(value) => return Ok(value),
				Err(err) if attempt < MAX_RETRIES && is_retriable(&err) => {
					warn!(attempt, error = %err, "retrying API call");
					tokio::time::sleep(backoff_for_attempt(attempt)).await;
					attempt += 1;
				}
				Err(err) => return Err(err),
			}
		}
	}
}

#[async_trait::async_trait]
impl Transport for ApiClient {
	async fn list(&self) -> Result<Vec<RemoteFile>, ApiError> {
		ApiClient::list(self).await
	}

	async fn list_since(&self, since_ms: u64) -> Result<Vec<RemoteFile>, ApiError> {
		ApiClient::list_since(self, since_ms).await
	}

	async fn upload(
		&self,
		path: &str,
		envelope_bytes: &[u8],
		encrypted_hash: &str,
		expected_version: u64,
	) -> Result<u64, ApiError> {
		ApiClient::upload(self, path, envelope_bytes, encrypted_hash, expected_version).await
	}

	async fn download(&self, path: &str) -> Result<(Vec<u8>, u64, String), ApiError> {
		ApiClient::download(self, path).await
	}

	async fn delete(&self, path: &str) -> Result<(), ApiError> {
		ApiClient::delete(self, path).await
	}
}

fn is_retriable(err: &ApiError) -> bool {
	matches!(err, ApiError::Unreachable { .. } | ApiError::Transient { .. } | ApiError::RateLimited { .. })
}

#[derive(Debug, Deserialize)]
struct ListResponse {
	files: Vec<RemoteFile>,
}

#[derive(Debug, Deserialize)]
struct UploadOkResponse {
	#[allow(dead_code)]
	path: String,
	version: u64,
}

#[derive(Debug, Deserialize)]
struct ConflictResponse {
	#[allow(dead_code)]
	error: Option<String>,
	current_version: u64,
	expected_version: u64,
}

async fn handle_upload_response(path: &str, response: reqwest::Response) -> Result<u64, ApiError> {
	let status = response.status().as_u16();
	match status {
		200 => {
			let body = response.text().await.map_err(ApiError::from)?;
			let parsed: UploadOkResponse = serde_json::from_str(&body)
				.map_err(|e| ApiError::Protocol { message: e.to_string() })?;
			Ok(parsed.version)
		}
		409 => {
			let body = response.text().await.map_err(ApiError::from)?;
			let parsed: ConflictResponse = serde_json::from_str(&body)
				.map_err(|e| ApiError::Protocol { message: e.to_string() })?;
			Err(ApiError::Conflict {
				path: path.to_string(),
				current_version: parsed.current_version,
				expected_version: parsed.expected_version,
			})
		}
		status => Err(classify_status(status, response).await),
	}
}

async fn handle_download_response(
	path: &str,
	response: reqwest::Response,
) -> Result<(Vec<u8>, u64, String), ApiError> {
	let status = response.status().as_u16();
	if status != 200 {
		return Err(classify_status(status, response).await);
	}
	let version = header_u64(&response, "x-version").ok_or_else(|| ApiError::Protocol {
		message: "missing X-Version header".to_string(),
	})?;
	let encrypted_hash = response
		.headers()
		.get("x-content-hash")
		.and_then(|v| v.to_str().ok())
		.map(str::to_string)
		.ok_or_else(|| ApiError::Protocol { message: "missing X-Content-Hash header".to_string() })?;
	let bytes = response.bytes().await.map_err(ApiError::from)?;
	let _ = path;
	Ok((bytes.to_vec(), version, encrypted_hash))
}

async fn handle_json_response(response: reqwest::Response) -> Result<String, ApiError> {
	let status = response.status().as_u16();
	if status != 200 {
		return Err(classify_status(status, response).await);
	}
	response.text().await.map_err(ApiError::from)
}

fn header_u64(response: &reqwest::Response, name: &str) -> Option<u64> {
	response.headers().get(name)?.to_str().ok()?.parse().ok()
}

async fn classify_status(status: u16, response: reqwest::Response) -> ApiError {
	match status {
		401 | 403 => ApiError::Unauthorized { message: response.text().await.unwrap_or_default() },
		404 => ApiError::NotFound { what: response.text().await.unwrap_or_default() },
		413 => ApiError::TooLarge { size: 0, max: 0 },
		429 => {
			let retry_after_secs = response
				.headers()
				.get("retry-after")
				.and_then(|v| v.to_str().ok())
				.and_then(|v| v.parse().ok());
			ApiError::RateLimited { retry_after_secs }
		}
		500..=599 => ApiError::Transient { message: format!("server returned {}", status) },
		other => ApiError::Protocol { message: format!("unexpected status {}", other) },
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn backoff_schedule_matches_spec() {
		assert_eq!(backoff_for_attempt(0), Duration::from_secs(1));
		assert_eq!(backoff_for_attempt(1), Duration::from_secs(2));
		assert_eq!(backoff_for_attempt(2), Duration::from_secs(4));
	}

	#[test]
	fn conflict_is_not_retriable() {
		let err = ApiError::Conflict {
			path: "a.md".to_string(),
			current_version: 2,
			expected_version: 1,
		};
		assert!(!is_retriable(&err));
	}

	#[test]
	fn transient_and_rate_limited_are_retriable() {
		assert!(is_retriable(&ApiError::Transient { message: "x".to_string() }));
		assert!(is_retriable(&ApiError::RateLimited { retry_after_secs: None }));
		assert!(is_retriable(&ApiError::Unreachable { message: "x".to_string() }));
	}

	#[test]
	fn unauthorized_is_not_retriable() {
		assert!(!is_retriable(&ApiError::Unauthorized { message: "x".to_string() }));
	}
}

// vim: ts=4
