//! Configuration types. File/env discovery is out of
//! scope; these are the shapes and defaults the engine,
//! client, and server are parameterized by.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Default maximum file size: 10 MiB.
pub const DEFAULT_MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;

/// Default poll interval for the periodic full sweep.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 60_000;

/// Default watcher debounce window.
pub const DEFAULT_DEBOUNCE_MS: u64 = 500;

/// Default retry cap for the API client.
pub const DEFAULT_RETRY_CAP: u32 = 3;

/// Client-side configuration: server URL, vault/data directory paths, poll
/// interval, debounce, retry cap, adapter enablement flags, extra-paths
/// globs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ClientConfig {
	/// Base URL of the ContextMate server, e.g. `https://sync.example.com`.
	pub server_url: String,

	/// Local vault directory holding the plaintext file tree.
	pub vault_dir: PathBuf,

	/// Directory for local state (state store, credentials).
	pub data_dir: PathBuf,

	/// Periodic full-sweep interval.
	pub poll_interval_ms: u64,

	/// Watcher debounce window.
	pub debounce_ms: u64,

	/// Maximum retry attempts for retriable API calls.
	pub retry_cap: u32,

	/// Maximum plaintext file size accepted for sync.
	pub max_file_size: u64,

	/// Which adapters are enabled.
	pub adapters: AdapterConfig,

	/// Glob patterns for user-specified extra paths to mirror into the
	/// vault under `custom/`.
	pub extra_path_globs: Vec<String>,
}

impl Default for ClientConfig {
	fn default() -> Self {
		ClientConfig {
			server_url: "http://127.0.0.1:8787".to_string(),
			vault_dir: PathBuf::from("./vault"),
			data_dir: PathBuf::from("./.contextmate"),
			poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
			debounce_ms: DEFAULT_DEBOUNCE_MS,
			retry_cap: DEFAULT_RETRY_CAP,
			max_file_size: DEFAULT_MAX_FILE_SIZE,
			adapters: AdapterConfig::default(),
			extra_path_globs: Vec::new(),
		}
	}
}

/// Which adapter variants are active for this client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AdapterConfig {
	pub agent_a_enabled: bool,
	pub agent_b_enabled: bool,
	pub mirror_enabled: bool,
}

impl Default for AdapterConfig {
	fn default() -> Self {
		AdapterConfig { agent_a_enabled: false, agent_b_enabled: false, mirror_enabled: false }
	}
}

/// Server-side configuration: data directory root, listen port, default
/// upload limit, allowed cross-origin list, token signing secret.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ServerConfig {
	/// Root directory for server-side redb metadata + blob storage.
	pub data_dir: PathBuf,

	/// TCP port to listen on.
	pub port: u16,

	/// Default per-upload size limit, enforced twice.
	pub max_upload_size: u64,

	/// Allowed CORS origins.
	pub allowed_origins: Vec<String>,

	/// Process-wide secret used to sign session tokens. Read once at
	/// startup and never rotated at runtime. Absent => startup
	/// fails: callers should populate this from an environment
	/// variable before constructing `ServerConfig` for production use.
	pub token_signing_secret: String,

	/// Rate limit for the salt lookup endpoint: attempts allowed per
	/// window, per client IP.
	pub salt_rate_limit_attempts: u32,
	pub salt_rate_limit_window_secs: u64,

	/// Session token expiry.
	pub session_token_ttl_secs: u64,
}

impl Default for ServerConfig {
	fn default() -> Self {
		ServerConfig {
			data_dir: PathBuf::from("./data"),
			port: 8787,
			max_upload_size: DEFAULT_MAX_FILE_SIZE,
			allowed_origins: Vec::new(),
			token_signing_secret: String::new(),
			salt_rate_limit_attempts: 10,
			salt_rate_limit_window_secs: 15 * 60,
			session_token_ttl_secs: 24 * 60 * 60,
		}
	}
}

impl ServerConfig {
	/// Validate the configuration is startable: a missing token signing
	/// secret must fail startup, not silently run insecurely.
	pub fn validate(&self) -> Result<(), String> {
		if self.token_signing_secret.is_empty() {
			return Err("token_signing_secret is required".to_string());
		}
		Ok(())
	}
}


// vim: ts=4
