//! Server process: per-user file storage, versioning, auth, and
//! real-time change notification over HTTP/JSON + WebSocket.

pub mod blobs;
pub mod notify;
pub mod rate_limit;
pub mod routes;
pub mod scope;
pub mod storage;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub use blobs::BlobStore;
pub use notify::NotifyRegistry;
pub use rate_limit::RateLimiter;
pub use storage::ServerStorage;

use crate::config::ServerConfig;
use crate::error::ContextMateError;
use crate::logging::*;

/// Shared, cheaply-clonable server state handed to every route via axum's
/// `State` extractor.
#[derive(Clone)]
pub struct AppState {
	pub storage: Arc<ServerStorage>,
	pub blobs: Arc<BlobStore>,
	pub notify: Arc<NotifyRegistry>,
	pub rate_limiter: Arc<RateLimiter>,
	pub config: Arc<ServerConfig>,
}

/// Milliseconds since the Unix epoch.
pub fn now_ms() -> u64 {
	std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH).unwrap_or_default().as_millis() as u64
}

fn cors_layer(config: &ServerConfig) -> CorsLayer {
	let layer = CorsLayer::new().allow_methods(tower_http::cors::Any).allow_headers(tower_http::cors::Any);
	if config.allowed_origins.is_empty() {
		layer.allow_origin(tower_http::cors::Any)
	} else {
		let origins: Vec<_> = config.allowed_origins.iter().filter_map(|o| o.parse().ok()).collect();
		layer.allow_origin(origins)
	}
}

/// Assemble the full route tree over `state`.
pub fn build_router(state: AppState) -> Router {
	Router::new()
		.merge(routes::auth::router())
		.merge(routes::files::router())
		.merge(routes::keys::router())
		.merge(routes::ws::router())
		.merge(routes::audit::router())
		.layer(cors_layer(&state.config))
		.layer(TraceLayer::new_for_http())
		.with_state(state)
}

/// Build server state (storage, blobs, notify registry, rate limiter) from
/// `config`, without binding a listener — used directly by integration
/// tests that want an in-process router.
pub fn build_state(config: ServerConfig) -> Result<AppState, ContextMateError> {
	config.validate().map_err(|message| ContextMateError::Internal { message })?;
	std::fs::create_dir_all(&config.data_dir)?;
	let storage = Arc::new(ServerStorage::open(&config.data_dir.join("server.redb"))?);
	let blobs = Arc::new(BlobStore::new(config.data_dir.join("blobs"))?);
	let notify = Arc::new(NotifyRegistry::new());
	let rate_limiter = Arc::new(RateLimiter::new(
		config.salt_rate_limit_attempts,
		Duration::from_secs(config.salt_rate_limit_window_secs),
	));
	Ok(AppState { storage, blobs, notify, rate_limiter, config: Arc::new(config) })
}

/// Bind a listener on `config.port` and serve until the process is killed.
pub async fn serve(config: ServerConfig) -> Result<(), ContextMateError> {
	let port = config.port;
	let state = build_state(config)?;
	let app = build_router(state);
	let addr = SocketAddr::from(([0, 0, 0, 0], port));
	let listener = tokio::net::TcpListener::bind(addr).await?;
	info!(%addr, "contextmate server listening");
	axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
		.await
		.map_err(|e| ContextMateError::Internal { message: e.to_string() })?;
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;
	use tempfile::tempdir;

	fn test_config(dir: &std::path::Path) -> ServerConfig {
		ServerConfig {
			data_dir: dir.to_path_buf(),
			token_signing_secret: "s".repeat(32),
			..ServerConfig::default()
		}
	}

	#[test]
	fn build_state_creates_data_dir_and_tables() {
		let dir = tempdir().unwrap();
		let state = build_state(test_config(dir.path())).unwrap();
		assert!(state.storage.list_files("nobody").unwrap().is_empty());
	}

	#[test]
	fn build_state_rejects_missing_signing_secret() {
		let dir = tempdir().unwrap();
		let config = ServerConfig { data_dir: dir.path().to_path_buf(), ..ServerConfig::default() };
		assert!(build_state(config).is_err());
	}
}

// vim: ts=4
