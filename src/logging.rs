//! Logging prelude module for convenient access to tracing macros.
//!
//! Re-exports common tracing macros to reduce verbosity and keep logging
//! style consistent across the engine, client, and server.
//!
//! ```ignore
//! use crate::logging::*;
//!
//! info!("sync started");
//! warn!(path = %path, "conflict materialized");
//! ```

pub use tracing::{debug, error, info, trace, warn};

/// Initialize the tracing subscriber with environment filter support.
///
/// By default, logs at INFO level and above are displayed. Control the log
/// level with the `RUST_LOG` environment variable:
///
/// ```bash
/// RUST_LOG=debug cargo run
/// RUST_LOG=contextmate=trace cargo run
/// RUST_LOG=contextmate::engine=debug,contextmate::server=trace cargo run
/// ```
pub fn init_tracing() {
	tracing_subscriber::fmt()
		.with_env_filter(
			tracing_subscriber::EnvFilter::try_from_default_env()
				.unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
		)
		.with_writer(std::io::stderr)
		.init();
}

/// Initialize a tracing subscriber tailored for the server process: JSON
/// targets are left off (single-process deployment, not yet multi-tenant
/// logging infra), but thread ids are kept since the server is
/// multi-threaded and interleaved request logs benefit from them.
pub fn init_server_tracing() {
	tracing_subscriber::fmt()
		.with_env_filter(
			tracing_subscriber::EnvFilter::try_from_default_env()
				.unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
		)
		.with_thread_ids(true)
		.with_writer(std::io::stderr)
		.init();
}

// vim: ts=4
