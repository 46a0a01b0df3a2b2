//! Error types for ContextMate operations

use std::error::Error;
use std::fmt;
use std::io;

/// Helper to reduce `Box::new()` boilerplate when wrapping errors into
/// `Box<dyn Error + Send + Sync>` for error variant fields.
#[inline]
pub fn boxed_error<E: Error + Send + Sync + 'static>(e: E) -> Box<dyn Error + Send + Sync> {
	Box::new(e)
}

/// Unified error type surfaced by the engine, client, and server.
///
/// Variants correspond to the error kinds named in the error handling
/// design: each is either a direct leaf or wraps a domain-specific error.
#[derive(Debug)]
pub enum ContextMateError {
	/// The server could not be reached at all (DNS, connect refused, TLS failure).
	NetworkUnreachable { message: String },

	/// A transient network failure; retriable under the client's backoff policy.
	NetworkTransient { message: String },

	/// Session expired or API key revoked.
	AuthRejected { message: String },

	/// HTTP 429; caller should back off.
	RateLimited { retry_after_secs: Option<u64> },

	/// Upload exceeded the configured maximum size.
	PayloadTooLarge { size: u64, max: u64 },

	/// HTTP 409 on upload: optimistic concurrency lost.
	VersionConflict { path: String, current_version: u64, expected_version: u64 },

	/// Path failed vault-relative path validation (traversal, NUL, absolute, too long).
	PathRejected { path: String, message: String },

	/// AEAD decryption failed: wrong key or tampered ciphertext. Never
	/// distinguishes which, by design.
	DecryptFailed,

	/// Requested resource does not exist.
	NotFound { what: String },

	/// Local state store error (nested).
	StateStore(Box<dyn Error + Send + Sync>),

	/// I/O error.
	Io(io::Error),

	/// Adapter/symlink reconciliation error (nested).
	Adapter(Box<dyn Error + Send + Sync>),

	/// Cryptographic setup error (bad key material, invalid Argon2 params).
	Crypto(Box<dyn Error + Send + Sync>),

	/// Malformed envelope framing (bad version tag, truncated header).
	InvalidEnvelope { message: String },

	/// Generic internal error that doesn't fit another variant.
	Internal { message: String },
}

impl fmt::Display for ContextMateError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			ContextMateError::NetworkUnreachable { message } => {
				write!(f, "server unreachable: {}", message)
			}
			ContextMateError::NetworkTransient { message } => {
				write!(f, "transient network error: {}", message)
			}
			ContextMateError::AuthRejected { message } => {
				write!(f, "authentication rejected: {}", message)
			}
			ContextMateError::RateLimited { retry_after_secs } => match retry_after_secs {
				Some(secs) => write!(f, "rate limited, retry after {}s", secs),
				None => write!(f, "rate limited"),
			},
			ContextMateError::PayloadTooLarge { size, max } => {
				write!(f, "file too large: {} bytes exceeds maximum of {} bytes", size, max)
			}
			ContextMateError::VersionConflict { path, current_version, expected_version } => {
				write!(
					f,
					"version conflict on {}: expected {}, server has {}",
					path, expected_version, current_version
				)
			}
			ContextMateError::PathRejected { path, message } => {
				write!(f, "path rejected {:?}: {}", path, message)
			}
			ContextMateError::DecryptFailed => write!(f, "decrypt failed"),
			ContextMateError::NotFound { what } => write!(f, "not found: {}", what),
			ContextMateError::StateStore(e) => write!(f, "state store error: {}", e),
			ContextMateError::Io(e) => write!(f, "I/O error: {}", e),
			ContextMateError::Adapter(e) => write!(f, "adapter error: {}", e),
			ContextMateError::Crypto(e) => write!(f, "crypto error: {}", e),
			ContextMateError::InvalidEnvelope { message } => {
				write!(f, "invalid envelope: {}", message)
			}
			ContextMateError::Internal { message } => write!(f, "internal error: {}", message),
		}
	}
}

impl Error for ContextMateError {}

impl From<io::Error> for ContextMateError {
	fn from(e: io::Error) -> Self {
		ContextMateError::Io(e)
	}
}

impl From<String> for ContextMateError {
	fn from(message: String) -> Self {
		ContextMateError::Internal { message }
	}
}

impl From<redb::Error> for ContextMateError {
	fn from(e: redb::Error) -> Self {
		ContextMateError::StateStore(boxed_error(e))
	}
}

impl From<redb::DatabaseError> for ContextMateError {
	fn from(e: redb::DatabaseError) -> Self {
		ContextMateError::StateStore(boxed_error(e))
	}
}

impl From<redb::TransactionError> for ContextMateError {
	fn from(e: redb::TransactionError) -> Self {
		ContextMateError::StateStore(boxed_error(e))
	}
}

impl From<redb::TableError> for ContextMateError {
	fn from(e: redb::TableError) -> Self {
		ContextMateError::StateStore(boxed_error(e))
	}
}

impl From<redb::StorageError> for ContextMateError {
	fn from(e: redb::StorageError) -> Self {
		ContextMateError::StateStore(boxed_error(e))
	}
}

impl From<redb::CommitError> for ContextMateError {
	fn from(e: redb::CommitError) -> Self {
		ContextMateError::StateStore(boxed_error(e))
	}
}

impl From<serde_json::Error> for ContextMateError {
	fn from(e: serde_json::Error) -> Self {
		ContextMateError::Internal { message: format!("serialization error: {}", e) }
	}
}

/// Errors specific to the cryptographic layer.
#[derive(Debug)]
pub enum CryptoError {
	/// Argon2id parameters rejected by the implementation.
	InvalidParams { message: String },

	/// HKDF expand requested more output than the hash function supports.
	HkdfExpand { message: String },

	/// AEAD encryption failed (should not normally happen; surfaced for completeness).
	EncryptFailed,

	/// AEAD decryption failed: wrong key or tampered ciphertext.
	DecryptFailed,

	/// Envelope framing was truncated or carries an unknown format version.
	MalformedEnvelope { message: String },
}

impl fmt::Display for CryptoError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			CryptoError::InvalidParams { message } => write!(f, "invalid KDF params: {}", message),
			CryptoError::HkdfExpand { message } => write!(f, "HKDF expand failed: {}", message),
			CryptoError::EncryptFailed => write!(f, "encryption failed"),
			CryptoError::DecryptFailed => write!(f, "decrypt-failed"),
			CryptoError::MalformedEnvelope { message } => {
				write!(f, "malformed envelope: {}", message)
			}
		}
	}
}

impl Error for CryptoError {}

impl From<CryptoError> for ContextMateError {
	fn from(e: CryptoError) -> Self {
		match e {
			CryptoError::DecryptFailed => ContextMateError::DecryptFailed,
			CryptoError::MalformedEnvelope { message } => {
				ContextMateError::InvalidEnvelope { message }
			}
			other => ContextMateError::Crypto(boxed_error(other)),
		}
	}
}

/// Errors raised by the server-facing HTTP/WS API client.
#[derive(Debug)]
pub enum ApiError {
	/// Could not connect at all.
	Unreachable { message: String },

	/// 5xx / network blip; caller may retry.
	Transient { message: String },

	/// 401/403.
	Unauthorized { message: String },

	/// 429.
	RateLimited { retry_after_secs: Option<u64> },

	/// 413.
	TooLarge { size: u64, max: u64 },

	/// 409 on upload.
	Conflict { path: String, current_version: u64, expected_version: u64 },

	/// 404.
	NotFound { what: String },

	/// Any other unexpected status or body shape.
	Protocol { message: String },
}

impl fmt::Display for ApiError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			ApiError::Unreachable { message } => write!(f, "unreachable: {}", message),
			ApiError::Transient { message } => write!(f, "transient: {}", message),
			ApiError::Unauthorized { message } => write!(f, "unauthorized: {}", message),
			ApiError::RateLimited { retry_after_secs } => {
				write!(f, "rate limited (retry_after={:?})", retry_after_secs)
			}
			ApiError::TooLarge { size, max } => write!(f, "too large: {} > {}", size, max),
			ApiError::Conflict { path, current_version, expected_version } => write!(
				f,
				"conflict on {}: expected {} got {}",
				path, expected_version, current_version
			),
			ApiError::NotFound { what } => write!(f, "not found: {}", what),
			ApiError::Protocol { message } => write!(f, "protocol error: {}", message),
		}
	}
}

impl Error for ApiError {}

impl From<ApiError> for ContextMateError {
	fn from(e: ApiError) -> Self {
		match e {
			ApiError::Unreachable { message } => ContextMateError::NetworkUnreachable { message },
			ApiError::Transient { message } => ContextMateError::NetworkTransient { message },
			ApiError::Unauthorized { message } => ContextMateError::AuthRejected { message },
			ApiError::RateLimited { retry_after_secs } => {
				ContextMateError::RateLimited { retry_after_secs }
			}
			ApiError::TooLarge { size, max } => ContextMateError::PayloadTooLarge { size, max },
			ApiError::Conflict { path, current_version, expected_version } => {
				ContextMateError::VersionConflict { path, current_version, expected_version }
			}
			ApiError::NotFound { what } => ContextMateError::NotFound { what },
			ApiError::Protocol { message } => ContextMateError::Internal { message },
		}
	}
}

impl From<reqwest::Error> for ApiError {
	fn from(e: reqwest::Error) -> Self {
		if e.is_connect() {
			ApiError::Unreachable { message: e.to_string() }
		} else if e.is_timeout() {
			ApiError::Transient { message: e.to_string() }
		} else {
			ApiError::Protocol { message: e.to_string() }
		}
	}
}

/// Errors specific to adapter/symlink reconciliation.
#[derive(Debug)]
pub enum AdapterError {
	/// The external directory and vault sub-tree overlap (Mirror adapter guard).
	OverlappingRoots { external: String, vault: String },

	/// Expected entry is missing from the external directory.
	MissingEntry { path: String },

	/// Backup area could not be created or read.
	BackupFailed { message: String },

	/// Symlink creation/removal failed.
	LinkFailed { message: String },
}

impl fmt::Display for AdapterError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			AdapterError::OverlappingRoots { external, vault } => write!(
				f,
				"external directory {} overlaps vault sub-tree {}",
				external, vault
			),
			AdapterError::MissingEntry { path } => write!(f, "missing entry: {}", path),
			AdapterError::BackupFailed { message } => write!(f, "backup failed: {}", message),
			AdapterError::LinkFailed { message } => write!(f, "symlink operation failed: {}", message),
		}
	}
}

impl Error for AdapterError {}

impl From<AdapterError> for ContextMateError {
	fn from(e: AdapterError) -> Self {
		ContextMateError::Adapter(boxed_error(e))
	}
}

// vim: ts=4
