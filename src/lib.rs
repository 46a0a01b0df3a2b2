//! ContextMate: zero-knowledge, end-to-end encrypted synchronization of
//! small hierarchical file trees of AI-agent context (skills, memories,
//! rules) across devices, with optional symlink reconciliation into
//! existing agent-specific directory layouts.
//!
//! See `SPEC_FULL.md` for the full component map. Top-level modules
//! correspond 1:1 with the components named there.

pub mod adapter;
pub mod client;
pub mod config;
pub mod crypto;
pub mod engine;
pub mod error;
pub mod logging;
pub mod server;
pub mod state;
pub mod vault_path;
pub mod watcher;

pub use config::{ClientConfig, ServerConfig};
pub use error::ContextMateError;

// vim: ts=4
