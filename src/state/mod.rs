//! Local state store: a durable catalogue of tracked files plus an
//! append-only action log.

pub mod audit;
pub mod store;

pub use audit::{ActionLogEntry, ActionQuery, AuditAction};
pub use store::{StateStore, SyncState, TrackedFile};

// vim: ts=4
