//! Server-facing transport: HTTP/JSON + binary blob API client and the
//! real-time change subscription channel.

pub mod api;
pub mod subscription;

pub use api::{ApiClient, AuthMode, RemoteFile, Transport};
pub use subscription::{ChangeEvent, ChangeSubscription};

// vim: ts=4
