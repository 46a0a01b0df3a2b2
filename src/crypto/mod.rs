//! Cryptographic key hierarchy, envelope codec, and content hashing.
//!
//! Covers key derivation, the AES-256-GCM envelope, and BLAKE3 content
//! hashing — the building blocks whose round-trip, determinism, and key
//! separation properties the crypto tests exercise directly.

pub mod envelope;
pub mod hash;
pub mod keys;

pub use envelope::{decrypt_envelope, encrypt_envelope, Envelope, ENVELOPE_FORMAT_VERSION};
pub use hash::{constant_time_eq_hex, hash_content, HASH_HEX_LEN};
pub use keys::{KeyRing, MasterKey, PathKey};

// vim: ts=4
