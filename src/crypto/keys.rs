//! Key hierarchy: deterministic derivation of per-path symmetric keys
//! from a passphrase and a per-user salt.
//!
//! ```text
//! master    = Argon2id(P, S, t=3, m=65536 KiB, p=4, len=32)
//! vault_key = HKDF-SHA256(master, info="contextmate-vault-enc", salt=zero[32])
//! auth_key  = HKDF-SHA256(master, info="contextmate-auth",      salt=zero[32])
//! share_key = HKDF-SHA256(master, info="contextmate-sharing",   salt=zero[32])
//! folder_k(f)     = HKDF-SHA256(vault_key,    info="contextmate-folder-" + f, salt=zero[32])
//! file_k(folder,r)= HKDF-SHA256(folder_k(folder), info="contextmate-file-" + r, salt=zero[32])
//! path_key(path)  = file_k(first_segment(path), rest_of_path(path))
//! ```
//!
//! Raising the Argon2id parameters is a format-version bump;
//! they are therefore fixed constants, not configuration.

use argon2::{Algorithm, Argon2, Params, Version};
use hkdf::Hkdf;
use sha2::Sha256;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::CryptoError;

/// Salt length for the per-user Argon2id salt.
pub const SALT_LEN: usize = 32;

/// All derived keys in this hierarchy are 32 bytes (AES-256-GCM key size).
pub const KEY_LEN: usize = 32;

/// HKDF uses a fixed, all-zero 32-byte salt; domain separation comes
/// entirely from the `info` string.
const HKDF_SALT: [u8; 32] = [0u8; 32];

const INFO_VAULT: &[u8] = b"contextmate-vault-enc";
const INFO_AUTH: &[u8] = b"contextmate-auth";
const INFO_SHARE: &[u8] = b"contextmate-sharing";
const INFO_FOLDER_PREFIX: &[u8] = b"contextmate-folder-";
const INFO_FILE_PREFIX: &[u8] = b"contextmate-file-";

fn argon2_params() -> Result<Params, CryptoError> {
	// t=3, m=65536 KiB, p=4, len=32 — fixed, never tunable at runtime.
	Params::new(65536, 3, 4, Some(KEY_LEN))
		.map_err(|e| CryptoError::InvalidParams { message: e.to_string() })
}

fn hkdf_expand(ikm: &[u8], info: &[u8]) -> Result<[u8; KEY_LEN], CryptoError> {
	let hk = Hkdf::<Sha256>::new(Some(&HKDF_SALT), ikm);
	let mut out = [0u8; KEY_LEN];
	hk.expand(info, &mut out).map_err(|e| CryptoError::HkdfExpand { message: e.to_string() })?;
	Ok(out)
}

/// A 32-byte symmetric key, zeroized on drop. Used for every derived key in
/// the hierarchy (master, vault, auth, share, folder, file/path).
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct MasterKey(pub [u8; KEY_LEN]);

impl MasterKey {
	/// Derive the master key from a passphrase and per-user salt via Argon2id.
	pub fn derive(passphrase: &str, salt: &[u8; SALT_LEN]) -> Result<Self, CryptoError> {
		let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, argon2_params()?);
		let mut out = [0u8; KEY_LEN];
		argon2
			.hash_password_into(passphrase.as_bytes(), salt, &mut out)
			.map_err(|e| CryptoError::InvalidParams { message: e.to_string() })?;
		Ok(MasterKey(out))
	}

	pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
		&self.0
	}
}

/// A path-specific symmetric key. Never reused across two distinct paths.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct PathKey(pub [u8; KEY_LEN]);

impl PathKey {
	pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
		&self.0
	}
}

/// Bundles the three top-level derived keys plus the folder/file derivation
/// functions for one unlocked session. Constructed once per login.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct KeyRing {
	master: MasterKey,
	vault_key: [u8; KEY_LEN],
	auth_key: [u8; KEY_LEN],
	share_key: [u8; KEY_LEN],
}

impl KeyRing {
	/// Derive the full key ring from a passphrase and per-user salt.
	pub fn derive(passphrase: &str, salt: &[u8; SALT_LEN]) -> Result<Self, CryptoError> {
		let master = MasterKey::derive(passphrase, salt)?;
		let vault_key = hkdf_expand(master.as_bytes(), INFO_VAULT)?;
		let auth_key = hkdf_expand(master.as_bytes(), INFO_AUTH)?;
		let share_key = hkdf_expand(master.as_bytes(), INFO_SHARE)?;
		Ok(KeyRing { master, vault_key, auth_key, share_key })
	}

	pub fn vault_key(&self) -> &[u8; KEY_LEN] {
		&self.vault_key
	}

	pub fn auth_key(&self) -> &[u8; KEY_LEN] {
		&self.auth_key
	}

	pub fn share_key(&self) -> &[u8; KEY_LEN] {
		&self.share_key
	}

	/// `BLAKE3(auth_key)` hex-encoded: the proof of passphrase knowledge sent
	/// to the server. The server stores and compares only this
	/// hash, never the key itself.
	pub fn auth_proof_hex(&self) -> String {
		hex::encode(blake3::hash(&self.auth_key).as_bytes())
	}

	/// Derive the folder key for a top-level path segment.
	pub fn folder_key(&self, folder: &str) -> Result<[u8; KEY_LEN], CryptoError> {
		let mut info = Vec::with_capacity(INFO_FOLDER_PREFIX.len() + folder.len());
		info.extend_from_slice(INFO_FOLDER_PREFIX);
		info.extend_from_slice(folder.as_bytes());
		hkdf_expand(&self.vault_key, &info)
	}

	/// Derive the file key within an already-derived folder key.
	pub fn file_key_in_folder(
		folder_key: &[u8; KEY_LEN],
		rest: &str,
	) -> Result<PathKey, CryptoError> {
		let mut info = Vec::with_capacity(INFO_FILE_PREFIX.len() + rest.len());
		info.extend_from_slice(INFO_FILE_PREFIX);
		info.extend_from_slice(rest.as_bytes());
		Ok(PathKey(hkdf_expand(folder_key, &info)?))
	}

	/// Derive the path key for a full vault-relative path, splitting on the
	/// first `/`. Renaming a file across top-level folders necessarily
	/// re-keys it, which isolates blast radius if a single folder key
	/// were ever compromised.
	pub fn path_key(&self, path: &str) -> Result<PathKey, CryptoError> {
		let (folder, rest) = split_first_segment(path);
		let folder_key = self.folder_key(folder)?;
		Self::file_key_in_folder(&folder_key, rest)
	}
}

/// Split a vault-relative path into its first segment ("folder") and the
/// remainder. A path with no `/` has itself as both the folder and an empty
/// remainder segment elided — the whole path is treated as the remainder so
/// that `path_key("a")` and `path_key("a/x")` cannot collide.
fn split_first_segment(path: &str) -> (&str, &str) {
	match path.find('/') {
		Some(idx) => (&path[..idx], &path[idx + 1..]),
		None => (path, path),
	}
}

/// Zero out a byte buffer in place. Convenience wrapper kept alongside the
/// key types so callers decrypting plaintext can scrub it without pulling
/// in `zeroize::Zeroize` directly at every call site.
pub fn zeroize_bytes(buf: &mut [u8]) {
	buf.zeroize();
}

#[cfg(test)]
mod tests {
	use super::*;

	fn fixed_salt() -> [u8; SALT_LEN] {
		let mut salt = [0u8; SALT_LEN];
		for (i, b) in salt.iter_mut().enumerate() {
			*b = i as u8;
		}
		salt
	}

	#[test]
	fn master_key_is_deterministic() {
		let salt = fixed_salt();
		let k1 = MasterKey::derive("correct horse", &salt).unwrap();
		let k2 = MasterKey::derive("correct horse", &salt).unwrap();
		assert_eq!(k1.as_bytes(), k2.as_bytes());
	}

	#[test]
	fn different_passphrases_yield_different_masters() {
		let salt = fixed_salt();
		let k1 = MasterKey::derive("correct horse", &salt).unwrap();
		let k2 = MasterKey::derive("wrong horse", &salt).unwrap();
		assert_ne!(k1.as_bytes(), k2.as_bytes());
	}

	#[test]
	fn derived_keys_are_mutually_distinct() {
		let salt = fixed_salt();
		let ring = KeyRing::derive("correct horse battery staple", &salt).unwrap();
		assert_ne!(ring.vault_key(), ring.auth_key());
		assert_ne!(ring.vault_key(), ring.share_key());
		assert_ne!(ring.auth_key(), ring.share_key());
	}

	#[test]
	fn path_key_matches_manual_derivation() {
		let salt = fixed_salt();
		let ring = KeyRing::derive("pw", &salt).unwrap();
		let direct = ring.path_key("a/x").unwrap();
		let folder = ring.folder_key("a").unwrap();
		let manual = KeyRing::file_key_in_folder(&folder, "x").unwrap();
		assert_eq!(direct.as_bytes(), manual.as_bytes());
	}

	#[test]
	fn path_keys_are_statistically_separated() {
		let salt = fixed_salt();
		let ring = KeyRing::derive("pw", &salt).unwrap();
		let mut seen = std::collections::HashSet::new();
		for i in 0..1000 {
			let path = format!("folder{}/file{}.md", i % 13, i);
			let key = ring.path_key(&path).unwrap();
			assert!(seen.insert(*key.as_bytes()), "collision at {}", path);
		}
	}

	#[test]
	fn auth_proof_is_hex_blake3_of_auth_key() {
		let salt = fixed_salt();
		let ring = KeyRing::derive("pw", &salt).unwrap();
		let expected = hex::encode(blake3::hash(ring.auth_key()).as_bytes());
		assert_eq!(ring.auth_proof_hex(), expected);
		assert_eq!(ring.auth_proof_hex().len(), 64);
	}

	#[test]
	fn renaming_across_folders_rekeys_file() {
		let salt = fixed_salt();
		let ring = KeyRing::derive("pw", &salt).unwrap();
		let k1 = ring.path_key("skills/a.md").unwrap();
		let k2 = ring.path_key("memory/a.md").unwrap();
		assert_ne!(k1.as_bytes(), k2.as_bytes());
	}
}

// vim: ts=4
