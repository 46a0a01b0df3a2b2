//! Content hash: BLAKE3-256, hex-encoded.
//!
//! Used as the local plaintext fingerprint, the `encrypted_hash` over
//! envelope bytes, the `key_hash` for API keys, and the auth proof derived
//! from `auth_key`. Any comparison against user-supplied input must run in
//! constant time.

use subtle::ConstantTimeEq;

/// Length of a hex-encoded BLAKE3-256 digest.
pub const HASH_HEX_LEN: usize = 64;

/// Hash arbitrary bytes with BLAKE3-256, hex-encoded.
pub fn hash_content(bytes: &[u8]) -> String {
	hex::encode(blake3::hash(bytes).as_bytes())
}

/// Compare two hex-encoded hashes in constant time. Used whenever a stored
/// hash is compared against a value supplied over the wire (e.g. an
/// `X-Content-Hash` header, an API key's bearer secret hash).
pub fn constant_time_eq_hex(a: &str, b: &str) -> bool {
	// Length differs -> not equal, but comparing lengths is not itself
	// secret-dependent since hash outputs have a fixed length in practice.
	if a.len() != b.len() {
		return false;
	}
	a.as_bytes().ct_eq(b.as_bytes()).into()
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn is_pure_and_produces_64_hex_chars() {
		let h1 = hash_content(b"hello");
		let h2 = hash_content(b"hello");
		assert_eq!(h1, h2);
		assert_eq!(h1.len(), HASH_HEX_LEN);
		assert!(h1.chars().all(|c| c.is_ascii_hexdigit()));
	}

	#[test]
	fn different_inputs_differ() {
		assert_ne!(hash_content(b"a"), hash_content(b"b"));
	}

	#[test]
	fn empty_input_hashes_fine() {
		let h = hash_content(b"");
		assert_eq!(h.len(), HASH_HEX_LEN);
	}

	#[test]
	fn constant_time_eq_matches_ordinary_eq() {
		let h1 = hash_content(b"x");
		let h2 = hash_content(b"x");
		let h3 = hash_content(b"y");
		assert!(constant_time_eq_hex(&h1, &h2));
		assert!(!constant_time_eq_hex(&h1, &h3));
	}
}

// vim: ts=4
