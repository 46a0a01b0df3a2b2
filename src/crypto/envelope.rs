//! Envelope codec: version-tagged AEAD framing of plaintext bytes.
//!
//! Wire/on-disk format:
//!
//! ```text
//! u32_LE(version=1) || u8[12] nonce || AES-256-GCM(ciphertext || 16B tag)
//! ```

use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use rand::rngs::OsRng;
use rand::RngCore;

use crate::error::CryptoError;

/// Current envelope format version. Decryption rejects any other value.
pub const ENVELOPE_FORMAT_VERSION: u32 = 1;

const VERSION_LEN: usize = 4;
const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;

/// A decoded envelope: the format version, nonce, and raw AEAD ciphertext
/// (including the trailing tag).
#[derive(Debug, Clone)]
pub struct Envelope {
	pub version: u32,
	pub nonce: [u8; NONCE_LEN],
	pub ciphertext: Vec<u8>,
}

impl Envelope {
	/// Serialize to the on-wire/on-disk byte layout.
	pub fn to_bytes(&self) -> Vec<u8> {
		let mut out = Vec::with_capacity(VERSION_LEN + NONCE_LEN + self.ciphertext.len());
		out.extend_from_slice(&self.version.to_le_bytes());
		out.extend_from_slice(&self.nonce);
		out.extend_from_slice(&self.ciphertext);
		out
	}

	/// Parse the on-wire/on-disk byte layout. Does not verify the AEAD tag —
	/// that only happens on decrypt.
	pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
		if bytes.len() < VERSION_LEN + NONCE_LEN + TAG_LEN {
			return Err(CryptoError::MalformedEnvelope {
				message: "envelope shorter than header + tag".to_string(),
			});
		}
		let version = u32::from_le_bytes(bytes[0..VERSION_LEN].try_into().unwrap());
		if version != ENVELOPE_FORMAT_VERSION {
			return Err(CryptoError::MalformedEnvelope {
				message: format!("unknown envelope format version {}", version),
			});
		}
		let mut nonce = [0u8; NONCE_LEN];
		nonce.copy_from_slice(&bytes[VERSION_LEN..VERSION_LEN + NONCE_LEN]);
		let ciphertext = bytes[VERSION_LEN + NONCE_LEN..].to_vec();
		Ok(Envelope { version, nonce, ciphertext })
	}
}

/// Encrypt `plaintext` under `key` (32 bytes), producing a fresh envelope.
///
/// A new random nonce is drawn from the OS CSPRNG on every call so that
/// re-uploads of the same plaintext under the same path key still produce
/// distinct envelopes.
pub fn encrypt_envelope(plaintext: &[u8], key: &[u8; 32]) -> Result<Envelope, CryptoError> {
	let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
	let mut nonce_bytes = [0u8; NONCE_LEN];
	OsRng.fill_bytes(&mut nonce_bytes);
	let nonce = Nonce::from_slice(&nonce_bytes);

	let ciphertext = cipher
		.encrypt(nonce, Payload { msg: plaintext, aad: &[] })
		.map_err(|_| CryptoError::EncryptFailed)?;

	Ok(Envelope { version: ENVELOPE_FORMAT_VERSION, nonce: nonce_bytes, ciphertext })
}

/// Decrypt an envelope under `key`. Surfaces a single failure mode
/// (`CryptoError::DecryptFailed`) without distinguishing wrong-key from
/// tampered-ciphertext.
pub fn decrypt_envelope(envelope: &Envelope, key: &[u8; 32]) -> Result<Vec<u8>, CryptoError> {
	if envelope.version != ENVELOPE_FORMAT_VERSION {
		return Err(CryptoError::MalformedEnvelope {
			message: format!("unknown envelope format version {}", envelope.version),
		});
	}
	let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
	let nonce = Nonce::from_slice(&envelope.nonce);
	cipher
		.decrypt(nonce, Payload { msg: &envelope.ciphertext, aad: &[] })
		.map_err(|_| CryptoError::DecryptFailed)
}

#[cfg(test)]
mod tests {
	use super::*;

	fn key() -> [u8; 32] {
		let mut k = [0u8; 32];
		for (i, b) in k.iter_mut().enumerate() {
			*b = i as u8;
		}
		k
	}

	#[test]
	fn round_trips() {
		let k = key();
		let plaintext = b"# A\nhello vault";
		let envelope = encrypt_envelope(plaintext, &k).unwrap();
		let decoded = decrypt_envelope(&envelope, &k).unwrap();
		assert_eq!(decoded, plaintext);
	}

	#[test]
	fn envelope_size_matches_formula() {
		let k = key();
		let plaintext = vec![0u8; 37];
		let envelope = encrypt_envelope(&plaintext, &k).unwrap();
		let bytes = envelope.to_bytes();
		assert_eq!(bytes.len(), VERSION_LEN + NONCE_LEN + plaintext.len() + TAG_LEN);
	}

	#[test]
	fn two_encryptions_of_same_plaintext_differ() {
		let k = key();
		let plaintext = b"same content";
		let e1 = encrypt_envelope(plaintext, &k).unwrap();
		let e2 = encrypt_envelope(plaintext, &k).unwrap();
		assert_ne!(e1.to_bytes(), e2.to_bytes());
		assert_ne!(e1.nonce, e2.nonce);
	}

	#[test]
	fn wrong_key_fails_to_decrypt() {
		let k1 = key();
		let mut k2 = key();
		k2[0] ^= 0xFF;
		let envelope = encrypt_envelope(b"secret", &k1).unwrap();
		assert!(decrypt_envelope(&envelope, &k2).is_err());
	}

	#[test]
	fn tampered_ciphertext_fails_to_decrypt() {
		let k = key();
		let mut envelope = encrypt_envelope(b"secret", &k).unwrap();
		let last = envelope.ciphertext.len() - 1;
		envelope.ciphertext[last] ^= 0x01;
		assert!(decrypt_envelope(&envelope, &k).is_err());
	}

	#[test]
	fn unknown_version_is_rejected() {
		let k = key();
		let mut envelope = encrypt_envelope(b"secret", &k).unwrap();
		envelope.version = 2;
		let bytes = envelope.to_bytes();
		assert!(Envelope::from_bytes(&bytes).is_err());
	}

	#[test]
	fn from_bytes_round_trips_through_to_bytes() {
		let k = key();
		let envelope = encrypt_envelope(b"round trip me", &k).unwrap();
		let bytes = envelope.to_bytes();
		let parsed = Envelope::from_bytes(&bytes).unwrap();
		assert_eq!(parsed.nonce, envelope.nonce);
		assert_eq!(parsed.ciphertext, envelope.ciphertext);
		let plaintext = decrypt_envelope(&parsed, &k).unwrap();
		assert_eq!(plaintext, b"round trip me");
	}
}

// vim: ts=4
