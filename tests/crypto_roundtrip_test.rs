//! Black-box coverage of the key hierarchy and envelope codec from outside
//! the crate boundary.

use contextmate::crypto::{decrypt_envelope, encrypt_envelope, hash_content, KeyRing};

fn salt(byte: u8) -> [u8; 32] {
	[byte; 32]
}

#[test]
fn same_passphrase_and_salt_derive_identical_keys() {
	let a = KeyRing::derive("correct horse battery staple", &salt(7)).unwrap();
	let b = KeyRing::derive("correct horse battery staple", &salt(7)).unwrap();
	assert_eq!(a.vault_key(), b.vault_key());
	assert_eq!(a.auth_proof_hex(), b.auth_proof_hex());
}

#[test]
fn different_salts_derive_different_vault_keys() {
	let a = KeyRing::derive("hunter2", &salt(1)).unwrap();
	let b = KeyRing::derive("hunter2", &salt(2)).unwrap();
	assert_ne!(a.vault_key(), b.vault_key());
}

#[test]
fn vault_key_and_auth_key_are_independent() {
	let ring = KeyRing::derive("hunter2", &salt(9)).unwrap();
	assert_ne!(ring.vault_key(), ring.auth_key());
}

#[test]
fn wrong_passphrase_gives_different_auth_proof() {
	let right = KeyRing::derive("correct horse battery staple", &salt(3)).unwrap();
	let wrong = KeyRing::derive("incorrect horse", &salt(3)).unwrap();
	assert_ne!(right.auth_proof_hex(), wrong.auth_proof_hex());
}

#[test]
fn envelope_round_trips_under_the_right_key() {
	let ring = KeyRing::derive("passphrase", &salt(11)).unwrap();
	let plaintext = b"# memory\nalways check the invariants first";
	let envelope = encrypt_envelope(plaintext, ring.vault_key()).unwrap();
	let recovered = decrypt_envelope(&envelope, ring.vault_key()).unwrap();
	assert_eq!(recovered, plaintext);
}

#[test]
fn envelope_decryption_fails_under_the_wrong_key() {
	let a = KeyRing::derive("passphrase-a", &salt(21)).unwrap();
	let b = KeyRing::derive("passphrase-b", &salt(21)).unwrap();
	let envelope = encrypt_envelope(b"secret contents", a.vault_key()).unwrap();
	assert!(decrypt_envelope(&envelope, b.vault_key()).is_err());
}

#[test]
fn envelope_bytes_round_trip_through_the_wire_framing() {
	let ring = KeyRing::derive("passphrase", &salt(5)).unwrap();
	let envelope = encrypt_envelope(b"payload", ring.vault_key()).unwrap();
	let bytes = envelope.to_bytes();
	let reparsed = contextmate::crypto::Envelope::from_bytes(&bytes).unwrap();
	let recovered = decrypt_envelope(&reparsed, ring.vault_key()).unwrap();
	assert_eq!(recovered, b"payload");
}

#[test]
fn folder_keys_differ_per_folder() {
	let ring = KeyRing::derive("passphrase", &salt(13)).unwrap();
	let a = ring.folder_key("skills").unwrap();
	let b = ring.folder_key("memories").unwrap();
	assert_ne!(a, b);
}

#[test]
fn content_hash_is_stable_and_sensitive_to_every_byte() {
	let a = hash_content(b"hello world");
	let b = hash_content(b"hello world");
	let c = hash_content(b"hello worle");
	assert_eq!(a, b);
	assert_ne!(a, c);
}
