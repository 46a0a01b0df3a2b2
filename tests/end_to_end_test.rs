//! End-to-end coverage of the server's HTTP surface: register, login,
//! upload, download, conflicting concurrent edits, and a scoped API key
//! restricted to a single prefix.

use contextmate::config::ServerConfig;
use contextmate::crypto::{hash_content, KeyRing};
use contextmate::server::{build_router, build_state};
use std::net::SocketAddr;
use tempfile::tempdir;

async fn spawn_server() -> (String, tempfile::TempDir) {
	let dir = tempdir().unwrap();
	let config = ServerConfig {
		data_dir: dir.path().to_path_buf(),
		token_signing_secret: "end-to-end-test-signing-secret-0".to_string(),
		..ServerConfig::default()
	};
	let state = build_state(config).unwrap();
	let app = build_router(state);
	let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
	let addr = listener.local_addr().unwrap();
	tokio::spawn(async move {
		axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await.unwrap();
	});
	(format!("http://{}", addr), dir)
}

fn derive_auth_hash(passphrase: &str, salt: &[u8; 32]) -> String {
	KeyRing::derive(passphrase, salt).unwrap().auth_proof_hex()
}

#[tokio::test]
async fn fresh_register_then_cross_device_pull() {
	let (base, _dir) = spawn_server().await;
	let http = reqwest::Client::new();
	let salt = [42u8; 32];
	let auth_hash = derive_auth_hash("correct horse battery staple", &salt);

	let register = http
		.post(format!("{}/auth/register", base))
		.json(&serde_json::json!({
			"authKeyHash": auth_hash,
			"salt": hex::encode(salt),
			"encryptedMasterKey": "opaque-blob",
		}))
		.send()
		.await
		.unwrap();
	assert_eq!(register.status(), 201);
	let register_body: serde_json::Value = register.json().await.unwrap();
	let token = register_body["token"].as_str().unwrap().to_string();
	let user_id = register_body["userId"].as_str().unwrap().to_string();

	let content = b"# skill\nalways verify invariants";
	let hash = hash_content(content);
	let upload = http
		.put(format!("{}/files/{}", base, "skills%2Frust.md"))
		.bearer_auth(&token)
		.header("x-content-hash", &hash)
		.header("x-version", "0")
		.body(content.to_vec())
		.send()
		.await
		.unwrap();
	assert_eq!(upload.status(), 200);

	// A second "device" logs in with the same passphrase and pulls the listing.
	let salt_lookup =
		http.get(format!("{}/auth/salt/{}", base, user_id)).send().await.unwrap();
	assert_eq!(salt_lookup.status(), 200);
	let salt_body: serde_json::Value = salt_lookup.json().await.unwrap();
	assert_eq!(salt_body["salt"].as_str().unwrap(), hex::encode(salt));

	let login = http
		.post(format!("{}/auth/login", base))
		.json(&serde_json::json!({ "authKeyHash": auth_hash }))
		.send()
		.await
		.unwrap();
	assert_eq!(login.status(), 200);
	let login_body: serde_json::Value = login.json().await.unwrap();
	let second_token = login_body["token"].as_str().unwrap().to_string();

	let list = http.get(format!("{}/files", base)).bearer_auth(&second_token).send().await.unwrap();
	assert_eq!(list.status(), 200);
	let list_body: serde_json::Value = list.json().await.unwrap();
	let files = list_body["files"].as_array().unwrap();
	assert_eq!(files.len(), 1);
	assert_eq!(files[0]["path"], "skills/rust.md");
	assert_eq!(files[0]["encryptedHash"], hash);
}

#[tokio::test]
async fn wrong_passphrase_login_is_rejected() {
	let (base, _dir) = spawn_server().await;
	let http = reqwest::Client::new();
	let salt = [7u8; 32];
	let auth_hash = derive_auth_hash("the-real-passphrase", &salt);

	http.post(format!("{}/auth/register", base))
		.json(&serde_json::json!({ "authKeyHash": auth_hash, "salt": hex::encode(salt), "encryptedMasterKey": "x" }))
		.send()
		.await
		.unwrap();

	let wrong_hash = derive_auth_hash("a-guess", &salt);
	let login = http
		.post(format!("{}/auth/login", base))
		.json(&serde_json::json!({ "authKeyHash": wrong_hash }))
		.send()
		.await
		.unwrap();
	assert_eq!(login.status(), 401);
}

#[tokio::test]
async fn concurrent_edits_produce_one_winner_and_one_conflict() {
	let (base, _dir) = spawn_server().await;
	let http = reqwest::Client::new();
	let salt = [3u8; 32];
	let auth_hash = derive_auth_hash("passphrase", &salt);
	let register = http
		.post(format!("{}/auth/register", base))
		.json(&serde_json::json!({ "authKeyHash": auth_hash, "salt": hex::encode(salt), "encryptedMasterKey": "x" }))
		.send()
		.await
		.unwrap();
	let token = register.json::<serde_json::Value>().await.unwrap()["token"].as_str().unwrap().to_string();

	let content = b"version one";
	let hash = hash_content(content);
	let first = http
		.put(format!("{}/files/{}", base, "rules%2Fstyle.md"))
		.bearer_auth(&token)
		.header("x-content-hash", &hash)
		.header("x-version", "0")
		.body(content.to_vec())
		.send()
		.await
		.unwrap();
	assert_eq!(first.status(), 200);

	// Both "devices" think the file is still at version 0.
	let content_a = b"device a edit";
	let hash_a = hash_content(content_a);
	let device_a = http
		.put(format!("{}/files/{}", base, "rules%2Fstyle.md"))
		.bearer_auth(&token)
		.header("x-content-hash", &hash_a)
		.header("x-version", "0")
		.body(content_a.to_vec())
		.send()
		.await
		.unwrap();
	assert_eq!(device_a.status(), 409);
	let conflict_body: serde_json::Value = device_a.json().await.unwrap();
	assert_eq!(conflict_body["current_version"], 1);
	assert_eq!(conflict_body["expected_version"], 0);
}

#[tokio::test]
async fn scoped_api_key_restricted_to_skills_is_rejected_elsewhere() {
	let (base, _dir) = spawn_server().await;
	let http = reqwest::Client::new();
	let salt = [9u8; 32];
	let auth_hash = derive_auth_hash("passphrase", &salt);
	let register = http
		.post(format!("{}/auth/register", base))
		.json(&serde_json::json!({ "authKeyHash": auth_hash, "salt": hex::encode(salt), "encryptedMasterKey": "x" }))
		.send()
		.await
		.unwrap();
	let token = register.json::<serde_json::Value>().await.unwrap()["token"].as_str().unwrap().to_string();

	let create_key = http
		.post(format!("{}/keys", base))
		.bearer_auth(&token)
		.json(&serde_json::json!({ "name": "ci", "scope": "skills/*", "permissions": "read" }))
		.send()
		.await
		.unwrap();
	assert_eq!(create_key.status(), 201);
	let key_body: serde_json::Value = create_key.json().await.unwrap();
	let api_key = key_body["key"].as_str().unwrap().to_string();
	assert!(api_key.starts_with("cmk_"));

	let content = b"secret memory";
	let hash = hash_content(content);
	http.put(format!("{}/files/{}", base, "memories%2Ftoday.md"))
		.bearer_auth(&token)
		.header("x-content-hash", &hash)
		.header("x-version", "0")
		.body(content.to_vec())
		.send()
		.await
		.unwrap();

	let forbidden = http
		.get(format!("{}/files/{}", base, "memories%2Ftoday.md"))
		.bearer_auth(&api_key)
		.send()
		.await
		.unwrap();
	assert_eq!(forbidden.status(), 403);
}
