//! Command-line entry points: `serve`, `client
//! login`/`sync`, `keys create/list/revoke`, `adapter
//! import/link/verify/unlink/sync-back`.

use std::path::PathBuf;
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use clap::{Args, Parser, Subcommand};
use serde::{Deserialize, Serialize};

use contextmate::adapter::agent_a::AgentAAdapter;
use contextmate::adapter::agent_b::AgentBAdapter;
use contextmate::adapter::extra_paths::ExtraPathsManager;
use contextmate::adapter::mirror::MirrorAdapter;
use contextmate::adapter::{Adapter, AdapterRegistry};
use contextmate::client::{ApiClient, AuthMode, ChangeSubscription};
use contextmate::config::{ClientConfig, ServerConfig};
use contextmate::crypto::KeyRing;
use contextmate::engine::SyncEngine;
use contextmate::error::ContextMateError;
use contextmate::logging::*;

#[derive(Parser, Debug)]
#[command(name = "contextmate", about = "Zero-knowledge sync for AI-agent context vaults")]
pub struct Cli {
	#[command(subcommand)]
	pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
	/// Run the sync server.
	Serve {
		#[arg(long)]
		data_dir: Option<PathBuf>,
		#[arg(long)]
		port: Option<u16>,
	},
	/// Client-side commands: authenticate and run the sync engine.
	Client(ClientArgs),
	/// API key management.
	Keys(KeysArgs),
	/// Adapter (symlink reconciliation) lifecycle commands.
	Adapter(AdapterArgs),
}

#[derive(Args, Debug)]
pub struct ClientArgs {
	#[command(subcommand)]
	pub command: ClientCommand,
}

#[derive(Subcommand, Debug)]
pub enum ClientCommand {
	/// Register a new account on `server_url` with a fresh salt.
	Register {
		#[arg(long)]
		server_url: String,
		#[arg(long)]
		passphrase: String,
		#[arg(long)]
		data_dir: Option<PathBuf>,
	},
	/// Log in with an existing passphrase, fetching the stored salt first.
	Login {
		#[arg(long)]
		server_url: String,
		#[arg(long)]
		user_id: String,
		#[arg(long)]
		passphrase: String,
		#[arg(long)]
		data_dir: Option<PathBuf>,
	},
	/// Run the sync engine against the previously stored session.
	Sync {
		#[arg(long)]
		vault_dir: Option<PathBuf>,
		#[arg(long)]
		data_dir: Option<PathBuf>,
	},
}

#[derive(Args, Debug)]
pub struct KeysArgs {
	#[command(subcommand)]
	pub command: KeysCommand,
}

#[derive(Subcommand, Debug)]
pub enum KeysCommand {
	Create {
		#[arg(long)]
		server_url: String,
		#[arg(long)]
		data_dir: Option<PathBuf>,
		#[arg(long)]
		name: String,
		#[arg(long)]
		scope: String,
		#[arg(long)]
		permissions: String,
	},
	List {
		#[arg(long)]
		server_url: String,
		#[arg(long)]
		data_dir: Option<PathBuf>,
	},
	Revoke {
		#[arg(long)]
		server_url: String,
		#[arg(long)]
		data_dir: Option<PathBuf>,
		#[arg(long)]
		id: String,
	},
}

#[derive(Args, Debug)]
pub struct AdapterArgs {
	#[command(subcommand)]
	pub command: AdapterCommand,
}

#[derive(Subcommand, Debug)]
pub enum AdapterCommand {
	Import { #[arg(long)] name: String, #[arg(long)] external_root: PathBuf, #[arg(long)] vault_dir: PathBuf },
	Link { #[arg(long)] name: String, #[arg(long)] external_root: PathBuf, #[arg(long)] vault_dir: PathBuf },
	Verify { #[arg(long)] name: String, #[arg(long)] external_root: PathBuf, #[arg(long)] vault_dir: PathBuf },
	Unlink { #[arg(long)] name: String, #[arg(long)] external_root: PathBuf, #[arg(long)] vault_dir: PathBuf },
	SyncBack { #[arg(long)] name: String, #[arg(long)] external_root: PathBuf, #[arg(long)] vault_dir: PathBuf },
}

/// The two on-disk credential files,
/// each written with `0600` permissions.
#[derive(Debug, Serialize, Deserialize)]
struct VaultSecrets {
	salt: String,
	encrypted_master_key: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct Session {
	auth_hash: String,
	user_id: String,
	token: String,
	device_id: Option<String>,
}

fn write_credential_file<T: Serialize>(path: &PathBuf, value: &T) -> Result<(), ContextMateError> {
	let json = serde_json::to_vec_pretty(value)?;
	std::fs::write(path, &json)?;
	#[cfg(unix)]
	{
		use std::os::unix::fs::PermissionsExt;
		std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
	}
	Ok(())
}

fn read_credential_file<T: for<'de> Deserialize<'de>>(path: &PathBuf) -> Result<T, ContextMateError> {
	let bytes = std::fs::read(path)?;
	Ok(serde_json::from_slice(&bytes)?)
}

fn default_data_dir(data_dir: Option<PathBuf>) -> PathBuf {
	data_dir.unwrap_or_else(|| PathBuf::from("./.contextmate"))
}

pub async fn run(cli: Cli) -> Result<(), ContextMateError> {
	match cli.command {
		Command::Serve { data_dir, port } => run_serve(data_dir, port).await,
		Command::Client(args) => run_client(args).await,
		Command::Keys(args) => run_keys(args).await,
		Command::Adapter(args) => run_adapter(args),
	}
}

async fn run_serve(data_dir: Option<PathBuf>, port: Option<u16>) -> Result<(), ContextMateError> {
	let mut config = ServerConfig::default();
	if let Some(dir) = data_dir {
		config.data_dir = dir;
	}
	if let Some(port) = port {
		config.port = port;
	}
	config.token_signing_secret = std::env::var("CONTEXTMATE_SIGNING_SECRET").map_err(|_| {
		ContextMateError::Internal {
			message: "CONTEXTMATE_SIGNING_SECRET must be set to run the server".to_string(),
		}
	})?;
	contextmate::server::serve(config).await
}

async fn run_client(args: ClientArgs) -> Result<(), ContextMateError> {
	match args.command {
		ClientCommand::Register { server_url, passphrase, data_dir } => {
			let data_dir = default_data_dir(data_dir);
			std::fs::create_dir_all(&data_dir)?;
			let mut salt = [0u8; contextmate::crypto::keys::SALT_LEN];
			rand::RngCore::fill_bytes(&mut rand::thread_rng(), &mut salt);
			let ring = KeyRing::derive(&passphrase, &salt)?;
			let vault_key = *ring.vault_key();
			let encrypted_master_key = contextmate::crypto::encrypt_envelope(&vault_key, ring.vault_key())?;
			let http = reqwest::Client::new();
			let body = serde_json::json!({
				"authKeyHash": ring.auth_proof_hex(),
				"salt": BASE64.encode(salt),
				"encryptedMasterKey": BASE64.encode(encrypted_master_key.to_bytes()),
			});
			let response = http
				.post(format!("{}/auth/register", server_url))
				.json(&body)
				.send()
				.await
				.map_err(|e| ContextMateError::NetworkUnreachable { message: e.to_string() })?;
			if !response.status().is_success() {
				return Err(ContextMateError::AuthRejected {
					message: format!("register failed: {}", response.status()),
				});
			}
			let parsed: serde_json::Value =
				response.json().await.map_err(|e| ContextMateError::Internal { message: e.to_string() })?;
			let user_id = parsed["userId"].as_str().unwrap_or_default().to_string();
			let token = parsed["token"].as_str().unwrap_or_default().to_string();
			write_credential_file(
				&data_dir.join("vault_secrets.json"),
				&VaultSecrets {
					salt: BASE64.encode(salt),
					encrypted_master_key: BASE64.encode(encrypted_master_key.to_bytes()),
				},
			)?;
			write_credential_file(
				&data_dir.join("session.json"),
				&Session { auth_hash: ring.auth_proof_hex(), user_id: user_id.clone(), token, device_id: None },
			)?;
			info!(user_id, "registered and saved credentials");
			Ok(())
		}
		ClientCommand::Login { server_url, user_id, passphrase, data_dir } => {
			let data_dir = default_data_dir(data_dir);
			std::fs::create_dir_all(&data_dir)?;
			let http = reqwest::Client::new();
			let salt_response = http
				.get(format!("{}/auth/salt/{}", server_url, user_id))
				.send()
				.await
				.map_err(|e| ContextMateError::NetworkUnreachable { message: e.to_string() })?;
			if !salt_response.status().is_success() {
				return Err(ContextMateError::AuthRejected { message: "unknown user or rate limited".to_string() });
			}
			let salt_body: serde_json::Value =
				salt_response.json().await.map_err(|e| ContextMateError::Internal { message: e.to_string() })?;
			let salt_b64 = salt_body["salt"].as_str().unwrap_or_default();
			let salt_bytes = BASE64
				.decode(salt_b64)
				.map_err(|e| ContextMateError::Internal { message: format!("bad salt: {}", e) })?;
			let mut salt = [0u8; contextmate::crypto::keys::SALT_LEN];
			if salt_bytes.len() == salt.len() {
				salt.copy_from_slice(&salt_bytes);
			}
			let ring = KeyRing::derive(&passphrase, &salt)?;
			let login_response = http
				.post(format!("{}/auth/login", server_url))
				.json(&serde_json::json!({ "authKeyHash": ring.auth_proof_hex() }))
				.send()
				.await
				.map_err(|e| ContextMateError::NetworkUnreachable { message: e.to_string() })?;
			if !login_response.status().is_success() {
				return Err(ContextMateError::AuthRejected { message: "wrong passphrase".to_string() });
			}
			let parsed: serde_json::Value =
				login_response.json().await.map_err(|e| ContextMateError::Internal { message: e.to_string() })?;
			let token = parsed["token"].as_str().unwrap_or_default().to_string();
			write_credential_file(
				&data_dir.join("vault_secrets.json"),
				&VaultSecrets { salt: salt_b64.to_string(), encrypted_master_key: String::new() },
			)?;
			write_credential_file(
				&data_dir.join("session.json"),
				&Session { auth_hash: ring.auth_proof_hex(), user_id, token, device_id: None },
			)?;
			info!("login succeeded and credentials saved");
			Ok(())
		}
		ClientCommand::Sync { vault_dir, data_dir } => run_sync(vault_dir, data_dir).await,
	}
}

async fn run_sync(vault_dir: Option<PathBuf>, data_dir: Option<PathBuf>) -> Result<(), ContextMateError> {
	let data_dir = default_data_dir(data_dir);
	let secrets: VaultSecrets = read_credential_file(&data_dir.join("vault_secrets.json"))?;
	let session: Session = read_credential_file(&data_dir.join("session.json"))?;

	let passphrase = std::env::var("CONTEXTMATE_PASSPHRASE").map_err(|_| ContextMateError::Internal {
		message: "CONTEXTMATE_PASSPHRASE must be set to unlock the vault".to_string(),
	})?;
	let salt_bytes = BASE64
		.decode(&secrets.salt)
		.map_err(|e| ContextMateError::Internal { message: format!("bad stored salt: {}", e) })?;
	let mut salt = [0u8; contextmate::crypto::keys::SALT_LEN];
	if salt_bytes.len() == salt.len() {
		salt.copy_from_slice(&salt_bytes);
	}
	let keyring = KeyRing::derive(&passphrase, &salt)?;

	let mut config = ClientConfig::default();
	if let Some(dir) = vault_dir {
		config.vault_dir = dir;
	}
	config.data_dir = data_dir;
	let server_url = config.server_url.clone();

	let transport =
		Arc::new(ApiClient::new(server_url.clone(), AuthMode::Bearer(session.token.clone())));
	let extra_paths: Vec<ExtraPathsManager> = config
		.extra_path_globs
		.iter()
		.enumerate()
		.map(|(i, glob)| ExtraPathsManager::new(format!("extra{}", i), config.vault_dir.clone(), vec![glob.clone()]))
		.collect();

	let engine = Arc::new(SyncEngine::new(config, keyring, transport, extra_paths)?);

	let ws_url = format!("{}/ws?token={}", server_url.replacen("http", "ws", 1), session.token);
	let (subscription, change_rx) = ChangeSubscription::connect(ws_url, session.device_id.clone());

	let handle = engine.start(change_rx).await?;
	info!("sync engine running, press Ctrl+C to stop");
	let _ = tokio::signal::ctrl_c().await;
	subscription.disconnect().await;
	handle.stop().await;
	Ok(())
}

async fn run_keys(args: KeysArgs) -> Result<(), ContextMateError> {
	match args.command {
		KeysCommand::Create { server_url, data_dir, name, scope, permissions } => {
			let session: Session = read_credential_file(&default_data_dir(data_dir).join("session.json"))?;
			let http = reqwest::Client::new();
			let response = http
				.post(format!("{}/keys", server_url))
				.bearer_auth(&session.token)
				.json(&serde_json::json!({ "name": name, "scope": scope, "permissions": permissions }))
				.send()
				.await
				.map_err(|e| ContextMateError::NetworkUnreachable { message: e.to_string() })?;
			let body: serde_json::Value =
				response.json().await.map_err(|e| ContextMateError::Internal { message: e.to_string() })?;
			println!("{}", serde_json::to_string_pretty(&body).unwrap_or_default());
			Ok(())
		}
		KeysCommand::List { server_url, data_dir } => {
			let session: Session = read_credential_file(&default_data_dir(data_dir).join("session.json"))?;
			let http = reqwest::Client::new();
			let response = http
				.get(format!("{}/keys", server_url))
				.bearer_auth(&session.token)
				.send()
				.await
				.map_err(|e| ContextMateError::NetworkUnreachable { message: e.to_string() })?;
			let body: serde_json::Value =
				response.json().await.map_err(|e| ContextMateError::Internal { message: e.to_string() })?;
			println!("{}", serde_json::to_string_pretty(&body).unwrap_or_default());
			Ok(())
		}
		KeysCommand::Revoke { server_url, data_dir, id } => {
			let session: Session = read_credential_file(&default_data_dir(data_dir).join("session.json"))?;
			let http = reqwest::Client::new();
			let response = http
				.delete(format!("{}/keys/{}", server_url, id))
				.bearer_auth(&session.token)
				.send()
				.await
				.map_err(|e| ContextMateError::NetworkUnreachable { message: e.to_string() })?;
			if response.status().is_success() {
				info!(id, "key revoked");
				Ok(())
			} else {
				Err(ContextMateError::NotFound { what: format!("api key {}", id) })
			}
		}
	}
}

fn build_adapter(name: &str, external_root: PathBuf, vault_dir: &std::path::Path) -> Result<Box<dyn Adapter>, ContextMateError> {
	let backup_root = external_root.join(".contextmate-backup");
	match name {
		"agent_a" => Ok(Box::new(AgentAAdapter::new(external_root, backup_root, Vec::new(), Vec::new()))),
		"agent_b" => Ok(Box::new(AgentBAdapter::new(external_root, backup_root))),
		"mirror" => Ok(Box::new(MirrorAdapter::new(external_root, vault_dir, backup_root)?)),
		other => Err(ContextMateError::Internal { message: format!("unknown adapter {}", other) }),
	}
}

fn run_adapter(args: AdapterArgs) -> Result<(), ContextMateError> {
	let (name, external_root, vault_dir, op) = match args.command {
		AdapterCommand::Import { name, external_root, vault_dir } => (name, external_root, vault_dir, "import"),
		AdapterCommand::Link { name, external_root, vault_dir } => (name, external_root, vault_dir, "link"),
		AdapterCommand::Verify { name, external_root, vault_dir } => (name, external_root, vault_dir, "verify"),
		AdapterCommand::Unlink { name, external_root, vault_dir } => (name, external_root, vault_dir, "unlink"),
		AdapterCommand::SyncBack { name, external_root, vault_dir } => (name, external_root, vault_dir, "sync-back"),
	};
	let adapter = build_adapter(&name, external_root, &vault_dir)?;
	let mut registry = AdapterRegistry::new();
	registry.register(adapter);
	let adapter = registry.get(&name).ok_or_else(|| ContextMateError::Internal { message: format!("adapter {} not registered", name) })?;
	match op {
		"import" => {
			let report = adapter.import(&vault_dir)?;
			info!(imported = report.imported.len(), skipped = report.skipped.len(), "adapter import complete");
		}
		"link" => {
			let report = adapter.linkify(&vault_dir)?;
			info!(linked = report.linked.len(), already_linked = report.already_linked.len(), "adapter linkify complete");
		}
		"verify" => {
			let report = adapter.verify()?;
			info!(all_valid = report.all_valid(), "adapter verify complete");
		}
		"unlink" => {
			let report = adapter.unlinkify(&vault_dir)?;
			info!(restored = report.restored.len(), "adapter unlinkify complete");
		}
		"sync-back" => {
			let report = adapter.sync_back(&vault_dir)?;
			info!(synced = report.synced.len(), "adapter sync-back complete");
		}
		_ => unreachable!(),
	}
	Ok(())
}

// vim: ts=4
