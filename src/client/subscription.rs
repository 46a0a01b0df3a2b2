//! Change subscription: a full-duplex text-frame channel delivering
//! `file-updated`/`file-deleted` notifications with heartbeat and
//! exponential-backoff reconnect.

use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio_tungstenite::tungstenite::Message;

use crate::logging::*;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
const RECONNECT_INITIAL: Duration = Duration::from_secs(1);
const RECONNECT_MAX: Duration = Duration::from_secs(30);

/// Server-pushed notification types consumed by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ChangeEvent {
	#[serde(rename = "file-updated")]
	FileUpdated { path: String, version: u64 },
	#[serde(rename = "file-deleted")]
	FileDeleted { path: String },
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename = "register-device")]
struct RegisterDevice<'a> {
	#[serde(rename = "deviceId")]
	device_id: &'a str,
}

/// Handle to a running change subscription. Dropping or calling
/// `disconnect()` cancels any in-flight reconnect loop.
pub struct ChangeSubscription {
	disconnect_tx: Mutex<Option<mpsc::Sender<()>>>,
}

impl ChangeSubscription {
	/// Connect to `ws_url` (already carrying `?token=<bearer>`) and start
	/// delivering parsed `ChangeEvent`s on the returned channel. Reconnects
	/// automatically on any close with exponential backoff (1s, doubling,
	/// capped at 30s) until `disconnect()` is called.
	pub fn connect(
		ws_url: String,
		device_id: Option<String>,
	) -> (Self, mpsc::UnboundedReceiver<ChangeEvent>) {
		let (event_tx, event_rx) = mpsc::unbounded_channel();
		let (disconnect_tx, mut disconnect_rx) = mpsc::channel::<()>(1);

		tokio::spawn(async move {
			let mut backoff = RECONNECT_INITIAL;
			loop {
				tokio::select! {
					_ = disconnect_rx.recv() => {
						info!("change subscription disconnected by caller");
						return;
					}
					result = run_connection(&ws_url, device_id.as_deref(), &event_tx, &mut disconnect_rx) => {
						match result {
							ConnectionOutcome::Disconnected => return,
							ConnectionOutcome::Closed => {
								warn!(backoff_secs = backoff.as_secs(), "change subscription closed, reconnecting");
								tokio::time::sleep(backoff).await;
								backoff = (backoff * 2).min(RECONNECT_MAX);
							}
						}
					}
				}
			}
		});

		(ChangeSubscription { disconnect_tx: Mutex::new(Some(disconnect_tx)) }, event_rx)
	}

	/// Cancel any in-flight reconnect loop and close the current connection.
	pub async fn disconnect(&self) {
		if let Some(tx) = self.disconnect_tx.lock().await.take() {
			let _ = tx.send(()).await;
		}
	}
}

enum ConnectionOutcome {
	Disconnected,
	Closed,
}

async fn run_connection(
	ws_url: &str,
	device_id: Option<&str>,
	event_tx: &mpsc::UnboundedSender<ChangeEvent>,
	disconnect_rx: &mut mpsc::Receiver<()>,
) -> ConnectionOutcome {
	let stream = match tokio_tungstenite::connect_async(ws_url).await {
		Ok((stream, _response)) => stream,
		Err(e) => {
			warn!(error = %e, "failed to connect change subscription");
			return ConnectionOutcome::Closed;
		}
	};
	let (mut write, mut read) = stream.split();

	if let Some(device_id) = device_id {
		let payload = RegisterDevice { device_id };
		if let Ok(json) = serde_json::to_string(&payload) {
			let _ = write.send(Message::Text(json)).await;
		}
	}

	let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
	heartbeat.tick().await; // first tick fires immediately

	loop {
		tokio::select! {
			_ = disconnect_rx.recv() => {
				let _ = write.send(Message::Close(None)).await;
				return ConnectionOutcome::Disconnected;
			}
			_ = heartbeat.tick() => {
				if write.send(Message::Ping(Vec::new())).await.is_err() {
					return ConnectionOutcome::Closed;
				}
			}
			msg = read.next() => {
				match msg {
					Some(Ok(Message::Text(text))) => {
						if let Ok(event) = serde_json::from_str::<ChangeEvent>(&text) {
							if event_tx.send(event).is_err() {
								return ConnectionOutcome::Disconnected;
							}
						}
					}
					Some(Ok(Message::Pong(_))) => {}
					Some(Ok(Message::Close(_))) | None => return ConnectionOutcome::Closed,
					Some(Err(e)) => {
						warn!(error = %e, "change subscription read error");
						return ConnectionOutcome::Closed;
					}
					_ => {}
				}
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn file_updated_parses_from_json() {
		let json = r#"{"type":"file-updated","path":"a.md","version":3}"#;
		let event: ChangeEvent = serde_json::from_str(json).unwrap();
		assert_eq!(event, ChangeEvent::FileUpdated { path: "a.md".to_string(), version: 3 });
	}

	#[test]
	fn file_deleted_parses_from_json() {
		let json = r#"{"type":"file-deleted","path":"a.md"}"#;
		let event: ChangeEvent = serde_json::from_str(json).unwrap();
		assert_eq!(event, ChangeEvent::FileDeleted { path: "a.md".to_string() });
	}
}

// vim: ts=4
