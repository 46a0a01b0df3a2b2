//! Change-subscription upgrade route:
//! `GET /ws?token=<bearer>`. Unauthenticated upgrades are rejected by
//! closing the transport without ever completing a handshake.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use serde::Deserialize;

use crate::logging::*;
use crate::server::routes::auth::resolve_session_or_key;
use crate::server::AppState;

#[derive(Debug, Deserialize)]
struct WsQuery {
	token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
enum ClientMessage {
	#[serde(rename = "register-device")]
	RegisterDevice {
		#[serde(rename = "deviceId")]
		device_id: String,
	},
}

async fn ws_upgrade(State(state): State<AppState>, Query(query): Query<WsQuery>, ws: WebSocketUpgrade) -> Response {
	let Some(token) = query.token else {
		return axum::http::StatusCode::UNAUTHORIZED.into_response();
	};
	let Some(user_id) = resolve_session_or_key(&state, &token).await else {
		return axum::http::StatusCode::UNAUTHORIZED.into_response();
	};
	ws.on_upgrade(move |socket| handle_socket(socket, state, user_id))
}

async fn handle_socket(mut socket: WebSocket, state: AppState, user_id: String) {
	let (handle, mut rx) = state.notify.register(&user_id, None);

	loop {
		tokio::select! {
			incoming = socket.recv() => {
				match incoming {
					Some(Ok(Message::Text(text))) => {
						if let Ok(ClientMessage::RegisterDevice { device_id }) = serde_json::from_str(&text) {
							state.notify.set_device_id(&user_id, handle, device_id);
						}
					}
					Some(Ok(Message::Ping(payload))) => {
						if socket.send(Message::Pong(payload)).await.is_err() {
							break;
						}
					}
					Some(Ok(Message::Close(_))) | None => break,
					Some(Err(e)) => {
						warn!(error = %e, "ws read error");
						break;
					}
					_ => {}
				}
			}
			event = rx.recv() => {
				match event {
					Some(event) => {
						let Ok(json) = serde_json::to_string(&event) else { continue };
						if socket.send(Message::Text(json)).await.is_err() {
							break;
						}
					}
					None => break,
				}
			}
		}
	}

	state.notify.unregister(&user_id, handle);
}

pub fn router() -> Router<AppState> {
	Router::new().route("/ws", get(ws_upgrade))
}

// vim: ts=4
