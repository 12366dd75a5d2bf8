//! Sensing device WebSocket endpoint
//!
//! The device sends one text message per line, or several lines joined by
//! `\n`. Only one device may be attached; a second one is refused with 409.

use crate::app::AppState;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        ConnectInfo, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use emg_stream::DeviceSession;
use std::net::SocketAddr;
use tracing::{debug, info, warn};

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    State(state): State<AppState>,
) -> Response {
    match state.ingest.try_claim_device() {
        Some(session) => ws.on_upgrade(move |socket| handle_device(socket, session, peer)),
        None => {
            warn!(%peer, "Refusing device connection, another device is attached");
            (StatusCode::CONFLICT, "Another sensing device is already connected").into_response()
        }
    }
}

async fn handle_device(mut socket: WebSocket, mut session: DeviceSession, peer: SocketAddr) {
    if session.connect(peer.to_string()).await.is_err() {
        warn!(%peer, "Ingest coordinator unavailable, dropping device");
        return;
    }
    info!(%peer, "Sensing device connected");

    while let Some(message) = socket.recv().await {
        let text = match message {
            Ok(Message::Text(text)) => text,
            Ok(Message::Binary(bytes)) => match String::from_utf8(bytes) {
                Ok(text) => text,
                Err(_) => {
                    debug!(%peer, "Ignoring non-UTF-8 binary frame");
                    continue;
                }
            },
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                warn!(%peer, "Device socket error: {}", e);
                break;
            }
        };

        if session.send_message(text).await.is_err() {
            warn!(%peer, "Ingest coordinator stopped, closing device connection");
            break;
        }
    }

    session.close().await;
    info!(%peer, "Sensing device disconnected");
}
