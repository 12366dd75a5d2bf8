//! Dashboard WebSocket endpoint
//!
//! Each connection gets its own hub subscription, registered by the
//! coordinator with the current state queued first. A forward task drains
//! the subscription into the socket; the receive loop turns client JSON into
//! coordinator commands and acknowledges them to this client only.

use crate::app::AppState;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use emg_core::EmgResult;
use emg_stream::{DashboardCommand, DashboardMessage};
use futures_util::{SinkExt, StreamExt};
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_dashboard(socket, state))
}

async fn handle_dashboard(socket: WebSocket, state: AppState) {
    let subscription = match state.ingest.subscribe().await {
        Ok(subscription) => subscription,
        Err(e) => {
            warn!("Ingest coordinator unavailable, closing dashboard: {}", e);
            return;
        }
    };
    let id = subscription.id();
    info!(subscriber = %id, "Dashboard connected");

    let (mut sender, mut receiver) = socket.split();

    // Owns the subscription; aborting it unregisters the subscriber
    let forward_task = tokio::spawn(async move {
        loop {
            let message = subscription.recv().await;

            let dropped = subscription.take_dropped();
            if dropped > 0 {
                warn!(subscriber = %subscription.id(), dropped, "Dashboard lagging, messages dropped");
                let notice = DashboardMessage::MessagesDropped { count: dropped };
                if let Ok(json) = notice.to_json() {
                    if sender.send(Message::Text(json)).await.is_err() {
                        break;
                    }
                }
            }

            match message.to_json() {
                Ok(json) => {
                    if sender.send(Message::Text(json)).await.is_err() {
                        break;
                    }
                }
                Err(e) => warn!("Failed to encode dashboard message: {}", e),
            }
        }
    });

    while let Some(Ok(message)) = receiver.next().await {
        match message {
            Message::Text(text) => {
                if let Err(e) = handle_client_message(&state, id, &text).await {
                    debug!(subscriber = %id, "Reply not delivered: {}", e);
                }
            }
            Message::Binary(_) => debug!("Ignoring binary dashboard message"),
            Message::Ping(_) | Message::Pong(_) => trace!("Dashboard keep-alive"),
            Message::Close(_) => break,
        }
    }

    forward_task.abort();
    info!(subscriber = %id, "Dashboard disconnected");
}

/// Handle one client command and answer the sender
pub async fn handle_client_message(state: &AppState, id: Uuid, text: &str) -> EmgResult<()> {
    let hub = state.ingest.hub();

    let command = match DashboardCommand::from_json(text) {
        Ok(command) => command,
        Err(e) => {
            warn!(subscriber = %id, "Invalid dashboard command: {}", e);
            return hub.send_to(id, DashboardMessage::error(format!("Invalid command: {}", e)));
        }
    };

    match command {
        DashboardCommand::FilterSettings(requested) => {
            let result = state.ingest.update_filter(requested).await;
            let current = match &result {
                Ok(applied) => *applied,
                Err(_) => state.ingest.status().await.map(|s| s.filter).unwrap_or(requested),
            };
            hub.send_to(id, DashboardMessage::filter_ack(&result, current))
        }
        DashboardCommand::Calibrate => {
            let result = state.ingest.calibrate().await;
            hub.send_to(id, DashboardMessage::calibration_ack(&result))
        }
        DashboardCommand::GetStatus => match state.ingest.status().await {
            Ok(status) => hub.send_to(id, DashboardMessage::Status(status)),
            Err(e) => hub.send_to(id, DashboardMessage::error(e.to_string())),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use emg_processing::{FilterConfig, ProcessingConfig};
    use emg_stream::{start_ingest, StreamConfig, Subscription};

    fn state() -> AppState {
        AppState::new(start_ingest(&ProcessingConfig::default(), StreamConfig::default()).unwrap())
    }

    fn drain(sub: &Subscription) -> Vec<DashboardMessage> {
        std::iter::from_fn(|| sub.try_recv()).map(|m| (*m).clone()).collect()
    }

    #[tokio::test]
    async fn test_filter_command_acked_to_sender_and_announced() {
        let state = state();
        let sender = state.ingest.hub().subscribe();
        let observer = state.ingest.hub().subscribe();

        let json = r#"{"type":"filter_settings","notch_enabled":true,"low_pass_cutoff":350,"high_pass_cutoff":25}"#;
        handle_client_message(&state, sender.id(), json).await.unwrap();

        let applied = FilterConfig {
            notch_enabled: true,
            low_pass_cutoff: 350.0,
            high_pass_cutoff: 25.0,
        };
        let to_sender = drain(&sender);
        assert_eq!(to_sender[0], DashboardMessage::FilterSettings(applied));
        assert!(matches!(
            to_sender[1],
            DashboardMessage::FilterSettingsAck { applied: true, .. }
        ));
        assert_eq!(drain(&observer), vec![DashboardMessage::FilterSettings(applied)]);
    }

    #[tokio::test]
    async fn test_rejected_filter_command_reports_current_settings() {
        let state = state();
        let sender = state.ingest.hub().subscribe();
        let observer = state.ingest.hub().subscribe();

        let json = r#"{"type":"filter_settings","notch_enabled":true,"low_pass_cutoff":10,"high_pass_cutoff":25}"#;
        handle_client_message(&state, sender.id(), json).await.unwrap();

        match &drain(&sender)[..] {
            [DashboardMessage::FilterSettingsAck { applied, settings, error }] => {
                assert!(!applied);
                assert_eq!(*settings, FilterConfig::default());
                assert!(error.is_some());
            }
            other => panic!("unexpected replies {other:?}"),
        }
        assert!(drain(&observer).is_empty());
    }

    #[tokio::test]
    async fn test_calibrate_without_orientation() {
        let state = state();
        let sender = state.ingest.hub().subscribe();

        handle_client_message(&state, sender.id(), r#"{"type":"calibrate"}"#).await.unwrap();
        assert!(matches!(
            drain(&sender).as_slice(),
            [DashboardMessage::CalibrationAck { calibrated: false, .. }]
        ));
    }

    #[tokio::test]
    async fn test_invalid_json_answers_with_error() {
        let state = state();
        let sender = state.ingest.hub().subscribe();

        handle_client_message(&state, sender.id(), "{not json").await.unwrap();
        assert!(matches!(drain(&sender).as_slice(), [DashboardMessage::Error { .. }]));
    }

    #[tokio::test]
    async fn test_get_status_and_initial_state() {
        let state = state();
        let sender = state.ingest.subscribe().await.unwrap();

        handle_client_message(&state, sender.id(), r#"{"type":"get_status"}"#).await.unwrap();

        let replies = drain(&sender);
        assert_eq!(replies.len(), 4);
        assert!(matches!(replies[0], DashboardMessage::DeviceStatus { .. }));
        assert!(matches!(replies[1], DashboardMessage::MpuStatus { available: false }));
        assert_eq!(replies[2], DashboardMessage::FilterSettings(FilterConfig::default()));
        match &replies[3] {
            DashboardMessage::Status(status) => assert_eq!(status.subscribers, 1),
            other => panic!("unexpected reply {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_reply_to_departed_subscriber_fails() {
        let state = state();
        let gone = state.ingest.hub().subscribe();
        let id = gone.id();
        drop(gone);

        assert!(handle_client_message(&state, id, r#"{"type":"get_status"}"#).await.is_err());
    }
}
