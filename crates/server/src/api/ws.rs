//! WebSocket push channel for conversion progress.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};
use vidconv_core::{ConversionResult, ProgressEvent};

use crate::metrics::{WS_CONNECTIONS_ACTIVE, WS_CONNECTIONS_TOTAL, WS_LAG_EVENTS, WS_MESSAGES_SENT};
use crate::state::AppState;

/// WebSocket message sent to clients.
///
/// Every message carries the `conversionId` it belongs to, so clients
/// running several conversions can tell their events apart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WsMessage {
    /// One progress line was parsed from the transcode tool.
    #[serde(rename_all = "camelCase")]
    ConversionProgress {
        conversion_id: String,
        current_time: f64,
        total_duration: f64,
        /// 0.0 - 100.0; absent when the duration is zero.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        percent: Option<f32>,
    },
    /// A conversion produced its result.
    #[serde(rename_all = "camelCase")]
    ConversionFinished {
        conversion_id: String,
        success: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
}

impl WsMessage {
    /// Label used for the messages-sent metric.
    pub fn kind(&self) -> &'static str {
        match self {
            WsMessage::ConversionProgress { .. } => "conversion_progress",
            WsMessage::ConversionFinished { .. } => "conversion_finished",
        }
    }
}

/// Broadcaster for WebSocket messages using tokio broadcast channel.
#[derive(Debug, Clone)]
pub struct WsBroadcaster {
    sender: broadcast::Sender<WsMessage>,
}

impl WsBroadcaster {
    /// Create a new broadcaster with the given channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Broadcast a message to all connected clients.
    pub fn broadcast(&self, msg: WsMessage) {
        // No subscribers is not an error
        let _ = self.sender.send(msg);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<WsMessage> {
        self.sender.subscribe()
    }

    /// Number of live subscriptions, one per connected client.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    pub fn conversion_progress(&self, conversion_id: &str, event: &ProgressEvent) {
        self.broadcast(WsMessage::ConversionProgress {
            conversion_id: conversion_id.to_string(),
            current_time: event.current_time,
            total_duration: event.total_duration,
            percent: event.percent(),
        });
    }

    pub fn conversion_finished(&self, conversion_id: &str, result: &ConversionResult) {
        self.broadcast(WsMessage::ConversionFinished {
            conversion_id: conversion_id.to_string(),
            success: result.success,
            message: result.message.clone(),
        });
    }
}

impl Default for WsBroadcaster {
    fn default() -> Self {
        Self::new(256)
    }
}

/// WebSocket upgrade handler.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

/// Handle a single WebSocket connection.
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();
    let mut rx = state.ws_broadcaster().subscribe();

    WS_CONNECTIONS_TOTAL.inc();
    WS_CONNECTIONS_ACTIVE.inc();
    info!(
        subscribers = state.ws_broadcaster().subscriber_count(),
        "WebSocket client connected"
    );

    let send_task = tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(msg) => {
                    WS_MESSAGES_SENT.with_label_values(&[msg.kind()]).inc();

                    match serde_json::to_string(&msg) {
                        Ok(json) => {
                            if sender.send(Message::Text(json.into())).await.is_err() {
                                debug!("WebSocket send failed, client disconnected");
                                break;
                            }
                        }
                        Err(e) => {
                            error!("Failed to serialize WsMessage: {}", e);
                        }
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    // Progress is best effort; the finished message still follows
                    warn!("WebSocket client lagged, skipped {} messages", n);
                    WS_LAG_EVENTS.inc();
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("Broadcast channel closed");
                    break;
                }
            }
        }
    });

    // Clients only ever close; anything else they send is ignored
    while let Some(result) = receiver.next().await {
        match result {
            Ok(Message::Close(_)) => {
                debug!("WebSocket client requested close");
                break;
            }
            Ok(Message::Text(text)) => {
                debug!("Ignoring client text message: {}", text);
            }
            Ok(_) => {}
            Err(e) => {
                warn!("WebSocket receive error: {}", e);
                break;
            }
        }
    }

    send_task.abort();
    WS_CONNECTIONS_ACTIVE.dec();
    info!("WebSocket client disconnected");
}
