//! Telephony media-stream WebSocket endpoint.

use crate::bridge::CallBridge;
use crate::AppState;
use axum::{
    extract::{
        ws::{Message as AxumMessage, WebSocket},
        Extension, WebSocketUpgrade,
    },
    response::IntoResponse,
};
use callrelay_voice::{Frame, WsChannel, DEFAULT_CHANNEL_CAPACITY};
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Handler for `GET /media-stream`.
pub async fn media_stream_handler(
    Extension(state): Extension<Arc<AppState>>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    tracing::debug!("telephony media stream connected");

    let channel = adapt_socket(socket);
    let bridge = CallBridge::new(state.bridge.clone());

    match bridge.run(channel).await {
        Ok(report) => tracing::info!(
            call_sid = %report.call_id,
            reason = ?report.reason,
            abandoned = report.abandoned.len(),
            dropped_audio = report.dropped_audio,
            "media stream finished"
        ),
        Err(e) => tracing::warn!("media stream rejected: {}", e),
    }
}

/// Wraps an accepted socket in a [`WsChannel`].
///
/// The send task drains the outbound queue and closes the socket once the
/// bridge drops its sender. The receive task forwards data frames until the
/// peer disconnects or the bridge stops reading.
fn adapt_socket(socket: WebSocket) -> WsChannel {
    let (mut sender, mut receiver) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::channel::<Frame>(DEFAULT_CHANNEL_CAPACITY);
    let (inbound_tx, inbound_rx) = mpsc::channel::<Frame>(DEFAULT_CHANNEL_CAPACITY);

    tokio::spawn(async move {
        while let Some(frame) = outbound_rx.recv().await {
            let message = match frame {
                Frame::Text(text) => AxumMessage::Text(text.into()),
                Frame::Binary(bytes) => AxumMessage::Binary(bytes.into()),
            };
            if sender.send(message).await.is_err() {
                break;
            }
        }
        if let Err(e) = sender.close().await {
            tracing::debug!("telephony socket close failed: {}", e);
        }
    });

    tokio::spawn(async move {
        while let Some(Ok(message)) = receiver.next().await {
            let frame = match message {
                AxumMessage::Text(text) => Frame::Text(text.as_str().to_owned()),
                AxumMessage::Binary(bytes) => Frame::Binary(bytes.to_vec()),
                AxumMessage::Close(_) => break,
                _ => continue,
            };
            if inbound_tx.send(frame).await.is_err() {
                break;
            }
        }
    });

    WsChannel::new(outbound_tx, inbound_rx)
}
