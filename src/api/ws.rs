//! WebSocket Handler
//!
//! Handles WebSocket upgrade requests and adapts the upgraded socket to the
//! hub's [`MessageStream`] / [`MessageSink`] halves.

use async_trait::async_trait;
use axum::{
    extract::{
        ws::{Message as WsMessage, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures_util::{
    stream::{SplitSink, SplitStream},
    SinkExt, StreamExt,
};
use std::sync::Arc;
use tokio::sync::Mutex;

use super::state::AppState;
use crate::hub::{ChatHub, CloseSignal, ConnectionError, Message, MessageSink, MessageStream};

/// WebSocket upgrade handler
///
/// This is the entry point for chat connections. It upgrades the HTTP
/// connection and hands the socket to the hub.
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> Response {
    let hub = state.hub.clone();
    ws.on_upgrade(move |socket| handle_socket(socket, hub))
}

/// Handle an established WebSocket connection
async fn handle_socket(socket: WebSocket, hub: ChatHub) {
    let (sender, receiver) = socket.split();

    let sink: Arc<dyn MessageSink> = Arc::new(WsSink::new(sender));
    let end = hub.handle_connection(WsStream::new(receiver), sink).await;

    tracing::debug!(outcome = ?end, "WebSocket session finished");
}

/// Outbound half of a WebSocket
///
/// Writes are serialized through a mutex since the session and the
/// broadcaster both send on it.
pub struct WsSink {
    sender: Mutex<SplitSink<WebSocket, WsMessage>>,
    closed: CloseSignal,
}

impl WsSink {
    pub fn new(sender: SplitSink<WebSocket, WsMessage>) -> Self {
        Self {
            sender: Mutex::new(sender),
            closed: CloseSignal::new(),
        }
    }
}

#[async_trait]
impl MessageSink for WsSink {
    async fn send(&self, message: &Message) -> Result<(), ConnectionError> {
        if self.closed.is_fired() {
            return Err(ConnectionError::Closed);
        }

        let text = serde_json::to_string(message).map_err(ConnectionError::Encode)?;
        self.sender
            .lock()
            .await
            .send(WsMessage::Text(text))
            .await
            .map_err(|e| ConnectionError::Transport(e.to_string()))
    }

    async fn close(&self) {
        if !self.closed.fire() {
            return;
        }
        // Can stall behind a peer that stopped reading
        if let Err(e) = self.sender.lock().await.close().await {
            tracing::trace!(error = %e, "WebSocket close failed");
        }
    }

    async fn closed(&self) {
        self.closed.wait().await;
    }
}

/// Inbound half of a WebSocket
pub struct WsStream {
    receiver: SplitStream<WebSocket>,
}

impl WsStream {
    pub fn new(receiver: SplitStream<WebSocket>) -> Self {
        Self { receiver }
    }
}

#[async_trait]
impl MessageStream for WsStream {
    async fn recv(&mut self) -> Result<Message, ConnectionError> {
        loop {
            let frame = match self.receiver.next().await {
                Some(Ok(frame)) => frame,
                Some(Err(e)) => return Err(ConnectionError::Transport(e.to_string())),
                None => return Err(ConnectionError::Closed),
            };

            match frame {
                WsMessage::Text(text) => {
                    return serde_json::from_str(&text).map_err(ConnectionError::Decode);
                }
                WsMessage::Binary(bytes) => {
                    return serde_json::from_slice(&bytes).map_err(ConnectionError::Decode);
                }
                // Axum answers pings itself
                WsMessage::Ping(_) | WsMessage::Pong(_) => continue,
                WsMessage::Close(_) => {
                    tracing::debug!("Client requested close");
                    return Err(ConnectionError::Closed);
                }
            }
        }
    }
}
