//! Connection Session
//!
//! Drives one connection through its lifecycle:
//!
//! ```text
//! Connecting ──join ok──▶ Joined ──recv error──▶ Closed
//!     │                                            ▲
//!     └──bad handshake / refused───────────────────┘
//! ```
//!
//! Nothing is registered or broadcast until the handshake succeeds, and a
//! registered connection that cannot receive its initial presence list is
//! rolled back immediately.

use std::fmt;
use std::sync::Arc;

use super::connection::{ConnectionId, MessageSink, MessageStream};
use super::error::{ConnectionError, HubError};
use super::message::Message;
use super::ChatHub;

/// Lifecycle state of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Joined,
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionState::Connecting => "connecting",
            SessionState::Joined => "joined",
            SessionState::Closed => "closed",
        };
        f.write_str(s)
    }
}

/// How a session ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEnd {
    /// No usable join payload arrived
    HandshakeFailed,
    /// Handshake was valid but the connection could not be admitted
    Refused,
    /// Joined and later disconnected
    Left { name: String },
}

/// Validate a requested display name
///
/// Names are taken verbatim: whitespace is significant.
pub fn validate_name(name: &str, max_len: usize) -> Result<String, HubError> {
    if name.is_empty() {
        return Err(HubError::InvalidName("name is empty".to_string()));
    }
    if name.chars().count() > max_len {
        return Err(HubError::InvalidName(format!(
            "name longer than {} characters",
            max_len
        )));
    }
    Ok(name.to_string())
}

/// Per-connection task state
pub struct Session<S> {
    id: ConnectionId,
    hub: ChatHub,
    stream: S,
    sink: Arc<dyn MessageSink>,
    state: SessionState,
}

impl<S: MessageStream> Session<S> {
    pub fn new(hub: ChatHub, stream: S, sink: Arc<dyn MessageSink>) -> Self {
        Self {
            id: ConnectionId::new(),
            hub,
            stream,
            sink,
            state: SessionState::Connecting,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Run the session to completion
    pub async fn run(mut self) -> SessionEnd {
        tracing::debug!(connection_id = %self.id, "Connection opened");

        let end = match self.handshake().await {
            Some(name) => {
                if self.join(&name).await {
                    self.receive_loop(&name).await;
                    self.leave(&name).await;
                    SessionEnd::Left { name }
                } else {
                    SessionEnd::Refused
                }
            }
            None => SessionEnd::HandshakeFailed,
        };

        let deadline = self.hub.config().send_timeout();
        if tokio::time::timeout(deadline, self.sink.close()).await.is_err() {
            tracing::debug!(connection_id = %self.id, "Close timed out");
        }
        self.transition(SessionState::Closed);
        end
    }

    /// Wait for the join payload and extract the display name
    async fn handshake(&mut self) -> Option<String> {
        let deadline = self.hub.config().handshake_timeout();
        let received = match tokio::time::timeout(deadline, self.stream.recv()).await {
            Ok(result) => result,
            Err(_) => Err(ConnectionError::Timeout),
        };

        let payload = match received {
            Ok(payload) => payload,
            Err(e) => {
                tracing::info!(
                    connection_id = %self.id,
                    error = %e,
                    "Error reading join message"
                );
                return None;
            }
        };

        match validate_name(&payload.name, self.hub.config().max_name_len) {
            Ok(name) => Some(name),
            Err(e) => {
                tracing::info!(connection_id = %self.id, error = %e, "Join rejected");
                None
            }
        }
    }

    /// Register, send the presence list to this connection, announce the join
    ///
    /// Returns false if the connection could not be admitted.
    async fn join(&mut self, name: &str) -> bool {
        let registry = Arc::clone(self.hub.registry());

        let users = match registry.join(self.id, name, Arc::clone(&self.sink)).await {
            Ok(users) => users,
            Err(e) => {
                tracing::warn!(connection_id = %self.id, name = %name, error = %e, "Join refused");
                return false;
            }
        };

        let presence = Message::presence(users);
        if let Err(e) = self.sink.send(&presence.addressed_to(name)).await {
            tracing::warn!(
                connection_id = %self.id,
                name = %name,
                error = %e,
                "Error sending online users list"
            );
            registry.leave(&self.id).await;
            return false;
        }

        self.transition(SessionState::Joined);

        if let Err(e) = self.hub.outbox().publish(Message::joined(name)).await {
            tracing::warn!(connection_id = %self.id, error = %e, "Join notice not delivered");
        }
        tracing::info!(connection_id = %self.id, name = %name, "User joined");

        true
    }

    /// Forward chat messages until the peer goes away or the sink is closed
    async fn receive_loop(&mut self, name: &str) {
        loop {
            let received = tokio::select! {
                received = self.stream.recv() => received,
                _ = self.sink.closed() => {
                    tracing::debug!(connection_id = %self.id, name = %name, "Connection closed by hub");
                    return;
                }
            };

            let message = match received {
                Ok(message) => message.into_chat_from(name),
                Err(e) => {
                    tracing::debug!(connection_id = %self.id, error = %e, "Receive loop ended");
                    return;
                }
            };

            tracing::debug!(
                connection_id = %self.id,
                name = %name,
                content = %message.content,
                "Chat message received"
            );

            if let Err(e) = self.hub.outbox().publish(message).await {
                tracing::warn!(connection_id = %self.id, error = %e, "Dropping session");
                return;
            }
        }
    }

    /// Unregister and announce the departure with the updated presence list
    async fn leave(&mut self, name: &str) {
        let Some((_, users)) = self.hub.registry().leave(&self.id).await else {
            // Already evicted by the broadcaster, which announces nothing.
            tracing::debug!(connection_id = %self.id, name = %name, "Connection already evicted");
            return;
        };

        let outbox = self.hub.outbox();
        if outbox.publish(Message::left(name)).await.is_err()
            || outbox.publish(Message::presence(users)).await.is_err()
        {
            tracing::warn!(connection_id = %self.id, "Leave notice not delivered");
        }

        tracing::info!(connection_id = %self.id, name = %name, "User left");
    }

    fn transition(&mut self, next: SessionState) {
        tracing::trace!(
            connection_id = %self.id,
            from = %self.state,
            to = %next,
            "Session state change"
        );
        self.state = next;
    }
}
