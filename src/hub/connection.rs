//! Connection Abstraction
//!
//! The hub never touches a transport directly. A connection is handed over as
//! two halves: a [`MessageStream`] owned by the session task that reads from
//! it, and a shared [`MessageSink`] that both the session and the broadcaster
//! write to.

use async_trait::async_trait;
use std::fmt;
use tokio::sync::watch;
use uuid::Uuid;

use super::error::ConnectionError;
use super::message::Message;

/// Unique identifier for a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    /// Generate a fresh random identifier
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Awaitable closed flag shared by everything holding a sink
///
/// Fired before any transport work, so waiters are released even when the
/// close handshake itself stalls.
#[derive(Debug)]
pub struct CloseSignal {
    tx: watch::Sender<bool>,
}

impl CloseSignal {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx }
    }

    /// Mark as closed. Returns true only for the first call.
    pub fn fire(&self) -> bool {
        !self.tx.send_replace(true)
    }

    pub fn is_fired(&self) -> bool {
        *self.tx.borrow()
    }

    /// Wait until [`fire`](Self::fire) has been called
    pub async fn wait(&self) {
        let mut rx = self.tx.subscribe();
        let _ = rx.wait_for(|closed| *closed).await;
    }
}

impl Default for CloseSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Outbound half of a connection
#[async_trait]
pub trait MessageSink: Send + Sync {
    /// Deliver one message to the peer
    async fn send(&self, message: &Message) -> Result<(), ConnectionError>;

    /// Close the connection. Must be safe to call more than once.
    ///
    /// May block on the transport; callers bound it with a timeout.
    async fn close(&self);

    /// Resolves once [`close`](Self::close) has been called, by anyone
    async fn closed(&self);
}

/// Inbound half of a connection
#[async_trait]
pub trait MessageStream: Send {
    /// Wait for the next message from the peer
    ///
    /// Any error is terminal: the peer is gone or the stream is unusable.
    async fn recv(&mut self) -> Result<Message, ConnectionError>;
}
