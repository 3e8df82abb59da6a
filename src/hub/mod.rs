//! Chat Hub
//!
//! The presence-aware broadcast core.
//!
//! ## Architecture
//!
//! - **Registry**: joined connections and online names, behind one lock
//! - **Session**: per-connection task (handshake, receive loop, leave)
//! - **Broadcaster**: single consumer that fans every message out
//! - **Messages**: the wire record shared by clients and server
//!
//! ```text
//! Session ──publish──▶ [bounded queue] ──▶ Broadcaster ──send──▶ every joined connection
//!    │                                          │
//!    └──join / leave──▶ Registry ◀──snapshot / evict┘
//! ```
//!
//! The transport is abstracted behind [`MessageStream`] and [`MessageSink`],
//! so the hub runs the same over WebSockets and over in-memory channels.

mod broadcaster;
mod connection;
mod error;
mod message;
mod registry;
mod session;

pub use broadcaster::{queue, BroadcastStats, Broadcaster, Delivery, Outbox};
pub use connection::{CloseSignal, ConnectionId, MessageSink, MessageStream};
pub use error::{ConnectionError, HubError};
pub use message::{Message, MessageKind};
pub use registry::{Recipient, Registry};
pub use session::{validate_name, Session, SessionEnd, SessionState};

use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Configuration for the chat hub
#[derive(Debug, Clone, Deserialize)]
pub struct HubConfig {
    /// Maximum number of joined connections
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,

    /// Pending messages the broadcast queue holds before publishers wait
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// How long a new connection may take to send its join payload
    #[serde(default = "default_handshake_timeout")]
    pub handshake_timeout_secs: u64,

    /// How long a single recipient send may take before it is evicted
    #[serde(default = "default_send_timeout")]
    pub send_timeout_secs: u64,

    /// Longest accepted display name, in characters
    #[serde(default = "default_max_name_len")]
    pub max_name_len: usize,
}

fn default_max_connections() -> usize {
    1000
}

fn default_queue_capacity() -> usize {
    1024
}

fn default_handshake_timeout() -> u64 {
    30
}

fn default_send_timeout() -> u64 {
    10
}

fn default_max_name_len() -> usize {
    64
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            max_connections: default_max_connections(),
            queue_capacity: default_queue_capacity(),
            handshake_timeout_secs: default_handshake_timeout(),
            send_timeout_secs: default_send_timeout(),
            max_name_len: default_max_name_len(),
        }
    }
}

impl HubConfig {
    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_secs(self.handshake_timeout_secs)
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_secs(self.send_timeout_secs)
    }
}

/// Owned handle to the hub: registry, broadcast queue and settings
///
/// Built once at startup and cloned into every connection task.
#[derive(Clone)]
pub struct ChatHub {
    registry: Arc<Registry>,
    outbox: Outbox,
    config: Arc<HubConfig>,
}

impl ChatHub {
    /// Build the hub and its broadcaster without starting anything
    pub fn new(config: HubConfig) -> (Self, Broadcaster) {
        let registry = Arc::new(Registry::new(config.max_connections));
        let (outbox, rx) = queue(config.queue_capacity);
        let broadcaster = Broadcaster::new(Arc::clone(&registry), rx, config.send_timeout());

        let hub = Self {
            registry,
            outbox,
            config: Arc::new(config),
        };
        (hub, broadcaster)
    }

    /// Build the hub and spawn its broadcaster on the current runtime
    pub fn start(config: HubConfig) -> Self {
        let (hub, _handle) = Self::spawn(config);
        hub
    }

    /// Like [`ChatHub::start`], also returning the broadcaster task
    ///
    /// The task finishes once the hub and every session holding it are gone.
    pub fn spawn(config: HubConfig) -> (Self, JoinHandle<BroadcastStats>) {
        let (hub, broadcaster) = Self::new(config);
        let handle = tokio::spawn(broadcaster.run());
        (hub, handle)
    }

    /// Run a session for a freshly accepted connection
    pub async fn handle_connection<S: MessageStream>(
        &self,
        stream: S,
        sink: Arc<dyn MessageSink>,
    ) -> SessionEnd {
        Session::new(self.clone(), stream, sink).run().await
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn outbox(&self) -> &Outbox {
        &self.outbox
    }

    pub fn config(&self) -> &HubConfig {
        &self.config
    }
}
