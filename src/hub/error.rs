//! Hub Error Types

use thiserror::Error;

/// Errors raised by a single connection's transport
///
/// These are always contained to the connection that produced them.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// Peer closed the channel
    #[error("Connection closed")]
    Closed,

    /// Underlying transport failed
    #[error("Transport error: {0}")]
    Transport(String),

    /// Incoming frame was not a valid message
    #[error("Failed to decode message: {0}")]
    Decode(#[source] serde_json::Error),

    /// Outgoing message could not be serialized
    #[error("Failed to encode message: {0}")]
    Encode(#[source] serde_json::Error),

    /// Operation did not finish within its deadline
    #[error("Timed out")]
    Timeout,
}

/// Errors that can occur in the chat hub
#[derive(Debug, Error)]
pub enum HubError {
    #[error("Too many connections (limit: {0})")]
    TooManyConnections(usize),

    #[error("Connection already joined")]
    AlreadyJoined,

    #[error("Invalid display name: {0}")]
    InvalidName(String),

    #[error("Broadcaster has stopped")]
    BroadcasterStopped,
}
