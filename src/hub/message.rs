//! Chat Message Types
//!
//! Defines the single message record exchanged between clients and the hub.
//! Every WebSocket text frame carries exactly one JSON-encoded [`Message`].

use serde::{Deserialize, Deserializer, Serialize};
use std::borrow::Cow;

/// Kind of a chat message, serialized as the `type` field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MessageKind {
    /// A chat line written by a client
    #[default]
    #[serde(rename = "message")]
    Chat,
    /// System notice: a user joined
    #[serde(rename = "join")]
    Join,
    /// System notice: a user left
    #[serde(rename = "leave")]
    Leave,
    /// Current list of online display names
    #[serde(rename = "online_users")]
    Presence,
}

/// A message as it travels over the wire
///
/// Incoming frames may omit any field; outgoing frames always carry all four.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Message {
    /// Message kind
    #[serde(rename = "type", default, deserialize_with = "lenient_kind")]
    pub kind: MessageKind,
    /// Sender display name, empty for system events
    #[serde(default)]
    pub name: String,
    /// Free-form body
    #[serde(default)]
    pub content: String,
    /// Online display names, only populated for presence messages
    #[serde(default)]
    pub users: Vec<String>,
}

impl MessageKind {
    /// Wire name of this kind
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Chat => "message",
            MessageKind::Join => "join",
            MessageKind::Leave => "leave",
            MessageKind::Presence => "online_users",
        }
    }

    fn from_wire(value: &str) -> Self {
        match value {
            "join" => MessageKind::Join,
            "leave" => MessageKind::Leave,
            "online_users" => MessageKind::Presence,
            _ => MessageKind::Chat,
        }
    }
}

/// Unknown or null `type` values decode as chat; the hub rewrites the kind of
/// every client message anyway.
fn lenient_kind<'de, D>(deserializer: D) -> Result<MessageKind, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value
        .as_deref()
        .map(MessageKind::from_wire)
        .unwrap_or_default())
}

impl Message {
    /// Create a chat message from `name`
    pub fn chat(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            kind: MessageKind::Chat,
            name: name.into(),
            content: content.into(),
            users: Vec::new(),
        }
    }

    /// Create the system notice announcing that `name` joined
    pub fn joined(name: &str) -> Self {
        Self {
            kind: MessageKind::Join,
            name: String::new(),
            content: format!("{} 加入了聊天室", name),
            users: Vec::new(),
        }
    }

    /// Create the system notice announcing that `name` left
    pub fn left(name: &str) -> Self {
        Self {
            kind: MessageKind::Leave,
            name: String::new(),
            content: format!("{} 離開了聊天室", name),
            users: Vec::new(),
        }
    }

    /// Create a presence update carrying the given online names
    pub fn presence(users: Vec<String>) -> Self {
        Self {
            kind: MessageKind::Presence,
            name: String::new(),
            content: String::new(),
            users,
        }
    }

    /// Rewrite a client-submitted message as a chat line from `name`
    ///
    /// Clients cannot choose the kind or spoof the sender.
    pub fn into_chat_from(mut self, name: &str) -> Self {
        self.kind = MessageKind::Chat;
        self.name = name.to_string();
        self
    }

    /// The message as it should be delivered to `recipient`
    ///
    /// Presence lists name the other users in the room, so the recipient's
    /// own name is left out. Everything else is delivered unchanged.
    pub fn addressed_to(&self, recipient: &str) -> Cow<'_, Message> {
        if self.kind != MessageKind::Presence || !self.users.iter().any(|u| u == recipient) {
            return Cow::Borrowed(self);
        }

        let mut personal = self.clone();
        personal.users.retain(|u| u != recipient);
        Cow::Owned(personal)
    }

    /// Whether this message is a system event (no sender)
    pub fn is_system(&self) -> bool {
        self.name.is_empty()
    }
}
