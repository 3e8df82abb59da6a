//! Broadcaster
//!
//! The single serialized fan-out path. Sessions push messages into a bounded
//! queue through an [`Outbox`]; one [`Broadcaster`] task drains it and
//! delivers each message to every registered connection before taking the
//! next one, so every recipient sees messages in dequeue order.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use super::error::{ConnectionError, HubError};
use super::message::{Message, MessageKind};
use super::registry::{Recipient, Registry};

/// Producer side of the broadcast queue
///
/// Cheap to clone; one clone per session. When the queue is full, `publish`
/// waits for room instead of dropping.
#[derive(Clone)]
pub struct Outbox {
    tx: mpsc::Sender<Message>,
}

impl Outbox {
    /// Enqueue a message for fan-out
    pub async fn publish(&self, message: Message) -> Result<(), HubError> {
        self.tx
            .send(message)
            .await
            .map_err(|_| HubError::BroadcasterStopped)
    }
}

/// Create a broadcast queue holding at most `capacity` pending messages
pub fn queue(capacity: usize) -> (Outbox, mpsc::Receiver<Message>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (Outbox { tx }, rx)
}

/// Counters reported when the broadcaster stops
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastStats {
    /// Messages dequeued
    pub messages: u64,
    /// Successful per-recipient sends
    pub deliveries: u64,
    /// Recipients evicted after a failed send
    pub evictions: u64,
}

/// Result of delivering one message
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Delivery {
    pub delivered: usize,
    pub skipped: usize,
    pub evicted: usize,
}

/// Single consumer of the broadcast queue
pub struct Broadcaster {
    registry: Arc<Registry>,
    rx: mpsc::Receiver<Message>,
    send_timeout: Duration,
}

impl Broadcaster {
    pub fn new(
        registry: Arc<Registry>,
        rx: mpsc::Receiver<Message>,
        send_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            rx,
            send_timeout,
        }
    }

    /// Drain the queue until every [`Outbox`] has been dropped
    pub async fn run(mut self) -> BroadcastStats {
        let mut stats = BroadcastStats::default();

        tracing::debug!("Broadcaster started");

        while let Some(message) = self.rx.recv().await {
            let delivery = self.deliver(&message).await;

            stats.messages += 1;
            stats.deliveries += delivery.delivered as u64;
            stats.evictions += delivery.evicted as u64;

            tracing::trace!(
                kind = message.kind.as_str(),
                delivered = delivery.delivered,
                skipped = delivery.skipped,
                evicted = delivery.evicted,
                "Broadcast message"
            );
        }

        tracing::debug!(
            messages = stats.messages,
            deliveries = stats.deliveries,
            evictions = stats.evictions,
            "Broadcaster stopped"
        );
        stats
    }

    /// Deliver one message to every registered connection
    ///
    /// A recipient whose send fails is evicted, then closed under the send
    /// timeout; delivery to the others continues. Eviction does not produce a
    /// leave notice.
    pub async fn deliver(&self, message: &Message) -> Delivery {
        let mut delivery = Delivery::default();

        for recipient in self.registry.snapshot().await {
            if is_suppressed(message, &recipient.name) {
                delivery.skipped += 1;
                continue;
            }

            let personal = message.addressed_to(&recipient.name);
            match self.send_to(&recipient, &personal).await {
                Ok(()) => delivery.delivered += 1,
                Err(e) => {
                    tracing::warn!(
                        connection_id = %recipient.id,
                        name = %recipient.name,
                        error = %e,
                        "Broadcast send failed, evicting connection"
                    );
                    if self.registry.evict(&recipient.id).await.is_some() {
                        delivery.evicted += 1;
                    }
                    self.close(&recipient).await;
                }
            }
        }

        delivery
    }

    /// Close an evicted recipient without letting its transport hold up the room
    async fn close(&self, recipient: &Recipient) {
        if tokio::time::timeout(self.send_timeout, recipient.sink.close())
            .await
            .is_err()
        {
            tracing::debug!(connection_id = %recipient.id, "Close timed out");
        }
    }

    async fn send_to(&self, recipient: &Recipient, message: &Message) -> Result<(), ConnectionError> {
        match tokio::time::timeout(self.send_timeout, recipient.sink.send(message)).await {
            Ok(result) => result,
            Err(_) => Err(ConnectionError::Timeout),
        }
    }
}

/// Presence updates tagged with a sender are not echoed to that name.
fn is_suppressed(message: &Message, recipient_name: &str) -> bool {
    message.kind == MessageKind::Presence
        && !message.name.is_empty()
        && message.name == recipient_name
}
