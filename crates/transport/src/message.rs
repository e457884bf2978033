use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::Result;

/// A published message as seen by a consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Unique id assigned at publish time.
    pub id: Uuid,
    /// Exchange the message was published to.
    pub exchange: String,
    /// Routing key used for queue selection.
    pub routing_key: String,
    /// Raw message body.
    pub payload: Vec<u8>,
    /// When the message was published.
    pub published_at: DateTime<Utc>,
    /// How many times the message has been handed to a consumer, this
    /// delivery included. Zero while the message sits in a queue unseen.
    pub delivery_count: u32,
}

impl Message {
    /// Creates a new message ready for publishing.
    pub fn new(
        exchange: impl Into<String>,
        routing_key: impl Into<String>,
        payload: Vec<u8>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            exchange: exchange.into(),
            routing_key: routing_key.into(),
            payload,
            published_at: Utc::now(),
            delivery_count: 0,
        }
    }

    /// Returns true if this message was delivered before.
    pub fn redelivered(&self) -> bool {
        self.delivery_count > 1
    }

    /// Returns the payload as text, replacing invalid UTF-8.
    pub fn payload_text(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.payload)
    }
}

/// Settles deliveries on behalf of a transport.
#[async_trait]
pub trait Acknowledger: Send + Sync {
    /// Confirms the message was processed.
    async fn ack(&self, message: &Message) -> Result<()>;

    /// Rejects the message; `requeue` asks the transport to deliver it again.
    async fn nack(&self, message: Message, requeue: bool) -> Result<()>;
}

/// A message handed to a consumer that has to be acked or nacked.
pub struct Delivery {
    message: Message,
    acker: Arc<dyn Acknowledger>,
}

impl Delivery {
    /// Wraps a message with the acknowledger of its queue.
    pub fn new(message: Message, acker: Arc<dyn Acknowledger>) -> Self {
        Self { message, acker }
    }

    /// The delivered message.
    pub fn message(&self) -> &Message {
        &self.message
    }

    /// Confirms successful processing.
    pub async fn ack(self) -> Result<()> {
        self.acker.ack(&self.message).await
    }

    /// Rejects the message, optionally asking for redelivery.
    pub async fn nack(self, requeue: bool) -> Result<()> {
        self.acker.nack(self.message, requeue).await
    }
}

impl std::fmt::Debug for Delivery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Delivery")
            .field("message", &self.message)
            .finish_non_exhaustive()
    }
}
