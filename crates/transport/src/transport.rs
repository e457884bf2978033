use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use futures_core::Stream;
use serde::Serialize;

use crate::{Delivery, ExchangeKind, Result, TransportError, retry::retry_immediately};

/// A stream of deliveries from one queue. Ends when the transport closes.
pub type DeliveryStream = Pin<Box<dyn Stream<Item = Delivery> + Send>>;

/// Publish/consume capability of a message broker.
///
/// Exchanges route by routing key to bound queues. Consumers receive each
/// message at least once and settle it through [`Delivery::ack`] or
/// [`Delivery::nack`].
#[async_trait]
pub trait MessageTransport: Send + Sync {
    /// Declares an exchange. Redeclaring with the same kind is a no-op.
    async fn declare_exchange(&self, name: &str, kind: ExchangeKind) -> Result<()>;

    /// Declares a durable queue. Redeclaring is a no-op.
    async fn declare_queue(&self, name: &str) -> Result<()>;

    /// Binds a queue to an exchange with a binding key.
    async fn bind_queue(&self, queue: &str, exchange: &str, binding_key: &str) -> Result<()>;

    /// Publishes a payload to an exchange.
    async fn publish(&self, exchange: &str, routing_key: &str, payload: Vec<u8>) -> Result<()>;

    /// Starts consuming a queue.
    async fn consume(&self, queue: &str, consumer_tag: &str) -> Result<DeliveryStream>;

    /// Closes the transport. Open delivery streams end.
    async fn close(&self) -> Result<()>;
}

#[async_trait]
impl<T: MessageTransport + ?Sized> MessageTransport for Arc<T> {
    async fn declare_exchange(&self, name: &str, kind: ExchangeKind) -> Result<()> {
        (**self).declare_exchange(name, kind).await
    }

    async fn declare_queue(&self, name: &str) -> Result<()> {
        (**self).declare_queue(name).await
    }

    async fn bind_queue(&self, queue: &str, exchange: &str, binding_key: &str) -> Result<()> {
        (**self).bind_queue(queue, exchange, binding_key).await
    }

    async fn publish(&self, exchange: &str, routing_key: &str, payload: Vec<u8>) -> Result<()> {
        (**self).publish(exchange, routing_key, payload).await
    }

    async fn consume(&self, queue: &str, consumer_tag: &str) -> Result<DeliveryStream> {
        (**self).consume(queue, consumer_tag).await
    }

    async fn close(&self) -> Result<()> {
        (**self).close().await
    }
}

/// Extension methods for message transports.
#[async_trait]
pub trait MessageTransportExt: MessageTransport {
    /// Serializes `value` as JSON and publishes it.
    async fn publish_json<V: Serialize + Sync>(
        &self,
        exchange: &str,
        routing_key: &str,
        value: &V,
    ) -> Result<()> {
        let payload = serde_json::to_vec(value)?;
        self.publish(exchange, routing_key, payload).await
    }

    /// Publishes with up to `max_attempts` immediate attempts.
    ///
    /// Returns [`TransportError::RetriesExhausted`] carrying the last error
    /// when no attempt succeeds.
    async fn publish_with_retry(
        &self,
        exchange: &str,
        routing_key: &str,
        payload: Vec<u8>,
        max_attempts: u32,
    ) -> Result<()> {
        let attempts = max_attempts.max(1);
        retry_immediately(attempts, "publish", || {
            self.publish(exchange, routing_key, payload.clone())
        })
        .await
        .map_err(|last_error| TransportError::RetriesExhausted {
            exchange: exchange.to_string(),
            routing_key: routing_key.to_string(),
            attempts,
            last_error: Box::new(last_error),
        })
    }
}

impl<T: MessageTransport + ?Sized> MessageTransportExt for T {}
