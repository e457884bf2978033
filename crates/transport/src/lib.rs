//! Message transport for the purchase workflow.
//!
//! This crate provides:
//! - [`MessageTransport`], the publish/consume capability the services use
//! - [`InMemoryTransport`], an in-process topic exchange with at-least-once
//!   delivery, redelivery on nack and dead-lettering
//! - [`retry_immediately`] and [`MessageTransportExt::publish_with_retry`]
//!   for bounded fire-and-forget publishing
//! - [`QueueWorker`] and [`WorkerGroup`] for serial per-queue consumption
//!   with graceful shutdown

pub mod error;
pub mod memory;
pub mod message;
pub mod retry;
pub mod topology;
pub mod transport;
pub mod worker;

pub use error::{Result, TransportError};
pub use memory::InMemoryTransport;
pub use message::{Acknowledger, Delivery, Message};
pub use retry::retry_immediately;
pub use topology::{ExchangeKind, topic_matches};
pub use transport::{DeliveryStream, MessageTransport, MessageTransportExt};
pub use worker::{MessageHandler, QueueWorker, WorkerGroup, WorkerStats};
