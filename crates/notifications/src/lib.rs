//! Notification side of the purchase workflow.
//!
//! Inbound broker events are classified by their `type` discriminator,
//! decoded into [`domain::InboundEvent`], rendered into a subject and body by
//! the [`composer`] and recorded by [`NotificationService`]. Unknown event
//! types are skipped without error.
//!
//! The [`consumer`] module declares the exchanges and queues this service
//! listens on and runs one serial worker per queue.

pub mod composer;
pub mod consumer;
pub mod error;
pub mod mailer;
pub mod service;

pub use composer::{ComposedMessage, compose};
pub use consumer::{EventHandler, QueueBinding, declare_topology, spawn_consumers};
pub use error::{MailError, NotificationError, Result};
pub use mailer::{DeliveryMode, DummyMailSender, MailSender, OutboxMailSender, OutgoingMail};
pub use service::{EventOutcome, NotificationConfig, NotificationService};
