//! Domain layer for the purchase workflow.
//!
//! This crate provides:
//! - User, Order and Notification entities with their status enums
//! - The inbound event model consumed by the notification router
//! - Input validation shared by the HTTP layer and the orchestrator

pub mod error;
pub mod events;
pub mod notification;
pub mod order;
pub mod routing;
pub mod user;

pub use error::ValidationError;
pub use events::{
    Deposit, EventKind, InboundEvent, InsufficientFunds, OrderOutcome, peek_discriminator,
};
pub use notification::{NewNotification, Notification, NotificationStatus};
pub use order::{NewOrder, Order, OrderItem, OrderStatus};
pub use user::{NewUser, User};
