//! Shared types used across the purchase workflow crates.

pub mod ids;
pub mod money;
pub mod page;

pub use ids::{NotificationId, OrderId, UserId};
pub use money::Money;
pub use page::{Page, PageRequest};
