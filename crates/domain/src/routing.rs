//! Broker topology shared by the order and notification services.

/// Topic exchange carrying order outcome events.
pub const ORDER_EVENTS_EXCHANGE: &str = "order_events";

/// Topic exchange carrying billing events.
pub const BILLING_EVENTS_EXCHANGE: &str = "billing_events";

/// Routing key of order outcome events.
pub const ORDER_NOTIFICATION_KEY: &str = "order.notification";

/// Routing key of balance deposit events.
pub const BILLING_DEPOSIT_KEY: &str = "billing.deposit";

/// Routing key of declined withdrawal events.
pub const BILLING_INSUFFICIENT_FUNDS_KEY: &str = "billing.insufficient_funds";
