//! Orders and order items.

mod status;

pub use status::OrderStatus;

use chrono::{DateTime, Utc};
use common::{Money, OrderId, UserId};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// A line item of an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub product_id: u64,
    pub name: String,
    /// Unit price.
    pub price: Money,
    pub quantity: u32,
}

impl OrderItem {
    /// Creates a new order item.
    pub fn new(product_id: u64, name: impl Into<String>, price: Money, quantity: u32) -> Self {
        Self {
            product_id,
            name: name.into(),
            price,
            quantity,
        }
    }
}

/// A persisted order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub user_id: UserId,
    pub items: Vec<OrderItem>,
    pub amount: Money,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// An order that has not been persisted yet.
#[derive(Debug, Clone, PartialEq)]
pub struct NewOrder {
    pub user_id: UserId,
    pub items: Vec<OrderItem>,
    pub amount: Money,
    pub status: OrderStatus,
}

impl NewOrder {
    /// Creates a new order in the given status.
    pub fn new(user_id: UserId, items: Vec<OrderItem>, amount: Money, status: OrderStatus) -> Self {
        Self {
            user_id,
            items,
            amount,
            status,
        }
    }
}

/// Checks an order request before anything is debited or stored.
///
/// The amount is the authoritative charge; item prices are informational and
/// are not summed against it.
pub fn validate_request(items: &[OrderItem], amount: Money) -> Result<(), ValidationError> {
    if items.is_empty() {
        return Err(ValidationError::NoItems);
    }
    if amount.is_negative() {
        return Err(ValidationError::NegativeAmount(amount));
    }
    if let Some(item) = items.iter().find(|item| item.quantity == 0) {
        return Err(ValidationError::InvalidQuantity {
            product_id: item.product_id,
            quantity: item.quantity,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn widget() -> OrderItem {
        OrderItem::new(1, "Widget", Money::from_major(10), 2)
    }

    #[test]
    fn test_validate_request_accepts_regular_order() {
        assert!(validate_request(&[widget()], Money::from_major(20)).is_ok());
        assert!(validate_request(&[widget()], Money::zero()).is_ok());
    }

    #[test]
    fn test_validate_request_rejects_invalid_orders() {
        assert_eq!(
            validate_request(&[], Money::from_major(20)),
            Err(ValidationError::NoItems)
        );
        assert_eq!(
            validate_request(&[widget()], Money::from_cents(-1)),
            Err(ValidationError::NegativeAmount(Money::from_cents(-1)))
        );

        let mut empty = widget();
        empty.quantity = 0;
        assert_eq!(
            validate_request(&[empty], Money::from_major(1)),
            Err(ValidationError::InvalidQuantity {
                product_id: 1,
                quantity: 0
            })
        );
    }
}
