//! Domain error types.

use common::Money;
use thiserror::Error;

/// Input rejected before any side effect takes place.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// An order must contain at least one item.
    #[error("Order has no items")]
    NoItems,

    /// Order amounts cannot be negative.
    #[error("Invalid amount: {0} (must not be negative)")]
    NegativeAmount(Money),

    /// Item quantity must be positive.
    #[error("Invalid quantity for product {product_id}: {quantity} (must be greater than 0)")]
    InvalidQuantity { product_id: u64, quantity: u32 },

    /// Username is required.
    #[error("Username is required")]
    EmptyUsername,

    /// Email address is malformed.
    #[error("Invalid email address: {0:?}")]
    InvalidEmail(String),
}
