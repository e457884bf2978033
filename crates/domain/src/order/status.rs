//! Order status.

use serde::{Deserialize, Serialize};

/// The status of an order.
///
/// Orders created through the purchase flow are persisted directly in a
/// terminal outcome: `Completed` when the debit succeeded, `Failed` when it
/// was declined. The remaining values describe fulfilment stages owned by
/// downstream services.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    #[default]
    Created,
    Pending,
    Paid,
    Shipped,
    Delivered,
    Canceled,
    Failed,
    Completed,
}

impl OrderStatus {
    /// Derives the status of a freshly created order from the debit outcome.
    pub fn from_debit(success: bool) -> Self {
        if success {
            OrderStatus::Completed
        } else {
            OrderStatus::Failed
        }
    }

    /// Returns true if the status is a creation outcome rather than a
    /// fulfilment stage.
    pub fn is_outcome(&self) -> bool {
        matches!(self, OrderStatus::Completed | OrderStatus::Failed)
    }

    /// Returns the status name as stored and serialized.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Created => "created",
            OrderStatus::Pending => "pending",
            OrderStatus::Paid => "paid",
            OrderStatus::Shipped => "shipped",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Canceled => "canceled",
            OrderStatus::Failed => "failed",
            OrderStatus::Completed => "completed",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "created" => Ok(OrderStatus::Created),
            "pending" => Ok(OrderStatus::Pending),
            "paid" => Ok(OrderStatus::Paid),
            "shipped" => Ok(OrderStatus::Shipped),
            "delivered" => Ok(OrderStatus::Delivered),
            "canceled" => Ok(OrderStatus::Canceled),
            "failed" => Ok(OrderStatus::Failed),
            "completed" => Ok(OrderStatus::Completed),
            other => Err(format!("unknown order status: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_debit() {
        assert_eq!(OrderStatus::from_debit(true), OrderStatus::Completed);
        assert_eq!(OrderStatus::from_debit(false), OrderStatus::Failed);
        assert!(OrderStatus::from_debit(true).is_outcome());
        assert!(!OrderStatus::Pending.is_outcome());
    }

    #[test]
    fn test_string_round_trip_matches_serde() {
        for status in [
            OrderStatus::Created,
            OrderStatus::Pending,
            OrderStatus::Paid,
            OrderStatus::Shipped,
            OrderStatus::Delivered,
            OrderStatus::Canceled,
            OrderStatus::Failed,
            OrderStatus::Completed,
        ] {
            let json = serde_json::to_string(&status).unwrap();
            assert_eq!(json, format!("\"{}\"", status.as_str()));
            assert_eq!(status.as_str().parse::<OrderStatus>().unwrap(), status);
        }
    }
}
