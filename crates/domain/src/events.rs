//! Broker events exchanged between the order, billing and notification services.
//!
//! Every event is a flat JSON object. The optional `type` field is the
//! discriminator that selects the payload shape; producers that predate the
//! discriminator send order outcomes without it, so an absent or empty
//! `type` is read as [`EventKind::OrderCreated`].

use common::{Money, OrderId, UserId};
use serde::{Deserialize, Serialize};

/// Discriminator value for order outcome events.
pub const ORDER_CREATED: &str = "order.created";

/// Discriminator value for balance deposit events.
pub const BILLING_DEPOSIT: &str = "billing.deposit";

/// Discriminator value for declined withdrawals.
pub const BILLING_INSUFFICIENT_FUNDS: &str = "billing.insufficient_funds";

/// Outcome of an order creation attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderOutcome {
    pub user_id: UserId,
    #[serde(default)]
    pub email: String,
    pub order_id: OrderId,
    pub amount: Money,
    pub success: bool,
}

/// A balance top-up reported by billing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Deposit {
    pub user_id: UserId,
    #[serde(default)]
    pub email: String,
    pub amount: Money,
    #[serde(default)]
    pub operation_type: String,
}

/// A withdrawal billing declined for lack of funds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsufficientFunds {
    pub user_id: UserId,
    #[serde(default)]
    pub email: String,
    pub amount: Money,
    pub balance: Money,
}

/// The event families the notification router understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    OrderCreated,
    Deposit,
    InsufficientFunds,
}

impl EventKind {
    /// Maps a discriminator to a known kind.
    ///
    /// An empty discriminator is the legacy order event. Unknown values
    /// return `None` and are meant to be skipped by consumers.
    pub fn classify(discriminator: &str) -> Option<Self> {
        match discriminator {
            "" | ORDER_CREATED => Some(EventKind::OrderCreated),
            BILLING_DEPOSIT => Some(EventKind::Deposit),
            BILLING_INSUFFICIENT_FUNDS => Some(EventKind::InsufficientFunds),
            _ => None,
        }
    }

    /// Returns the canonical discriminator value.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::OrderCreated => ORDER_CREATED,
            EventKind::Deposit => BILLING_DEPOSIT,
            EventKind::InsufficientFunds => BILLING_INSUFFICIENT_FUNDS,
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A decoded inbound event.
///
/// Serializing produces the tagged wire form (`{"type": "...", ...}`).
/// Decoding goes through [`peek_discriminator`] and [`InboundEvent::decode`]
/// instead, since legacy payloads carry no tag.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum InboundEvent {
    #[serde(rename = "order.created")]
    OrderCreated(OrderOutcome),
    #[serde(rename = "billing.deposit")]
    Deposit(Deposit),
    #[serde(rename = "billing.insufficient_funds")]
    InsufficientFunds(InsufficientFunds),
}

impl InboundEvent {
    /// Decodes the full payload as the shape required by `kind`.
    pub fn decode(kind: EventKind, payload: &[u8]) -> Result<Self, serde_json::Error> {
        Ok(match kind {
            EventKind::OrderCreated => InboundEvent::OrderCreated(serde_json::from_slice(payload)?),
            EventKind::Deposit => InboundEvent::Deposit(serde_json::from_slice(payload)?),
            EventKind::InsufficientFunds => {
                InboundEvent::InsufficientFunds(serde_json::from_slice(payload)?)
            }
        })
    }

    /// Returns the event kind.
    pub fn kind(&self) -> EventKind {
        match self {
            InboundEvent::OrderCreated(_) => EventKind::OrderCreated,
            InboundEvent::Deposit(_) => EventKind::Deposit,
            InboundEvent::InsufficientFunds(_) => EventKind::InsufficientFunds,
        }
    }

    /// Returns the user the event concerns.
    pub fn user_id(&self) -> UserId {
        match self {
            InboundEvent::OrderCreated(e) => e.user_id,
            InboundEvent::Deposit(e) => e.user_id,
            InboundEvent::InsufficientFunds(e) => e.user_id,
        }
    }

    /// Serializes the event in its tagged wire form.
    pub fn to_json(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}

#[derive(Deserialize)]
struct Discriminator {
    #[serde(default, rename = "type")]
    kind: Option<String>,
}

/// Reads only the `type` field of a payload.
///
/// Returns an empty string when the field is absent or null. Fails when the
/// payload is not a JSON object.
pub fn peek_discriminator(payload: &[u8]) -> Result<String, serde_json::Error> {
    let envelope: Discriminator = serde_json::from_slice(payload)?;
    Ok(envelope.kind.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_known_and_legacy_discriminators() {
        assert_eq!(EventKind::classify(""), Some(EventKind::OrderCreated));
        assert_eq!(
            EventKind::classify("order.created"),
            Some(EventKind::OrderCreated)
        );
        assert_eq!(
            EventKind::classify("billing.deposit"),
            Some(EventKind::Deposit)
        );
        assert_eq!(
            EventKind::classify("billing.insufficient_funds"),
            Some(EventKind::InsufficientFunds)
        );
        assert_eq!(EventKind::classify("unknown.x"), None);
    }

    #[test]
    fn test_peek_discriminator() {
        assert_eq!(
            peek_discriminator(br#"{"type":"billing.deposit","user_id":1}"#).unwrap(),
            "billing.deposit"
        );
        assert_eq!(peek_discriminator(br#"{"order_id":42}"#).unwrap(), "");
        assert_eq!(peek_discriminator(br#"{"type":null}"#).unwrap(), "");
        assert!(peek_discriminator(b"not json").is_err());
        assert!(peek_discriminator(b"[1,2]").is_err());
    }

    #[test]
    fn test_decode_legacy_order_payload() {
        let payload = br#"{"user_id":7,"email":"a@b.com","order_id":42,"amount":99.50,"success":true}"#;
        let event = InboundEvent::decode(EventKind::OrderCreated, payload).unwrap();

        match event {
            InboundEvent::OrderCreated(outcome) => {
                assert_eq!(outcome.user_id, UserId::new(7));
                assert_eq!(outcome.order_id, OrderId::new(42));
                assert_eq!(outcome.amount, Money::from_cents(9950));
                assert!(outcome.success);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_decode_defaults_missing_email() {
        let payload = br#"{"type":"billing.insufficient_funds","user_id":3,"amount":50,"balance":10}"#;
        let event = InboundEvent::decode(EventKind::InsufficientFunds, payload).unwrap();
        assert_eq!(event.user_id(), UserId::new(3));
        match event {
            InboundEvent::InsufficientFunds(e) => {
                assert!(e.email.is_empty());
                assert_eq!(e.balance, Money::from_major(10));
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_decode_rejects_wrong_shape() {
        let payload = br#"{"type":"billing.deposit","user_id":"seven"}"#;
        assert!(InboundEvent::decode(EventKind::Deposit, payload).is_err());
    }

    #[test]
    fn test_serialized_event_carries_discriminator() {
        let event = InboundEvent::OrderCreated(OrderOutcome {
            user_id: UserId::new(1),
            email: "a@b.com".to_string(),
            order_id: OrderId::new(2),
            amount: Money::from_major(3),
            success: false,
        });
        let json = event.to_json().unwrap();

        assert_eq!(peek_discriminator(&json).unwrap(), ORDER_CREATED);
        let decoded = InboundEvent::decode(EventKind::OrderCreated, &json).unwrap();
        assert_eq!(decoded, event);
    }
}
