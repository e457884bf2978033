//! Renders inbound events into notification text.

use common::UserId;
use domain::{Deposit, InboundEvent, InsufficientFunds, OrderOutcome};

/// Subject and body addressed to one user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposedMessage {
    pub user_id: UserId,
    pub email: String,
    pub subject: String,
    pub body: String,
}

/// Renders the notification for an event.
pub fn compose(event: &InboundEvent) -> ComposedMessage {
    match event {
        InboundEvent::OrderCreated(outcome) => compose_order_outcome(outcome),
        InboundEvent::Deposit(deposit) => compose_deposit(deposit),
        InboundEvent::InsufficientFunds(event) => compose_insufficient_funds(event),
    }
}

/// Address used when an event carries no email.
pub fn fallback_email(user_id: UserId) -> String {
    format!("user{user_id}@example.com")
}

fn recipient(user_id: UserId, email: &str) -> String {
    if email.trim().is_empty() {
        fallback_email(user_id)
    } else {
        email.to_string()
    }
}

fn compose_order_outcome(outcome: &OrderOutcome) -> ComposedMessage {
    let (subject, body) = if outcome.success {
        (
            format!("Order #{} successfully placed", outcome.order_id),
            format!(
                "Dear customer, your order #{} for {} has been successfully placed. Thank you for your purchase!",
                outcome.order_id, outcome.amount
            ),
        )
    } else {
        (
            format!("Problem with order #{}", outcome.order_id),
            format!(
                "Dear customer, there was a problem placing order #{} for {}. Please check your account balance.",
                outcome.order_id, outcome.amount
            ),
        )
    };

    ComposedMessage {
        user_id: outcome.user_id,
        email: recipient(outcome.user_id, &outcome.email),
        subject,
        body,
    }
}

fn compose_deposit(deposit: &Deposit) -> ComposedMessage {
    ComposedMessage {
        user_id: deposit.user_id,
        email: recipient(deposit.user_id, &deposit.email),
        subject: "Balance top-up".to_string(),
        body: format!(
            "Dear customer, your account has been topped up by {}. Operation: {}.",
            deposit.amount, deposit.operation_type
        ),
    }
}

fn compose_insufficient_funds(event: &InsufficientFunds) -> ComposedMessage {
    ComposedMessage {
        user_id: event.user_id,
        email: recipient(event.user_id, &event.email),
        subject: "Insufficient funds on your account".to_string(),
        body: format!(
            "Dear customer, your account does not have enough funds for an operation of {}. \
             Current balance: {}. Please top up your balance to continue shopping.",
            event.amount, event.balance
        ),
    }
}
