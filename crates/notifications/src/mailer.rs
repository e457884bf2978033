//! Mail delivery seam.

use std::collections::VecDeque;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use common::{NotificationId, UserId};
use domain::Notification;
use serde::Serialize;
use transport::{ExchangeKind, MessageTransport, MessageTransportExt, TransportError};

use crate::error::MailError;

/// Exchange the outbox sender publishes rendered mails to.
pub const MAIL_OUTBOX_EXCHANGE: &str = "mail_outbox";

/// Routing key of outbox mails.
pub const MAIL_SEND_KEY: &str = "mail.send";

/// Whether a mail failure fails the notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeliveryMode {
    /// Mail is attempted; failures are logged and the notification is still
    /// marked sent.
    #[default]
    Simulated,
    /// A mail failure marks the notification failed and returns an error.
    Required,
}

impl FromStr for DeliveryMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "simulated" => Ok(DeliveryMode::Simulated),
            "required" => Ok(DeliveryMode::Required),
            other => Err(format!("unknown delivery mode: {other}")),
        }
    }
}

/// A rendered mail ready for delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutgoingMail {
    pub notification_id: NotificationId,
    pub user_id: UserId,
    pub to: String,
    pub subject: String,
    pub body: String,
}

impl From<&Notification> for OutgoingMail {
    fn from(notification: &Notification) -> Self {
        Self {
            notification_id: notification.id,
            user_id: notification.user_id,
            to: notification.email.clone(),
            subject: notification.subject.clone(),
            body: notification.message.clone(),
        }
    }
}

/// Delivers rendered mails.
#[async_trait]
pub trait MailSender: Send + Sync {
    async fn send(&self, mail: &OutgoingMail) -> Result<(), MailError>;
}

#[async_trait]
impl<T: MailSender + ?Sized> MailSender for Arc<T> {
    async fn send(&self, mail: &OutgoingMail) -> Result<(), MailError> {
        (**self).send(mail).await
    }
}

/// Number of recent mails [`DummyMailSender`] keeps for inspection.
pub const SENT_LOG_CAPACITY: usize = 1024;

/// Logs mails instead of sending them.
///
/// Keeps copies of the most recent mails for inspection and can be told
/// to reject.
#[derive(Debug, Clone, Default)]
pub struct DummyMailSender {
    sent: Arc<Mutex<VecDeque<OutgoingMail>>>,
    reject: Arc<Mutex<bool>>,
}

impl DummyMailSender {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes subsequent sends fail.
    pub fn set_reject(&self, reject: bool) {
        *self.reject.lock().unwrap_or_else(|e| e.into_inner()) = reject;
    }

    /// Recently accepted mails, oldest first.
    pub fn sent(&self) -> Vec<OutgoingMail> {
        let sent = self.sent.lock().unwrap_or_else(|e| e.into_inner());
        sent.iter().cloned().collect()
    }
}

#[async_trait]
impl MailSender for DummyMailSender {
    async fn send(&self, mail: &OutgoingMail) -> Result<(), MailError> {
        if *self.reject.lock().unwrap_or_else(|e| e.into_inner()) {
            return Err(MailError::Rejected(format!("mailbox {} unavailable", mail.to)));
        }
        tracing::info!(
            notification_id = %mail.notification_id,
            to = %mail.to,
            subject = %mail.subject,
            "mail sent (dummy)"
        );
        let mut sent = self.sent.lock().unwrap_or_else(|e| e.into_inner());
        if sent.len() == SENT_LOG_CAPACITY {
            sent.pop_front();
        }
        sent.push_back(mail.clone());
        Ok(())
    }
}

/// Publishes rendered mails to the `mail_outbox` exchange for a relay.
#[derive(Debug, Clone)]
pub struct OutboxMailSender<T> {
    transport: T,
}

impl<T: MessageTransport> OutboxMailSender<T> {
    /// Declares the outbox exchange and returns a sender using it.
    pub async fn connect(transport: T) -> Result<Self, TransportError> {
        transport
            .declare_exchange(MAIL_OUTBOX_EXCHANGE, ExchangeKind::Topic)
            .await?;
        Ok(Self { transport })
    }
}

#[async_trait]
impl<T: MessageTransport> MailSender for OutboxMailSender<T> {
    async fn send(&self, mail: &OutgoingMail) -> Result<(), MailError> {
        self.transport
            .publish_json(MAIL_OUTBOX_EXCHANGE, MAIL_SEND_KEY, mail)
            .await?;
        tracing::debug!(notification_id = %mail.notification_id, "mail queued in outbox");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use transport::InMemoryTransport;

    fn mail() -> OutgoingMail {
        OutgoingMail {
            notification_id: NotificationId::new(1),
            user_id: UserId::new(2),
            to: "a@b.com".to_string(),
            subject: "Hello".to_string(),
            body: "Body".to_string(),
        }
    }

    #[test]
    fn test_delivery_mode_parsing() {
        assert_eq!("simulated".parse::<DeliveryMode>(), Ok(DeliveryMode::Simulated));
        assert_eq!(" Required ".parse::<DeliveryMode>(), Ok(DeliveryMode::Required));
        assert!("smtp".parse::<DeliveryMode>().is_err());
    }

    #[tokio::test]
    async fn test_dummy_sender_records_and_rejects() {
        let sender = DummyMailSender::new();
        sender.send(&mail()).await.unwrap();
        assert_eq!(sender.sent().len(), 1);

        sender.set_reject(true);
        assert!(matches!(
            sender.send(&mail()).await,
            Err(MailError::Rejected(_))
        ));
        assert_eq!(sender.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_dummy_sender_log_is_bounded() {
        let sender = DummyMailSender::new();
        for id in 1..=SENT_LOG_CAPACITY as u64 + 5 {
            let mut mail = mail();
            mail.notification_id = NotificationId::new(id);
            sender.send(&mail).await.unwrap();
        }

        let sent = sender.sent();
        assert_eq!(sent.len(), SENT_LOG_CAPACITY);
        assert_eq!(sent[0].notification_id, NotificationId::new(6));
        assert_eq!(
            sent.last().unwrap().notification_id,
            NotificationId::new(SENT_LOG_CAPACITY as u64 + 5)
        );
    }

    #[tokio::test]
    async fn test_outbox_sender_publishes_json() {
        let transport = InMemoryTransport::new();
        let sender = OutboxMailSender::connect(transport.clone()).await.unwrap();

        sender.send(&mail()).await.unwrap();

        let published = transport.published_to(MAIL_OUTBOX_EXCHANGE);
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].routing_key, MAIL_SEND_KEY);
        let body: serde_json::Value = serde_json::from_slice(&published[0].payload).unwrap();
        assert_eq!(body["to"], "a@b.com");
        assert_eq!(body["notification_id"], 1);
    }

    #[tokio::test]
    async fn test_outbox_sender_surfaces_transport_errors() {
        let transport = InMemoryTransport::new();
        let sender = OutboxMailSender::connect(transport.clone()).await.unwrap();
        transport.fail_next_publishes(1);

        assert!(matches!(
            sender.send(&mail()).await,
            Err(MailError::Outbox(_))
        ));
    }
}
