//! Event routing and notification lifecycle.

use std::borrow::Cow;
use std::time::{Duration, Instant};

use chrono::Utc;
use common::{NotificationId, Page, PageRequest, UserId};
use domain::{
    EventKind, InboundEvent, NewNotification, Notification, NotificationStatus, peek_discriminator,
};
use storage::NotificationStore;

use crate::composer::{ComposedMessage, compose};
use crate::error::{NotificationError, Result};
use crate::mailer::{DeliveryMode, MailSender, OutgoingMail};

/// Tunables for [`NotificationService`].
#[derive(Debug, Clone)]
pub struct NotificationConfig {
    pub delivery: DeliveryMode,
    /// Budget for decoding an inbound event and recording its row. Once
    /// the row exists, delivery and the status update run to completion.
    pub event_timeout: Duration,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            delivery: DeliveryMode::Simulated,
            event_timeout: Duration::from_secs(10),
        }
    }
}

/// What handling an inbound event produced.
#[derive(Debug, Clone, PartialEq)]
pub enum EventOutcome {
    /// A notification was recorded and marked sent.
    Notified(Notification),
    /// The event type is not handled here; nothing was recorded.
    Ignored { event_type: String },
}

/// Routes inbound events to notifications and serves notification queries.
pub struct NotificationService<S, M>
where
    S: NotificationStore,
    M: MailSender,
{
    store: S,
    mailer: M,
    config: NotificationConfig,
}

impl<S, M> NotificationService<S, M>
where
    S: NotificationStore,
    M: MailSender,
{
    /// Creates a new notification service.
    pub fn new(store: S, mailer: M, config: NotificationConfig) -> Self {
        Self {
            store,
            mailer,
            config,
        }
    }

    /// Handles one raw event payload.
    ///
    /// Only the discriminator is read first; the full payload is decoded
    /// once the expected shape is known. Unknown types are ignored.
    ///
    /// The event deadline stops at the row insert. A [`NotificationError::Timeout`]
    /// therefore never leaves a row behind, and delivery of a recorded row is
    /// never cut short.
    pub async fn handle_event(&self, payload: &[u8]) -> Result<EventOutcome> {
        let started = Instant::now();
        let deadline = tokio::time::Instant::now() + self.config.event_timeout;

        let result = self.route(payload, deadline).await;

        metrics::histogram!("event_handling_duration_seconds")
            .record(started.elapsed().as_secs_f64());
        if let Err(e) = &result {
            metrics::counter!("event_handling_failures_total").increment(1);
            tracing::warn!(error = %e, "event handling failed");
        }
        result
    }

    /// Handles a payload from a queue dedicated to one event family.
    ///
    /// Payloads without a discriminator are tagged with `family` and then
    /// dispatched exactly like [`handle_event`](Self::handle_event).
    pub async fn handle_for_family(&self, family: EventKind, payload: &[u8]) -> Result<EventOutcome> {
        let tagged = tag_with_family(family, payload)?;
        self.handle_event(&tagged).await
    }

    #[tracing::instrument(skip_all, fields(event_type))]
    async fn route(&self, payload: &[u8], deadline: tokio::time::Instant) -> Result<EventOutcome> {
        let discriminator =
            peek_discriminator(payload).map_err(NotificationError::decode("untyped"))?;
        tracing::Span::current().record("event_type", discriminator.as_str());

        let Some(kind) = EventKind::classify(&discriminator) else {
            metrics::counter!("events_ignored_total").increment(1);
            tracing::info!(event_type = %discriminator, "ignoring event of unknown type");
            return Ok(EventOutcome::Ignored {
                event_type: discriminator,
            });
        };

        let event =
            InboundEvent::decode(kind, payload).map_err(NotificationError::decode(kind.as_str()))?;
        let message = compose(&event);

        let limit = self.config.event_timeout;
        let created = tokio::time::timeout_at(deadline, self.create_pending(&message))
            .await
            .map_err(|_| NotificationError::Timeout { limit })??;

        let notification = self.deliver(created).await?;
        count_sent(kind);
        Ok(EventOutcome::Notified(notification))
    }

    /// Composes and sends the notification for a decoded event.
    #[tracing::instrument(skip_all, fields(event_type = %event.kind(), user_id = %event.user_id()))]
    pub async fn process_event(&self, event: &InboundEvent) -> Result<Notification> {
        let created = self.create_pending(&compose(event)).await?;
        let notification = self.deliver(created).await?;
        count_sent(event.kind());
        Ok(notification)
    }

    /// Records a notification and marks it sent.
    ///
    /// The row is created `pending`. In [`DeliveryMode::Required`] a mail
    /// failure marks it `failed` and returns [`NotificationError::Delivery`].
    /// If the final status update fails the row stays `pending` and
    /// [`NotificationError::StatusUpdate`] is returned.
    #[tracing::instrument(skip(self, email, subject, body))]
    pub async fn send_notification(
        &self,
        user_id: UserId,
        email: &str,
        subject: &str,
        body: &str,
    ) -> Result<Notification> {
        let created = self
            .store
            .create_notification(NewNotification::new(user_id, email, subject, body))
            .await
            .map_err(NotificationError::persistence("create_notification"))?;
        self.deliver(created).await
    }

    async fn create_pending(&self, message: &ComposedMessage) -> Result<Notification> {
        self.store
            .create_notification(NewNotification::new(
                message.user_id,
                &message.email,
                &message.subject,
                &message.body,
            ))
            .await
            .map_err(NotificationError::persistence("create_notification"))
    }

    /// Mails a recorded `pending` notification and settles its status.
    async fn deliver(&self, created: Notification) -> Result<Notification> {
        let mail = OutgoingMail::from(&created);
        if let Err(e) = self.mailer.send(&mail).await {
            metrics::counter!("mail_delivery_failures_total").increment(1);
            match self.config.delivery {
                DeliveryMode::Simulated => {
                    tracing::warn!(notification_id = %created.id, error = %e, "mail delivery failed, continuing");
                }
                DeliveryMode::Required => {
                    if let Err(update) = self
                        .store
                        .update_notification_status(created.id, NotificationStatus::Failed)
                        .await
                    {
                        tracing::error!(
                            notification_id = %created.id,
                            error = %update,
                            "could not mark notification failed"
                        );
                    }
                    return Err(NotificationError::Delivery {
                        notification_id: created.id,
                        source: e,
                    });
                }
            }
        }

        self.store
            .update_notification_status(created.id, NotificationStatus::Sent)
            .await
            .map_err(|source| NotificationError::StatusUpdate {
                notification_id: created.id,
                source,
            })?;

        tracing::info!(notification_id = %created.id, "notification sent");
        Ok(Notification {
            status: NotificationStatus::Sent,
            updated_at: Utc::now(),
            ..created
        })
    }

    /// Loads a notification by id.
    #[tracing::instrument(skip(self))]
    pub async fn get_notification(&self, id: NotificationId) -> Result<Notification> {
        self.store
            .get_notification(id)
            .await
            .map_err(NotificationError::persistence("get_notification"))?
            .ok_or(NotificationError::NotFound(id))
    }

    /// Lists a user's notifications, newest first.
    #[tracing::instrument(skip(self))]
    pub async fn list_user_notifications(
        &self,
        user_id: UserId,
        page: PageRequest,
    ) -> Result<Page<Notification>> {
        self.store
            .list_notifications_by_user(user_id, page)
            .await
            .map_err(NotificationError::persistence("list_notifications_by_user"))
    }

    /// Lists all notifications, newest first.
    #[tracing::instrument(skip(self))]
    pub async fn list_all_notifications(&self, page: PageRequest) -> Result<Page<Notification>> {
        self.store
            .list_all_notifications(page)
            .await
            .map_err(NotificationError::persistence("list_all_notifications"))
    }
}

fn count_sent(kind: EventKind) {
    metrics::counter!("notifications_sent_total", "event_type" => kind.as_str()).increment(1);
}

/// Adds `"type": family` to a payload that has no discriminator.
fn tag_with_family(family: EventKind, payload: &[u8]) -> Result<Cow<'_, [u8]>> {
    let decode = || NotificationError::decode(family.as_str());
    let discriminator = peek_discriminator(payload).map_err(decode())?;
    if !discriminator.is_empty() {
        return Ok(Cow::Borrowed(payload));
    }

    let mut value: serde_json::Value = serde_json::from_slice(payload).map_err(decode())?;
    if let Some(object) = value.as_object_mut() {
        object.insert("type".to_string(), family.as_str().into());
    }
    let tagged = serde_json::to_vec(&value).map_err(decode())?;
    Ok(Cow::Owned(tagged))
}
