//! Queue topology and workers feeding the notification service.

use std::sync::Arc;

use async_trait::async_trait;
use domain::EventKind;
use domain::routing::{
    BILLING_DEPOSIT_KEY, BILLING_EVENTS_EXCHANGE, BILLING_INSUFFICIENT_FUNDS_KEY,
    ORDER_EVENTS_EXCHANGE, ORDER_NOTIFICATION_KEY,
};
use storage::NotificationStore;
use transport::{
    ExchangeKind, Message, MessageHandler, MessageTransport, QueueWorker, TransportError,
    WorkerGroup,
};

use crate::error::NotificationError;
use crate::mailer::MailSender;
use crate::service::{EventOutcome, NotificationService};

/// Unified queue receiving every order event.
pub const ORDER_NOTIFICATION_QUEUE: &str = "order_notification_queue";

/// Unified queue receiving every billing event.
pub const BILLING_NOTIFICATION_QUEUE: &str = "billing_notification_queue";

/// Legacy queue for order outcomes only.
pub const LEGACY_ORDER_QUEUE: &str = "order_notifications";

/// Legacy queue for deposits only.
pub const LEGACY_DEPOSIT_QUEUE: &str = "deposit_notifications";

/// Legacy queue for declined withdrawals only.
pub const LEGACY_INSUFFICIENT_FUNDS_QUEUE: &str = "insufficient_funds_notifications";

/// A queue, what it is bound to, and which event family it carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueBinding {
    pub queue: &'static str,
    pub exchange: &'static str,
    pub binding_key: &'static str,
    /// `Some` for single-family queues whose untyped payloads are tagged.
    pub family: Option<EventKind>,
}

/// The queues this service consumes.
pub fn bindings(legacy_queues: bool) -> Vec<QueueBinding> {
    let mut bindings = vec![
        QueueBinding {
            queue: ORDER_NOTIFICATION_QUEUE,
            exchange: ORDER_EVENTS_EXCHANGE,
            binding_key: "order.#",
            family: None,
        },
        QueueBinding {
            queue: BILLING_NOTIFICATION_QUEUE,
            exchange: BILLING_EVENTS_EXCHANGE,
            binding_key: "billing.#",
            family: None,
        },
    ];

    if legacy_queues {
        bindings.extend([
            QueueBinding {
                queue: LEGACY_ORDER_QUEUE,
                exchange: ORDER_EVENTS_EXCHANGE,
                binding_key: ORDER_NOTIFICATION_KEY,
                family: Some(EventKind::OrderCreated),
            },
            QueueBinding {
                queue: LEGACY_DEPOSIT_QUEUE,
                exchange: BILLING_EVENTS_EXCHANGE,
                binding_key: BILLING_DEPOSIT_KEY,
                family: Some(EventKind::Deposit),
            },
            QueueBinding {
                queue: LEGACY_INSUFFICIENT_FUNDS_QUEUE,
                exchange: BILLING_EVENTS_EXCHANGE,
                binding_key: BILLING_INSUFFICIENT_FUNDS_KEY,
                family: Some(EventKind::InsufficientFunds),
            },
        ]);
    }
    bindings
}

/// Declares both event exchanges and every queue with its binding.
pub async fn declare_topology<T: MessageTransport>(
    transport: &T,
    legacy_queues: bool,
) -> Result<Vec<QueueBinding>, TransportError> {
    for exchange in [ORDER_EVENTS_EXCHANGE, BILLING_EVENTS_EXCHANGE] {
        transport
            .declare_exchange(exchange, ExchangeKind::Topic)
            .await?;
    }

    let bindings = bindings(legacy_queues);
    for binding in &bindings {
        transport.declare_queue(binding.queue).await?;
        transport
            .bind_queue(binding.queue, binding.exchange, binding.binding_key)
            .await?;
        tracing::debug!(
            queue = binding.queue,
            exchange = binding.exchange,
            binding_key = binding.binding_key,
            "queue bound"
        );
    }
    Ok(bindings)
}

/// Bridges a queue worker to the notification service.
pub struct EventHandler<S, M>
where
    S: NotificationStore,
    M: MailSender,
{
    service: Arc<NotificationService<S, M>>,
    family: Option<EventKind>,
}

impl<S, M> EventHandler<S, M>
where
    S: NotificationStore,
    M: MailSender,
{
    /// Handler for a queue carrying any event type.
    pub fn unified(service: Arc<NotificationService<S, M>>) -> Self {
        Self {
            service,
            family: None,
        }
    }

    /// Handler for a queue dedicated to one event family.
    pub fn for_family(service: Arc<NotificationService<S, M>>, family: EventKind) -> Self {
        Self {
            service,
            family: Some(family),
        }
    }
}

#[async_trait]
impl<S, M> MessageHandler for EventHandler<S, M>
where
    S: NotificationStore,
    M: MailSender,
{
    type Error = NotificationError;

    async fn handle(&self, message: &Message) -> Result<(), NotificationError> {
        let outcome = match self.family {
            Some(family) => {
                self.service
                    .handle_for_family(family, &message.payload)
                    .await?
            }
            None => self.service.handle_event(&message.payload).await?,
        };

        if let EventOutcome::Notified(notification) = outcome {
            tracing::debug!(
                message_id = %message.id,
                routing_key = %message.routing_key,
                notification_id = %notification.id,
                "event handled"
            );
        }
        Ok(())
    }
}

/// Declares the topology and spawns one worker per queue into `workers`.
///
/// Returns the number of spawned workers.
pub async fn spawn_consumers<T, S, M>(
    transport: T,
    service: Arc<NotificationService<S, M>>,
    legacy_queues: bool,
    workers: &mut WorkerGroup,
) -> Result<usize, TransportError>
where
    T: MessageTransport + Clone + 'static,
    S: NotificationStore + 'static,
    M: MailSender + 'static,
{
    let bindings = declare_topology(&transport, legacy_queues).await?;

    for binding in &bindings {
        let handler = match binding.family {
            Some(family) => EventHandler::for_family(Arc::clone(&service), family),
            None => EventHandler::unified(Arc::clone(&service)),
        };
        let consumer_tag = format!("notification-service.{}", binding.queue);
        workers.spawn(QueueWorker::new(
            transport.clone(),
            binding.queue,
            consumer_tag,
            handler,
        ));
        tracing::info!(queue = binding.queue, "notification consumer started");
    }
    Ok(bindings.len())
}
