use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use async_trait::async_trait;
use futures_util::stream;
use tokio::sync::Notify;
use tracing::{debug, warn};

use crate::{
    Acknowledger, Delivery, DeliveryStream, ExchangeKind, Message, MessageTransport, Result,
    TransportError,
};

/// Default number of redeliveries before a nacked message is dead-lettered.
pub const DEFAULT_MAX_REDELIVERIES: u32 = 5;

/// Number of recent publishes kept for inspection; older ones are dropped.
pub const PUBLISHED_LOG_CAPACITY: usize = 1024;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

struct Binding {
    queue: String,
    binding_key: String,
}

struct Exchange {
    kind: ExchangeKind,
    bindings: Vec<Binding>,
}

#[derive(Default)]
struct Topology {
    exchanges: HashMap<String, Exchange>,
    queues: HashMap<String, Arc<QueueState>>,
}

struct QueueState {
    name: String,
    ready: Mutex<VecDeque<Message>>,
    dead_letters: Mutex<Vec<Message>>,
    acked: AtomicUsize,
    notify: Notify,
    closed: AtomicBool,
    max_redeliveries: u32,
}

impl QueueState {
    fn new(name: &str, max_redeliveries: u32) -> Self {
        Self {
            name: name.to_string(),
            ready: Mutex::new(VecDeque::new()),
            dead_letters: Mutex::new(Vec::new()),
            acked: AtomicUsize::new(0),
            notify: Notify::new(),
            closed: AtomicBool::new(false),
            max_redeliveries,
        }
    }

    fn enqueue(&self, message: Message) {
        lock(&self.ready).push_back(message);
        self.notify.notify_one();
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
        self.notify.notify_one();
    }

    /// Waits for the next ready message. Returns `None` once the queue closes.
    async fn next_message(&self) -> Option<Message> {
        loop {
            let notified = self.notify.notified();
            if self.closed.load(Ordering::SeqCst) {
                return None;
            }
            let next = lock(&self.ready).pop_front();
            if let Some(mut message) = next {
                message.delivery_count += 1;
                return Some(message);
            }
            notified.await;
        }
    }
}

#[async_trait]
impl Acknowledger for QueueState {
    async fn ack(&self, message: &Message) -> Result<()> {
        self.acked.fetch_add(1, Ordering::SeqCst);
        debug!(queue = %self.name, message_id = %message.id, "Message acked");
        Ok(())
    }

    async fn nack(&self, message: Message, requeue: bool) -> Result<()> {
        let redeliveries = message.delivery_count.saturating_sub(1);
        if requeue && redeliveries < self.max_redeliveries {
            debug!(
                queue = %self.name,
                message_id = %message.id,
                delivery_count = message.delivery_count,
                "Message nacked, requeueing"
            );
            lock(&self.ready).push_front(message);
            self.notify.notify_one();
        } else {
            warn!(
                queue = %self.name,
                message_id = %message.id,
                delivery_count = message.delivery_count,
                requeue,
                "Message dead-lettered"
            );
            lock(&self.dead_letters).push(message);
        }
        Ok(())
    }
}

struct Inner {
    topology: RwLock<Topology>,
    published: Mutex<VecDeque<Message>>,
    fail_next_publishes: AtomicUsize,
    closed: AtomicBool,
    max_redeliveries: u32,
}

/// In-process broker with direct, topic and fanout exchanges.
///
/// Delivery is at least once: a nacked message returns to the head of its
/// queue until it has been redelivered `max_redeliveries` times, after which
/// it moves to the queue's dead-letter list.
#[derive(Clone)]
pub struct InMemoryTransport {
    inner: Arc<Inner>,
}

impl Default for InMemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryTransport {
    /// Creates a transport with the default redelivery limit.
    pub fn new() -> Self {
        Self::with_max_redeliveries(DEFAULT_MAX_REDELIVERIES)
    }

    /// Creates a transport that dead-letters after `max_redeliveries`.
    pub fn with_max_redeliveries(max_redeliveries: u32) -> Self {
        Self {
            inner: Arc::new(Inner {
                topology: RwLock::new(Topology::default()),
                published: Mutex::new(VecDeque::with_capacity(PUBLISHED_LOG_CAPACITY)),
                fail_next_publishes: AtomicUsize::new(0),
                closed: AtomicBool::new(false),
                max_redeliveries,
            }),
        }
    }

    /// Makes the next `count` publishes fail with `Unavailable`.
    pub fn fail_next_publishes(&self, count: usize) {
        self.inner.fail_next_publishes.store(count, Ordering::SeqCst);
    }

    /// Returns the most recent successful publishes, oldest first.
    ///
    /// At most [`PUBLISHED_LOG_CAPACITY`] messages are retained.
    pub fn published(&self) -> Vec<Message> {
        lock(&self.inner.published).iter().cloned().collect()
    }

    /// Returns the retained messages published to `exchange`.
    pub fn published_to(&self, exchange: &str) -> Vec<Message> {
        lock(&self.inner.published)
            .iter()
            .filter(|m| m.exchange == exchange)
            .cloned()
            .collect()
    }

    /// Number of messages waiting in `queue`.
    pub fn queue_depth(&self, queue: &str) -> usize {
        self.queue(queue)
            .map(|q| lock(&q.ready).len())
            .unwrap_or(0)
    }

    /// Number of acked messages for `queue`.
    pub fn acked_count(&self, queue: &str) -> usize {
        self.queue(queue)
            .map(|q| q.acked.load(Ordering::SeqCst))
            .unwrap_or(0)
    }

    /// Messages dead-lettered from `queue`.
    pub fn dead_letters(&self, queue: &str) -> Vec<Message> {
        self.queue(queue)
            .map(|q| lock(&q.dead_letters).clone())
            .unwrap_or_default()
    }

    /// Returns true once [`MessageTransport::close`] has been called.
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    fn queue(&self, name: &str) -> Option<Arc<QueueState>> {
        self.read_topology().queues.get(name).cloned()
    }

    fn read_topology(&self) -> std::sync::RwLockReadGuard<'_, Topology> {
        self.inner
            .topology
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_topology(&self) -> std::sync::RwLockWriteGuard<'_, Topology> {
        self.inner
            .topology
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }
        Ok(())
    }

    fn take_injected_failure(&self) -> bool {
        self.inner
            .fail_next_publishes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl MessageTransport for InMemoryTransport {
    async fn declare_exchange(&self, name: &str, kind: ExchangeKind) -> Result<()> {
        self.ensure_open()?;
        let mut topology = self.write_topology();
        match topology.exchanges.get(name) {
            Some(existing) if existing.kind != kind => Err(TransportError::TopologyMismatch {
                name: name.to_string(),
                existing: existing.kind.to_string(),
            }),
            Some(_) => Ok(()),
            None => {
                topology.exchanges.insert(
                    name.to_string(),
                    Exchange {
                        kind,
                        bindings: Vec::new(),
                    },
                );
                debug!(exchange = name, %kind, "Exchange declared");
                Ok(())
            }
        }
    }

    async fn declare_queue(&self, name: &str) -> Result<()> {
        self.ensure_open()?;
        let max_redeliveries = self.inner.max_redeliveries;
        self.write_topology()
            .queues
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(QueueState::new(name, max_redeliveries)));
        Ok(())
    }

    async fn bind_queue(&self, queue: &str, exchange: &str, binding_key: &str) -> Result<()> {
        self.ensure_open()?;
        let mut topology = self.write_topology();
        if !topology.queues.contains_key(queue) {
            return Err(TransportError::QueueNotFound(queue.to_string()));
        }
        let exchange_entry = topology
            .exchanges
            .get_mut(exchange)
            .ok_or_else(|| TransportError::ExchangeNotFound(exchange.to_string()))?;

        let exists = exchange_entry
            .bindings
            .iter()
            .any(|b| b.queue == queue && b.binding_key == binding_key);
        if !exists {
            exchange_entry.bindings.push(Binding {
                queue: queue.to_string(),
                binding_key: binding_key.to_string(),
            });
            debug!(queue, exchange, binding_key, "Queue bound");
        }
        Ok(())
    }

    async fn publish(&self, exchange: &str, routing_key: &str, payload: Vec<u8>) -> Result<()> {
        self.ensure_open()?;
        if self.take_injected_failure() {
            return Err(TransportError::Unavailable(format!(
                "publish to {exchange} rejected"
            )));
        }

        let message = Message::new(exchange, routing_key, payload);
        let targets: Vec<Arc<QueueState>> = {
            let topology = self.read_topology();
            let exchange_entry = topology
                .exchanges
                .get(exchange)
                .ok_or_else(|| TransportError::ExchangeNotFound(exchange.to_string()))?;

            let mut targets: Vec<Arc<QueueState>> = Vec::new();
            for binding in &exchange_entry.bindings {
                if exchange_entry.kind.routes(&binding.binding_key, routing_key)
                    && !targets.iter().any(|q| q.name == binding.queue)
                    && let Some(queue) = topology.queues.get(&binding.queue)
                {
                    targets.push(Arc::clone(queue));
                }
            }
            targets
        };

        if targets.is_empty() {
            debug!(exchange, routing_key, "Message unroutable, dropped");
        }
        for queue in &targets {
            queue.enqueue(message.clone());
        }
        let mut published = lock(&self.inner.published);
        if published.len() == PUBLISHED_LOG_CAPACITY {
            published.pop_front();
        }
        published.push_back(message);
        Ok(())
    }

    async fn consume(&self, queue: &str, consumer_tag: &str) -> Result<DeliveryStream> {
        self.ensure_open()?;
        let state = self
            .queue(queue)
            .ok_or_else(|| TransportError::QueueNotFound(queue.to_string()))?;
        debug!(queue, consumer_tag, "Consumer registered");

        let deliveries = stream::unfold(state, |state| async move {
            let message = state.next_message().await?;
            let acker: Arc<dyn Acknowledger> = state.clone();
            Some((Delivery::new(message, acker), state))
        });
        Ok(Box::pin(deliveries))
    }

    async fn close(&self) -> Result<()> {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        for queue in self.read_topology().queues.values() {
            queue.close();
        }
        debug!("Transport closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;

    async fn transport_with_queue(binding: &str) -> InMemoryTransport {
        let transport = InMemoryTransport::with_max_redeliveries(2);
        transport
            .declare_exchange("order_events", ExchangeKind::Topic)
            .await
            .unwrap();
        transport.declare_queue("q").await.unwrap();
        transport
            .bind_queue("q", "order_events", binding)
            .await
            .unwrap();
        transport
    }

    #[tokio::test]
    async fn test_publish_routes_by_topic() {
        let transport = transport_with_queue("order.#").await;

        transport
            .publish("order_events", "order.notification", b"a".to_vec())
            .await
            .unwrap();
        transport
            .publish("order_events", "billing.deposit", b"b".to_vec())
            .await
            .unwrap();

        assert_eq!(transport.queue_depth("q"), 1);
        assert_eq!(transport.published().len(), 2);
    }

    #[tokio::test]
    async fn test_published_log_keeps_only_recent_messages() {
        let transport = transport_with_queue("order.#").await;

        for i in 0..PUBLISHED_LOG_CAPACITY + 10 {
            transport
                .publish("order_events", "billing.deposit", i.to_string().into_bytes())
                .await
                .unwrap();
        }

        let published = transport.published();
        assert_eq!(published.len(), PUBLISHED_LOG_CAPACITY);
        assert_eq!(published[0].payload, b"10".to_vec());
        assert_eq!(
            published[PUBLISHED_LOG_CAPACITY - 1].payload,
            (PUBLISHED_LOG_CAPACITY + 9).to_string().into_bytes()
        );
    }

    #[tokio::test]
    async fn test_publish_to_unknown_exchange_fails() {
        let transport = InMemoryTransport::new();
        let result = transport.publish("missing", "x", Vec::new()).await;
        assert!(matches!(result, Err(TransportError::ExchangeNotFound(_))));
    }

    #[tokio::test]
    async fn test_redeclare_with_other_kind_fails() {
        let transport = InMemoryTransport::new();
        transport
            .declare_exchange("e", ExchangeKind::Topic)
            .await
            .unwrap();
        transport
            .declare_exchange("e", ExchangeKind::Topic)
            .await
            .unwrap();
        let result = transport.declare_exchange("e", ExchangeKind::Fanout).await;
        assert!(matches!(
            result,
            Err(TransportError::TopologyMismatch { .. })
        ));
    }

    #[tokio::test]
    async fn test_duplicate_bindings_deliver_once() {
        let transport = transport_with_queue("order.#").await;
        transport
            .bind_queue("q", "order_events", "order.notification")
            .await
            .unwrap();

        transport
            .publish("order_events", "order.notification", Vec::new())
            .await
            .unwrap();

        assert_eq!(transport.queue_depth("q"), 1);
    }

    #[tokio::test]
    async fn test_consume_and_ack() {
        let transport = transport_with_queue("order.#").await;
        transport
            .publish("order_events", "order.notification", b"hello".to_vec())
            .await
            .unwrap();

        let mut deliveries = transport.consume("q", "test").await.unwrap();
        let delivery = deliveries.next().await.unwrap();
        assert_eq!(delivery.message().payload, b"hello");
        assert_eq!(delivery.message().delivery_count, 1);
        delivery.ack().await.unwrap();

        assert_eq!(transport.queue_depth("q"), 0);
        assert_eq!(transport.acked_count("q"), 1);
    }

    #[tokio::test]
    async fn test_nack_requeues_then_dead_letters() {
        let transport = transport_with_queue("order.#").await;
        transport
            .publish("order_events", "order.notification", b"poison".to_vec())
            .await
            .unwrap();

        let mut deliveries = transport.consume("q", "test").await.unwrap();
        for expected in 1..=3 {
            let delivery = deliveries.next().await.unwrap();
            assert_eq!(delivery.message().delivery_count, expected);
            delivery.nack(true).await.unwrap();
        }

        assert_eq!(transport.queue_depth("q"), 0);
        let dead = transport.dead_letters("q");
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].payload, b"poison");
    }

    #[tokio::test]
    async fn test_nack_without_requeue_dead_letters_immediately() {
        let transport = transport_with_queue("order.#").await;
        transport
            .publish("order_events", "order.notification", Vec::new())
            .await
            .unwrap();

        let mut deliveries = transport.consume("q", "test").await.unwrap();
        deliveries.next().await.unwrap().nack(false).await.unwrap();

        assert_eq!(transport.dead_letters("q").len(), 1);
    }

    #[tokio::test]
    async fn test_injected_publish_failures() {
        let transport = transport_with_queue("order.#").await;
        transport.fail_next_publishes(2);

        assert!(transport.publish("order_events", "order.x", Vec::new()).await.is_err());
        assert!(transport.publish("order_events", "order.x", Vec::new()).await.is_err());
        assert!(transport.publish("order_events", "order.x", Vec::new()).await.is_ok());
        assert_eq!(transport.published().len(), 1);
    }

    #[tokio::test]
    async fn test_close_ends_streams_and_rejects_publish() {
        let transport = transport_with_queue("order.#").await;
        let mut deliveries = transport.consume("q", "test").await.unwrap();

        let waiter = tokio::spawn(async move { deliveries.next().await.is_none() });
        tokio::task::yield_now().await;
        transport.close().await.unwrap();

        assert!(waiter.await.unwrap());
        assert!(matches!(
            transport.publish("order_events", "order.x", Vec::new()).await,
            Err(TransportError::Closed)
        ));
    }

    #[tokio::test]
    async fn test_consumer_wakes_on_publish() {
        let transport = transport_with_queue("order.#").await;
        let mut deliveries = transport.consume("q", "test").await.unwrap();

        let publisher = transport.clone();
        tokio::spawn(async move {
            publisher
                .publish("order_events", "order.notification", b"late".to_vec())
                .await
                .unwrap();
        });

        let delivery = deliveries.next().await.unwrap();
        assert_eq!(delivery.message().payload, b"late");
    }
}
