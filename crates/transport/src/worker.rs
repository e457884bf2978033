//! Serial queue consumption with graceful shutdown.

use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::{Delivery, Message, MessageTransport, Result};

/// Processes messages pulled from a queue.
///
/// `Ok` acks the message; `Err` nacks it so the transport redelivers.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    type Error: Display + Send;

    async fn handle(&self, message: &Message) -> std::result::Result<(), Self::Error>;
}

#[async_trait]
impl<H: MessageHandler + ?Sized> MessageHandler for Arc<H> {
    type Error = H::Error;

    async fn handle(&self, message: &Message) -> std::result::Result<(), Self::Error> {
        (**self).handle(message).await
    }
}

/// Counters reported by a stopped worker.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStats {
    /// Messages handled and acked.
    pub processed: u64,
    /// Messages whose handler failed and were nacked.
    pub failed: u64,
}

impl std::ops::AddAssign for WorkerStats {
    fn add_assign(&mut self, other: Self) {
        self.processed += other.processed;
        self.failed += other.failed;
    }
}

/// Consumes one queue, one message at a time.
///
/// Each message is acked or nacked before the next is pulled. A shutdown
/// signal stops the worker between messages; the message in flight always
/// finishes.
pub struct QueueWorker<T, H> {
    transport: T,
    queue: String,
    consumer_tag: String,
    handler: H,
}

impl<T, H> QueueWorker<T, H>
where
    T: MessageTransport,
    H: MessageHandler,
{
    pub fn new(
        transport: T,
        queue: impl Into<String>,
        consumer_tag: impl Into<String>,
        handler: H,
    ) -> Self {
        Self {
            transport,
            queue: queue.into(),
            consumer_tag: consumer_tag.into(),
            handler,
        }
    }

    /// Name of the consumed queue.
    pub fn queue(&self) -> &str {
        &self.queue
    }

    /// Runs until shutdown is signalled or the transport closes.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> Result<WorkerStats> {
        let mut deliveries = self
            .transport
            .consume(&self.queue, &self.consumer_tag)
            .await?;
        info!(
            queue = %self.queue,
            consumer_tag = %self.consumer_tag,
            "Queue worker started"
        );

        let mut stats = WorkerStats::default();
        loop {
            if *shutdown.borrow() {
                break;
            }

            let delivery = tokio::select! {
                biased;

                changed = shutdown.changed() => {
                    if changed.is_err() {
                        // Sender gone: nobody can signal any more, stop now.
                        break;
                    }
                    continue;
                }

                next = deliveries.next() => match next {
                    Some(delivery) => delivery,
                    None => {
                        info!(queue = %self.queue, "Delivery stream ended");
                        break;
                    }
                },
            };

            self.process(delivery, &mut stats).await;
        }

        info!(
            queue = %self.queue,
            processed = stats.processed,
            failed = stats.failed,
            "Queue worker stopped"
        );
        Ok(stats)
    }

    async fn process(&self, delivery: Delivery, stats: &mut WorkerStats) {
        let message_id = delivery.message().id;
        let redelivered = delivery.message().redelivered();

        match self.handler.handle(delivery.message()).await {
            Ok(()) => {
                stats.processed += 1;
                metrics::counter!("queue_messages_total", "queue" => self.queue.clone(), "outcome" => "acked")
                    .increment(1);
                if let Err(e) = delivery.ack().await {
                    error!(queue = %self.queue, %message_id, error = %e, "Failed to ack message");
                }
            }
            Err(e) => {
                stats.failed += 1;
                metrics::counter!("queue_messages_total", "queue" => self.queue.clone(), "outcome" => "nacked")
                    .increment(1);
                warn!(
                    queue = %self.queue,
                    %message_id,
                    redelivered,
                    error = %e,
                    "Message handling failed, nacking for redelivery"
                );
                if let Err(e) = delivery.nack(true).await {
                    error!(queue = %self.queue, %message_id, error = %e, "Failed to nack message");
                }
            }
        }
    }
}

/// A set of spawned queue workers sharing one shutdown signal.
pub struct WorkerGroup {
    shutdown: watch::Sender<bool>,
    workers: Vec<(String, JoinHandle<Result<WorkerStats>>)>,
}

impl Default for WorkerGroup {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkerGroup {
    pub fn new() -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            shutdown,
            workers: Vec::new(),
        }
    }

    /// Spawns `worker` on its own task.
    pub fn spawn<T, H>(&mut self, worker: QueueWorker<T, H>)
    where
        T: MessageTransport + 'static,
        H: MessageHandler + 'static,
    {
        let queue = worker.queue().to_string();
        let receiver = self.shutdown.subscribe();
        let handle = tokio::spawn(worker.run(receiver));
        self.workers.push((queue, handle));
    }

    /// Number of spawned workers.
    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// Signals every worker to stop and waits up to `grace` for them.
    ///
    /// Workers still running when the grace period ends are aborted.
    pub async fn shutdown(self, grace: Duration) -> WorkerStats {
        self.shutdown.send_replace(true);
        let deadline = tokio::time::Instant::now() + grace;

        let mut total = WorkerStats::default();
        for (queue, mut handle) in self.workers {
            match tokio::time::timeout_at(deadline, &mut handle).await {
                Ok(Ok(Ok(stats))) => total += stats,
                Ok(Ok(Err(e))) => error!(%queue, error = %e, "Queue worker failed"),
                Ok(Err(e)) => error!(%queue, error = %e, "Queue worker panicked"),
                Err(_) => {
                    warn!(%queue, ?grace, "Queue worker did not stop in time, aborting");
                    handle.abort();
                }
            }
        }
        total
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ExchangeKind, InMemoryTransport};
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<Vec<u8>>>,
        fail_payload: Option<Vec<u8>>,
    }

    #[async_trait]
    impl MessageHandler for Recorder {
        type Error = String;

        async fn handle(&self, message: &Message) -> std::result::Result<(), String> {
            self.seen.lock().unwrap().push(message.payload.clone());
            if self.fail_payload.as_deref() == Some(message.payload.as_slice()) {
                return Err("rejected".to_string());
            }
            Ok(())
        }
    }

    async fn setup() -> InMemoryTransport {
        let transport = InMemoryTransport::with_max_redeliveries(1);
        transport
            .declare_exchange("events", ExchangeKind::Topic)
            .await
            .unwrap();
        transport.declare_queue("q").await.unwrap();
        transport.bind_queue("q", "events", "#").await.unwrap();
        transport
    }

    #[tokio::test]
    async fn test_worker_acks_in_order_and_stops_on_close() {
        let transport = setup().await;
        for payload in [b"1", b"2", b"3"] {
            transport
                .publish("events", "a", payload.to_vec())
                .await
                .unwrap();
        }

        let handler = Arc::new(Recorder::default());
        let (_tx, rx) = watch::channel(false);
        let worker = QueueWorker::new(transport.clone(), "q", "test", Arc::clone(&handler));
        let task = tokio::spawn(worker.run(rx));

        while transport.acked_count("q") < 3 {
            tokio::task::yield_now().await;
        }
        transport.close().await.unwrap();

        let stats = task.await.unwrap().unwrap();
        assert_eq!(stats.processed, 3);
        assert_eq!(
            *handler.seen.lock().unwrap(),
            vec![b"1".to_vec(), b"2".to_vec(), b"3".to_vec()]
        );
    }

    #[tokio::test]
    async fn test_failed_messages_are_redelivered_then_dead_lettered() {
        let transport = setup().await;
        transport
            .publish("events", "a", b"bad".to_vec())
            .await
            .unwrap();

        let handler = Arc::new(Recorder {
            fail_payload: Some(b"bad".to_vec()),
            ..Default::default()
        });
        let mut group = WorkerGroup::new();
        group.spawn(QueueWorker::new(
            transport.clone(),
            "q",
            "test",
            Arc::clone(&handler),
        ));

        while transport.dead_letters("q").is_empty() {
            tokio::task::yield_now().await;
        }
        let stats = group.shutdown(Duration::from_secs(1)).await;

        assert_eq!(stats.failed, 2);
        assert_eq!(handler.seen.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_group_shutdown_stops_idle_workers() {
        let transport = setup().await;
        let mut group = WorkerGroup::new();
        group.spawn(QueueWorker::new(
            transport.clone(),
            "q",
            "test",
            Recorder::default(),
        ));
        assert_eq!(group.len(), 1);

        tokio::task::yield_now().await;
        let stats = group.shutdown(Duration::from_secs(1)).await;
        assert_eq!(stats, WorkerStats::default());
        assert!(!transport.is_closed());
    }

    #[tokio::test]
    async fn test_missing_queue_fails_worker() {
        let transport = InMemoryTransport::new();
        let (_tx, rx) = watch::channel(false);
        let worker = QueueWorker::new(transport, "nope", "test", Recorder::default());
        assert!(worker.run(rx).await.is_err());
    }
}
