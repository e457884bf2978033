//! End-to-end tests of the order flow against in-memory collaborators.

use std::time::Duration;

use common::{Money, PageRequest, UserId};
use domain::routing::{ORDER_EVENTS_EXCHANGE, ORDER_NOTIFICATION_KEY};
use domain::{OrderItem, OrderStatus, User};
use ordering::{
    AuthToken, InMemoryLedger, OrchestratorConfig, OrderOrchestrator, OrderingError,
};
use storage::InMemoryStore;
use transport::{ExchangeKind, InMemoryTransport, MessageTransport};

struct Harness {
    orchestrator: OrderOrchestrator<InMemoryStore, InMemoryLedger, InMemoryTransport>,
    store: InMemoryStore,
    ledger: InMemoryLedger,
    transport: InMemoryTransport,
}

async fn harness_with(config: OrchestratorConfig) -> Harness {
    let store = InMemoryStore::new();
    let ledger = InMemoryLedger::new();
    let transport = InMemoryTransport::new();
    transport
        .declare_exchange(ORDER_EVENTS_EXCHANGE, ExchangeKind::Topic)
        .await
        .unwrap();

    Harness {
        orchestrator: OrderOrchestrator::new(
            store.clone(),
            ledger.clone(),
            transport.clone(),
            config,
        ),
        store,
        ledger,
        transport,
    }
}

async fn harness() -> Harness {
    harness_with(OrchestratorConfig::default()).await
}

async fn funded_user(h: &Harness, balance: Money) -> User {
    let user = h
        .orchestrator
        .create_user("alice", "alice@example.com")
        .await
        .unwrap();
    h.ledger.deposit(user.id, balance).unwrap();
    user
}

fn items() -> Vec<OrderItem> {
    vec![
        OrderItem::new(1, "Widget", Money::from_cents(2500), 2),
        OrderItem::new(2, "Gadget", Money::from_cents(4950), 1),
    ]
}

fn published_events(h: &Harness) -> Vec<serde_json::Value> {
    h.transport
        .published_to(ORDER_EVENTS_EXCHANGE)
        .into_iter()
        .map(|m| {
            assert_eq!(m.routing_key, ORDER_NOTIFICATION_KEY);
            serde_json::from_slice(&m.payload).unwrap()
        })
        .collect()
}

#[tokio::test]
async fn successful_debit_completes_order_and_publishes_once() {
    let h = harness().await;
    let user = funded_user(&h, Money::from_major(200)).await;

    let order = h
        .orchestrator
        .create_order(
            user.id,
            items(),
            Money::from_cents(9950),
            Some(AuthToken::new("token")),
        )
        .await
        .unwrap();

    assert_eq!(order.status, OrderStatus::Completed);
    assert_eq!(h.store.order_count().await, 1);
    assert_eq!(h.ledger.balance(user.id), Some(Money::from_cents(10050)));
    assert!(h.ledger.withdrawals()[0].authenticated);

    let events = published_events(&h);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0]["type"], "order.created");
    assert_eq!(events[0]["success"], true);
    assert_eq!(events[0]["order_id"], order.id.get());
    assert_eq!(events[0]["email"], "alice@example.com");
    assert_eq!(events[0]["amount"], 99.5);
}

#[tokio::test]
async fn declined_debit_persists_failed_order_and_publishes_once() {
    let h = harness().await;
    let user = funded_user(&h, Money::from_major(10)).await;

    let order = h
        .orchestrator
        .create_order(user.id, items(), Money::from_major(50), None)
        .await
        .unwrap();

    assert_eq!(order.status, OrderStatus::Failed);
    assert_eq!(h.store.order_count().await, 1);
    assert_eq!(h.ledger.balance(user.id), Some(Money::from_major(10)));

    let events = published_events(&h);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0]["success"], false);
}

#[tokio::test]
async fn ledger_error_creates_nothing() {
    let h = harness().await;
    let user = funded_user(&h, Money::from_major(100)).await;
    h.ledger.set_fail_on_withdraw(true);

    let result = h
        .orchestrator
        .create_order(user.id, items(), Money::from_major(10), None)
        .await;

    assert!(matches!(result, Err(OrderingError::Debit { .. })));
    assert_eq!(h.store.order_count().await, 0);
    assert!(h.transport.published().is_empty());
}

#[tokio::test]
async fn persist_failure_after_debit_reports_lost_funds() {
    let h = harness().await;
    let user = funded_user(&h, Money::from_major(100)).await;
    h.store.set_fail_on_create_order(true);

    let result = h
        .orchestrator
        .create_order(user.id, items(), Money::from_major(30), None)
        .await;

    match result {
        Err(OrderingError::FundsLostOrderNotPersisted {
            user_id, amount, ..
        }) => {
            assert_eq!(user_id, user.id);
            assert_eq!(amount, Money::from_major(30));
        }
        other => panic!("expected FundsLostOrderNotPersisted, got {other:?}"),
    }
    // The debit stays; nothing is published.
    assert_eq!(h.ledger.balance(user.id), Some(Money::from_major(70)));
    assert!(h.transport.published().is_empty());
}

#[tokio::test]
async fn persist_failure_after_declined_debit_is_plain_persistence_error() {
    let h = harness().await;
    let user = funded_user(&h, Money::zero()).await;
    h.store.set_fail_on_create_order(true);

    let result = h
        .orchestrator
        .create_order(user.id, items(), Money::from_major(30), None)
        .await;

    assert!(matches!(
        result,
        Err(OrderingError::Persistence {
            operation: "create_order",
            ..
        })
    ));
}

#[tokio::test]
async fn transient_publish_failures_are_retried() {
    let h = harness().await;
    let user = funded_user(&h, Money::from_major(100)).await;
    h.transport.fail_next_publishes(2);

    let order = h
        .orchestrator
        .create_order(user.id, items(), Money::from_major(10), None)
        .await
        .unwrap();

    assert_eq!(order.status, OrderStatus::Completed);
    assert_eq!(published_events(&h).len(), 1);
}

#[tokio::test]
async fn exhausted_publish_retries_do_not_fail_the_order() {
    let h = harness().await;
    let user = funded_user(&h, Money::from_major(100)).await;
    h.transport.fail_next_publishes(usize::MAX);

    let order = h
        .orchestrator
        .create_order(user.id, items(), Money::from_major(10), None)
        .await
        .unwrap();

    assert_eq!(order.status, OrderStatus::Completed);
    assert_eq!(h.store.order_count().await, 1);
    assert!(h.transport.published().is_empty());
}

#[tokio::test]
async fn timeout_during_debit_creates_nothing() {
    let h = harness_with(OrchestratorConfig {
        order_timeout: Duration::from_millis(50),
        ..OrchestratorConfig::default()
    })
    .await;
    let user = funded_user(&h, Money::from_major(100)).await;
    h.ledger.set_withdraw_delay(Some(Duration::from_secs(2)));

    let result = h
        .orchestrator
        .create_order(user.id, items(), Money::from_major(10), None)
        .await;

    assert!(matches!(
        result,
        Err(OrderingError::Timeout {
            operation: "withdraw",
            ..
        })
    ));
    assert_eq!(h.store.order_count().await, 0);
    assert!(h.transport.published().is_empty());
}

#[tokio::test]
async fn timeout_while_persisting_after_debit_reports_lost_funds() {
    let h = harness_with(OrchestratorConfig {
        order_timeout: Duration::from_millis(50),
        ..OrchestratorConfig::default()
    })
    .await;
    let user = funded_user(&h, Money::from_major(100)).await;
    h.store
        .set_create_order_delay(Some(Duration::from_secs(2)));

    let result = h
        .orchestrator
        .create_order(user.id, items(), Money::from_major(10), None)
        .await;

    assert!(matches!(
        result,
        Err(OrderingError::FundsLostOrderNotPersisted { .. })
    ));
}

#[tokio::test]
async fn list_user_orders_pages_with_independent_total() {
    let h = harness().await;
    let user = funded_user(&h, Money::from_major(100)).await;
    let other = h
        .orchestrator
        .create_user("bob", "bob@example.com")
        .await
        .unwrap();

    for _ in 0..3 {
        h.orchestrator
            .create_order(user.id, items(), Money::from_major(10), None)
            .await
            .unwrap();
    }
    h.orchestrator
        .create_order(other.id, items(), Money::from_major(10), None)
        .await
        .unwrap();

    let page = h
        .orchestrator
        .list_user_orders(user.id, PageRequest::new(2, 0))
        .await
        .unwrap();
    assert_eq!(page.total, 3);
    assert_eq!(page.items.len(), 2);

    let rest = h
        .orchestrator
        .list_user_orders(user.id, PageRequest::new(2, 2))
        .await
        .unwrap();
    assert_eq!(rest.total, 3);
    assert_eq!(rest.items.len(), 1);

    let empty = h
        .orchestrator
        .list_user_orders(UserId::new(404), PageRequest::default())
        .await
        .unwrap();
    assert_eq!(empty.total, 0);
    assert!(empty.items.is_empty());
}

#[tokio::test]
async fn get_order_returns_persisted_order() {
    let h = harness().await;
    let user = funded_user(&h, Money::from_major(100)).await;
    let created = h
        .orchestrator
        .create_order(user.id, items(), Money::from_major(10), None)
        .await
        .unwrap();

    let loaded = h.orchestrator.get_order(created.id).await.unwrap();
    assert_eq!(loaded, created);
}
