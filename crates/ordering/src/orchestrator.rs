//! Order orchestrator driving the debit → persist → publish flow.

use std::time::Duration;

use common::{Money, OrderId, Page, PageRequest, UserId};
use domain::routing::{ORDER_EVENTS_EXCHANGE, ORDER_NOTIFICATION_KEY};
use domain::{InboundEvent, NewOrder, NewUser, Order, OrderItem, OrderOutcome, OrderStatus, User};
use storage::{OrderStore, StorageError, UserStore};
use transport::{MessageTransport, MessageTransportExt};

use crate::deadline::Deadline;
use crate::error::{OrderingError, Result};
use crate::ledger::{AuthToken, LedgerClient};

/// Tunables for [`OrderOrchestrator`].
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Budget for validation, user lookup, debit and persistence together.
    pub order_timeout: Duration,
    /// Separate budget for publishing the outcome event.
    pub publish_timeout: Duration,
    /// Immediate publish attempts before giving up.
    pub publish_max_attempts: u32,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            order_timeout: Duration::from_secs(10),
            publish_timeout: Duration::from_secs(5),
            publish_max_attempts: 3,
        }
    }
}

/// Coordinates users, the ledger, the order store and the message transport.
///
/// One store value serves both users and orders, mirroring a single
/// database behind the order service.
pub struct OrderOrchestrator<S, L, T>
where
    S: UserStore + OrderStore,
    L: LedgerClient,
    T: MessageTransport,
{
    store: S,
    ledger: L,
    transport: T,
    config: OrchestratorConfig,
}

impl<S, L, T> OrderOrchestrator<S, L, T>
where
    S: UserStore + OrderStore,
    L: LedgerClient,
    T: MessageTransport,
{
    /// Creates a new orchestrator.
    pub fn new(store: S, ledger: L, transport: T, config: OrchestratorConfig) -> Self {
        Self {
            store,
            ledger,
            transport,
            config,
        }
    }

    /// Returns the active configuration.
    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Registers a user and opens their ledger account.
    ///
    /// If the ledger account cannot be created the user row is deleted
    /// again and the ledger error is returned.
    #[tracing::instrument(skip(self, email))]
    pub async fn create_user(&self, username: &str, email: &str) -> Result<User> {
        let new_user = NewUser::new(username, email)?;

        let existing = self
            .store
            .get_user_by_email(&new_user.email)
            .await
            .map_err(OrderingError::persistence("get_user_by_email"))?;
        if existing.is_some() {
            return Err(OrderingError::EmailAlreadyRegistered(new_user.email));
        }

        let email = new_user.email.clone();
        let user = self
            .store
            .create_user(new_user)
            .await
            .map_err(|e| match e {
                // Lost a race with a concurrent registration.
                StorageError::UniqueViolation(_) => OrderingError::EmailAlreadyRegistered(email),
                source => OrderingError::Persistence {
                    operation: "create_user",
                    source,
                },
            })?;

        if let Err(source) = self.ledger.create_account(user.id).await {
            tracing::warn!(user_id = %user.id, error = %source, "ledger account creation failed, removing user");
            if let Err(e) = self.store.delete_user(user.id).await {
                tracing::error!(
                    user_id = %user.id,
                    error = %e,
                    "compensating user delete failed, user has no ledger account"
                );
            }
            return Err(OrderingError::AccountCreation {
                user_id: user.id,
                source,
            });
        }

        metrics::counter!("users_created_total").increment(1);
        tracing::info!(user_id = %user.id, "user registered");
        Ok(user)
    }

    /// Debits the user and records the order with the debit outcome.
    ///
    /// A declined debit still yields an order, in `Failed` status. The
    /// outcome event is published afterwards on a best-effort basis and
    /// never affects the result.
    #[tracing::instrument(skip(self, items, auth_token), fields(%user_id, %amount))]
    pub async fn create_order(
        &self,
        user_id: UserId,
        items: Vec<OrderItem>,
        amount: Money,
        auth_token: Option<AuthToken>,
    ) -> Result<Order> {
        let started = std::time::Instant::now();
        domain::order::validate_request(&items, amount)?;
        let deadline = Deadline::start(self.config.order_timeout);

        let user = deadline
            .run("get_user", self.store.get_user(user_id))
            .await?
            .map_err(OrderingError::persistence("get_user"))?
            .ok_or(OrderingError::UserNotFound(user_id))?;

        let debited = deadline
            .run(
                "withdraw",
                self.ledger
                    .withdraw(user_id, amount, &user.email, auth_token.as_ref()),
            )
            .await?
            .map_err(|source| {
                metrics::counter!("order_debit_failures_total").increment(1);
                tracing::warn!(error = %source, "debit failed, order not created");
                OrderingError::Debit { user_id, source }
            })?;

        let status = OrderStatus::from_debit(debited);
        let persisted = deadline
            .run(
                "create_order",
                self.store
                    .create_order(NewOrder::new(user_id, items, amount, status)),
            )
            .await;

        let order = match persisted {
            Ok(Ok(order)) => order,
            Ok(Err(source)) if debited => {
                return Err(self.funds_lost(user_id, amount, source.to_string()));
            }
            Ok(Err(source)) => {
                return Err(OrderingError::Persistence {
                    operation: "create_order",
                    source,
                });
            }
            Err(timeout) if debited => {
                return Err(self.funds_lost(user_id, amount, timeout.to_string()));
            }
            Err(timeout) => return Err(timeout),
        };

        self.publish_outcome(&order, &user.email).await;

        metrics::counter!("orders_created_total", "status" => status.as_str()).increment(1);
        metrics::histogram!("order_creation_duration_seconds")
            .record(started.elapsed().as_secs_f64());
        tracing::info!(order_id = %order.id, %status, "order created");
        Ok(order)
    }

    fn funds_lost(&self, user_id: UserId, amount: Money, reason: String) -> OrderingError {
        metrics::counter!("order_funds_lost_total").increment(1);
        tracing::error!(
            %user_id,
            %amount,
            %reason,
            "funds debited but order not persisted, manual reconciliation required"
        );
        OrderingError::FundsLostOrderNotPersisted {
            user_id,
            amount,
            reason,
        }
    }

    async fn publish_outcome(&self, order: &Order, email: &str) {
        let event = InboundEvent::OrderCreated(OrderOutcome {
            user_id: order.user_id,
            email: email.to_string(),
            order_id: order.id,
            amount: order.amount,
            success: order.status == OrderStatus::Completed,
        });
        let payload = match event.to_json() {
            Ok(payload) => payload,
            Err(e) => {
                metrics::counter!("order_publish_failures_total").increment(1);
                tracing::error!(order_id = %order.id, error = %e, "order event could not be encoded");
                return;
            }
        };

        let publish = self.transport.publish_with_retry(
            ORDER_EVENTS_EXCHANGE,
            ORDER_NOTIFICATION_KEY,
            payload,
            self.config.publish_max_attempts,
        );
        let failure = match tokio::time::timeout(self.config.publish_timeout, publish).await {
            Ok(Ok(())) => return,
            Ok(Err(e)) => e.to_string(),
            Err(_) => format!("timed out after {:?}", self.config.publish_timeout),
        };

        metrics::counter!("order_publish_failures_total").increment(1);
        tracing::error!(
            order_id = %order.id,
            error = %failure,
            "order event not published, notification will be missing"
        );
    }

    /// Loads an order by id.
    #[tracing::instrument(skip(self))]
    pub async fn get_order(&self, order_id: OrderId) -> Result<Order> {
        self.store
            .get_order(order_id)
            .await
            .map_err(OrderingError::persistence("get_order"))?
            .ok_or(OrderingError::OrderNotFound(order_id))
    }

    /// Loads a user by id.
    #[tracing::instrument(skip(self))]
    pub async fn get_user(&self, user_id: UserId) -> Result<User> {
        self.store
            .get_user(user_id)
            .await
            .map_err(OrderingError::persistence("get_user"))?
            .ok_or(OrderingError::UserNotFound(user_id))
    }

    /// Lists a page of the user's orders together with their total count.
    ///
    /// Page and total come from two separate store calls under the same
    /// filter.
    #[tracing::instrument(skip(self))]
    pub async fn list_user_orders(&self, user_id: UserId, page: PageRequest) -> Result<Page<Order>> {
        let (orders, total) = tokio::try_join!(
            async {
                self.store
                    .get_orders_by_user(user_id, page)
                    .await
                    .map_err(OrderingError::persistence("get_orders_by_user"))
            },
            async {
                self.store
                    .count_orders_by_user(user_id)
                    .await
                    .map_err(OrderingError::persistence("count_orders_by_user"))
            },
        )?;
        Ok(Page::new(orders, total))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{InMemoryLedger, LedgerError};
    use storage::InMemoryStore;
    use transport::{ExchangeKind, InMemoryTransport};

    type Orchestrator = OrderOrchestrator<InMemoryStore, InMemoryLedger, InMemoryTransport>;

    async fn setup() -> (Orchestrator, InMemoryStore, InMemoryLedger, InMemoryTransport) {
        let store = InMemoryStore::new();
        let ledger = InMemoryLedger::new();
        let transport = InMemoryTransport::new();
        transport
            .declare_exchange(ORDER_EVENTS_EXCHANGE, ExchangeKind::Topic)
            .await
            .unwrap();
        let orchestrator = OrderOrchestrator::new(
            store.clone(),
            ledger.clone(),
            transport.clone(),
            OrchestratorConfig::default(),
        );
        (orchestrator, store, ledger, transport)
    }

    fn items() -> Vec<OrderItem> {
        vec![OrderItem::new(1, "Widget", Money::from_major(10), 1)]
    }

    #[tokio::test]
    async fn test_create_user_opens_account() {
        let (orchestrator, _, ledger, _) = setup().await;
        let user = orchestrator
            .create_user("alice", "alice@example.com")
            .await
            .unwrap();
        assert!(ledger.has_account(user.id));
    }

    #[tokio::test]
    async fn test_create_user_rejects_duplicate_email() {
        let (orchestrator, store, _, _) = setup().await;
        orchestrator
            .create_user("alice", "alice@example.com")
            .await
            .unwrap();

        let result = orchestrator.create_user("alice2", "alice@example.com").await;
        assert!(matches!(
            result,
            Err(OrderingError::EmailAlreadyRegistered(_))
        ));
        assert_eq!(store.user_count().await, 1);
    }

    #[tokio::test]
    async fn test_create_user_rolls_back_on_ledger_failure() {
        let (orchestrator, store, ledger, _) = setup().await;
        ledger.set_fail_on_create_account(true);

        let result = orchestrator.create_user("bob", "bob@example.com").await;

        assert!(matches!(
            result,
            Err(OrderingError::AccountCreation {
                source: LedgerError::Unavailable(_),
                ..
            })
        ));
        assert_eq!(store.user_count().await, 0);
    }

    #[tokio::test]
    async fn test_failed_compensation_keeps_ledger_error() {
        let (orchestrator, store, ledger, _) = setup().await;
        ledger.set_fail_on_create_account(true);
        store.set_fail_on_delete_user(true);

        let result = orchestrator.create_user("bob", "bob@example.com").await;

        assert!(matches!(
            result,
            Err(OrderingError::AccountCreation { .. })
        ));
        assert_eq!(store.user_count().await, 1);
    }

    #[tokio::test]
    async fn test_create_user_validates_input() {
        let (orchestrator, store, _, _) = setup().await;
        let result = orchestrator.create_user("", "nobody").await;
        assert!(matches!(result, Err(OrderingError::Validation(_))));
        assert_eq!(store.user_count().await, 0);
    }

    #[tokio::test]
    async fn test_order_validation_has_no_side_effects() {
        let (orchestrator, store, ledger, transport) = setup().await;
        let user = orchestrator
            .create_user("carol", "carol@example.com")
            .await
            .unwrap();

        let result = orchestrator
            .create_order(user.id, Vec::new(), Money::from_major(1), None)
            .await;

        assert!(matches!(result, Err(OrderingError::Validation(_))));
        assert!(ledger.withdrawals().is_empty());
        assert_eq!(store.order_count().await, 0);
        assert!(transport.published().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_user_has_no_side_effects() {
        let (orchestrator, store, ledger, transport) = setup().await;
        let result = orchestrator
            .create_order(UserId::new(99), items(), Money::from_major(1), None)
            .await;

        assert!(matches!(result, Err(OrderingError::UserNotFound(_))));
        assert!(ledger.withdrawals().is_empty());
        assert_eq!(store.order_count().await, 0);
        assert!(transport.published().is_empty());
    }

    #[tokio::test]
    async fn test_get_missing_order_and_user() {
        let (orchestrator, _, _, _) = setup().await;
        assert!(matches!(
            orchestrator.get_order(OrderId::new(1)).await,
            Err(OrderingError::OrderNotFound(_))
        ));
        assert!(matches!(
            orchestrator.get_user(UserId::new(1)).await,
            Err(OrderingError::UserNotFound(_))
        ));
    }
}
