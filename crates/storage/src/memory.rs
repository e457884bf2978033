use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use common::{NotificationId, OrderId, Page, PageRequest, UserId};
use domain::{NewNotification, NewOrder, NewUser, Notification, NotificationStatus, Order, User};
use tokio::sync::RwLock;

use crate::{
    Result, StorageError,
    store::{NotificationStore, OrderStore, UserStore},
};

#[derive(Default)]
struct Tables {
    users: BTreeMap<UserId, User>,
    orders: BTreeMap<OrderId, Order>,
    notifications: BTreeMap<NotificationId, Notification>,
    next_user_id: u64,
    next_order_id: u64,
    next_notification_id: u64,
}

/// Switches used by tests to make individual operations fail or stall.
#[derive(Debug, Default, Clone, Copy)]
struct Faults {
    fail_on_create_user: bool,
    fail_on_delete_user: bool,
    fail_on_create_order: bool,
    fail_on_create_notification: bool,
    fail_on_update_status: bool,
    create_order_delay: Option<Duration>,
    create_notification_delay: Option<Duration>,
}

/// In-memory store implementation for testing and local runs.
///
/// One instance implements all three store traits. Ids are assigned from
/// per-table sequences starting at 1, mirroring `BIGSERIAL` columns.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    tables: Arc<RwLock<Tables>>,
    faults: Arc<Mutex<Faults>>,
}

impl InMemoryStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    fn faults(&self) -> MutexGuard<'_, Faults> {
        self.faults.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Makes `create_user` fail.
    pub fn set_fail_on_create_user(&self, fail: bool) {
        self.faults().fail_on_create_user = fail;
    }

    /// Makes `delete_user` fail.
    pub fn set_fail_on_delete_user(&self, fail: bool) {
        self.faults().fail_on_delete_user = fail;
    }

    /// Makes `create_order` fail.
    pub fn set_fail_on_create_order(&self, fail: bool) {
        self.faults().fail_on_create_order = fail;
    }

    /// Makes `create_notification` fail.
    pub fn set_fail_on_create_notification(&self, fail: bool) {
        self.faults().fail_on_create_notification = fail;
    }

    /// Makes `update_notification_status` fail.
    pub fn set_fail_on_update_status(&self, fail: bool) {
        self.faults().fail_on_update_status = fail;
    }

    /// Delays every `create_order` call before it touches the tables.
    pub fn set_create_order_delay(&self, delay: Option<Duration>) {
        self.faults().create_order_delay = delay;
    }

    /// Delays every `create_notification` call before it touches the tables.
    pub fn set_create_notification_delay(&self, delay: Option<Duration>) {
        self.faults().create_notification_delay = delay;
    }

    /// Returns the number of stored users.
    pub async fn user_count(&self) -> usize {
        self.tables.read().await.users.len()
    }

    /// Returns the number of stored orders.
    pub async fn order_count(&self) -> usize {
        self.tables.read().await.orders.len()
    }

    /// Returns the number of stored notifications.
    pub async fn notification_count(&self) -> usize {
        self.tables.read().await.notifications.len()
    }

    /// Returns every stored notification, oldest first.
    pub async fn all_notifications(&self) -> Vec<Notification> {
        self.tables
            .read()
            .await
            .notifications
            .values()
            .cloned()
            .collect()
    }
}

fn unavailable(operation: &str) -> StorageError {
    StorageError::Unavailable(format!("{operation} rejected by injected fault"))
}

#[async_trait]
impl UserStore for InMemoryStore {
    async fn create_user(&self, user: NewUser) -> Result<User> {
        if self.faults().fail_on_create_user {
            return Err(unavailable("create_user"));
        }

        let mut tables = self.tables.write().await;
        if tables.users.values().any(|u| u.email == user.email) {
            return Err(StorageError::UniqueViolation(format!(
                "users.email = {}",
                user.email
            )));
        }

        tables.next_user_id += 1;
        let now = Utc::now();
        let user = User {
            id: UserId::new(tables.next_user_id),
            username: user.username,
            email: user.email,
            created_at: now,
            updated_at: now,
        };
        tables.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn get_user(&self, id: UserId) -> Result<Option<User>> {
        Ok(self.tables.read().await.users.get(&id).cloned())
    }

    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        Ok(self
            .tables
            .read()
            .await
            .users
            .values()
            .find(|u| u.email == email)
            .cloned())
    }

    async fn delete_user(&self, id: UserId) -> Result<()> {
        if self.faults().fail_on_delete_user {
            return Err(unavailable("delete_user"));
        }

        match self.tables.write().await.users.remove(&id) {
            Some(_) => Ok(()),
            None => Err(StorageError::NotFound {
                entity: "user",
                id: id.get(),
            }),
        }
    }
}

#[async_trait]
impl OrderStore for InMemoryStore {
    async fn create_order(&self, order: NewOrder) -> Result<Order> {
        let faults = *self.faults();
        if let Some(delay) = faults.create_order_delay {
            tokio::time::sleep(delay).await;
        }
        if faults.fail_on_create_order {
            return Err(unavailable("create_order"));
        }

        let mut tables = self.tables.write().await;
        tables.next_order_id += 1;
        let now = Utc::now();
        let order = Order {
            id: OrderId::new(tables.next_order_id),
            user_id: order.user_id,
            items: order.items,
            amount: order.amount,
            status: order.status,
            created_at: now,
            updated_at: now,
        };
        tables.orders.insert(order.id, order.clone());
        Ok(order)
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>> {
        Ok(self.tables.read().await.orders.get(&id).cloned())
    }

    async fn get_orders_by_user(&self, user_id: UserId, page: PageRequest) -> Result<Vec<Order>> {
        let tables = self.tables.read().await;
        let orders = tables
            .orders
            .values()
            .rev()
            .filter(|o| o.user_id == user_id)
            .cloned();
        Ok(page.apply(orders))
    }

    async fn count_orders_by_user(&self, user_id: UserId) -> Result<u64> {
        let tables = self.tables.read().await;
        Ok(tables
            .orders
            .values()
            .filter(|o| o.user_id == user_id)
            .count() as u64)
    }
}

#[async_trait]
impl NotificationStore for InMemoryStore {
    async fn create_notification(&self, notification: NewNotification) -> Result<Notification> {
        let faults = *self.faults();
        if let Some(delay) = faults.create_notification_delay {
            tokio::time::sleep(delay).await;
        }
        if faults.fail_on_create_notification {
            return Err(unavailable("create_notification"));
        }

        let mut tables = self.tables.write().await;
        tables.next_notification_id += 1;
        let now = Utc::now();
        let notification = Notification {
            id: NotificationId::new(tables.next_notification_id),
            user_id: notification.user_id,
            email: notification.email,
            subject: notification.subject,
            message: notification.message,
            status: NotificationStatus::Pending,
            created_at: now,
            updated_at: now,
        };
        tables
            .notifications
            .insert(notification.id, notification.clone());
        Ok(notification)
    }

    async fn update_notification_status(
        &self,
        id: NotificationId,
        status: NotificationStatus,
    ) -> Result<()> {
        if self.faults().fail_on_update_status {
            return Err(unavailable("update_notification_status"));
        }

        let mut tables = self.tables.write().await;
        let notification = tables
            .notifications
            .get_mut(&id)
            .ok_or(StorageError::NotFound {
                entity: "notification",
                id: id.get(),
            })?;
        notification.status = status;
        notification.updated_at = Utc::now();
        Ok(())
    }

    async fn get_notification(&self, id: NotificationId) -> Result<Option<Notification>> {
        Ok(self.tables.read().await.notifications.get(&id).cloned())
    }

    async fn list_notifications_by_user(
        &self,
        user_id: UserId,
        page: PageRequest,
    ) -> Result<Page<Notification>> {
        let tables = self.tables.read().await;
        let matching: Vec<&Notification> = tables
            .notifications
            .values()
            .rev()
            .filter(|n| n.user_id == user_id)
            .collect();
        let total = matching.len() as u64;
        Ok(Page::new(page.apply(matching.into_iter().cloned()), total))
    }

    async fn list_all_notifications(&self, page: PageRequest) -> Result<Page<Notification>> {
        let tables = self.tables.read().await;
        let total = tables.notifications.len() as u64;
        let items = page.apply(tables.notifications.values().rev().cloned());
        Ok(Page::new(items, total))
    }
}
