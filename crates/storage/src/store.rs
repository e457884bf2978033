use std::sync::Arc;

use async_trait::async_trait;
use common::{NotificationId, OrderId, Page, PageRequest, UserId};
use domain::{NewNotification, NewOrder, NewUser, Notification, NotificationStatus, Order, User};

use crate::Result;

/// Persistence for registered users.
///
/// All implementations must be thread-safe (Send + Sync); uniqueness of the
/// email address is enforced by the store, not by callers.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Inserts a user and returns it with its assigned id.
    ///
    /// Fails with `UniqueViolation` if the email is already taken.
    async fn create_user(&self, user: NewUser) -> Result<User>;

    /// Loads a user by id.
    async fn get_user(&self, id: UserId) -> Result<Option<User>>;

    /// Loads a user by email address.
    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>>;

    /// Deletes a user. Fails with `NotFound` if the user does not exist.
    async fn delete_user(&self, id: UserId) -> Result<()>;
}

/// Persistence for orders.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Inserts an order and returns it with its assigned id and timestamps.
    async fn create_order(&self, order: NewOrder) -> Result<Order>;

    /// Loads an order by id.
    async fn get_order(&self, id: OrderId) -> Result<Option<Order>>;

    /// Lists a user's orders, newest first.
    async fn get_orders_by_user(&self, user_id: UserId, page: PageRequest) -> Result<Vec<Order>>;

    /// Counts all orders of a user, under the same filter as `get_orders_by_user`.
    async fn count_orders_by_user(&self, user_id: UserId) -> Result<u64>;
}

/// Persistence for notification records.
#[async_trait]
pub trait NotificationStore: Send + Sync {
    /// Inserts a notification in `Pending` status.
    async fn create_notification(&self, notification: NewNotification) -> Result<Notification>;

    /// Sets the status and bumps `updated_at`. Fails with `NotFound` if the
    /// row does not exist.
    async fn update_notification_status(
        &self,
        id: NotificationId,
        status: NotificationStatus,
    ) -> Result<()>;

    /// Loads a notification by id.
    async fn get_notification(&self, id: NotificationId) -> Result<Option<Notification>>;

    /// Lists a user's notifications, newest first, with the user's total.
    async fn list_notifications_by_user(
        &self,
        user_id: UserId,
        page: PageRequest,
    ) -> Result<Page<Notification>>;

    /// Lists all notifications, newest first, with the overall total.
    async fn list_all_notifications(&self, page: PageRequest) -> Result<Page<Notification>>;
}

#[async_trait]
impl<T: UserStore + ?Sized> UserStore for Arc<T> {
    async fn create_user(&self, user: NewUser) -> Result<User> {
        (**self).create_user(user).await
    }

    async fn get_user(&self, id: UserId) -> Result<Option<User>> {
        (**self).get_user(id).await
    }

    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        (**self).get_user_by_email(email).await
    }

    async fn delete_user(&self, id: UserId) -> Result<()> {
        (**self).delete_user(id).await
    }
}

#[async_trait]
impl<T: OrderStore + ?Sized> OrderStore for Arc<T> {
    async fn create_order(&self, order: NewOrder) -> Result<Order> {
        (**self).create_order(order).await
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>> {
        (**self).get_order(id).await
    }

    async fn get_orders_by_user(&self, user_id: UserId, page: PageRequest) -> Result<Vec<Order>> {
        (**self).get_orders_by_user(user_id, page).await
    }

    async fn count_orders_by_user(&self, user_id: UserId) -> Result<u64> {
        (**self).count_orders_by_user(user_id).await
    }
}

#[async_trait]
impl<T: NotificationStore + ?Sized> NotificationStore for Arc<T> {
    async fn create_notification(&self, notification: NewNotification) -> Result<Notification> {
        (**self).create_notification(notification).await
    }

    async fn update_notification_status(
        &self,
        id: NotificationId,
        status: NotificationStatus,
    ) -> Result<()> {
        (**self).update_notification_status(id, status).await
    }

    async fn get_notification(&self, id: NotificationId) -> Result<Option<Notification>> {
        (**self).get_notification(id).await
    }

    async fn list_notifications_by_user(
        &self,
        user_id: UserId,
        page: PageRequest,
    ) -> Result<Page<Notification>> {
        (**self).list_notifications_by_user(user_id, page).await
    }

    async fn list_all_notifications(&self, page: PageRequest) -> Result<Page<Notification>> {
        (**self).list_all_notifications(page).await
    }
}
