use async_trait::async_trait;
use common::{Money, NotificationId, OrderId, Page, PageRequest, UserId};
use domain::{
    NewNotification, NewOrder, NewUser, Notification, NotificationStatus, Order, OrderItem,
    OrderStatus, User,
};
use sqlx::{PgPool, Row, postgres::PgRow};

use crate::{
    Result, StorageError,
    store::{NotificationStore, OrderStore, UserStore},
};

const USER_COLUMNS: &str = "id, username, email, created_at, updated_at";
const ORDER_COLUMNS: &str = "id, user_id, items, amount_cents, status, created_at, updated_at";
const NOTIFICATION_COLUMNS: &str =
    "id, user_id, email, subject, message, status, created_at, updated_at";

/// PostgreSQL-backed store implementing all three store traits.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Creates a new PostgreSQL store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connects to the database at `url`.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(10)
            .connect(url)
            .await?;
        Ok(Self::new(pool))
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    /// Closes the connection pool, waiting for checked-out connections.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    fn row_to_user(row: PgRow) -> Result<User> {
        Ok(User {
            id: UserId::new(row.try_get::<i64, _>("id")? as u64),
            username: row.try_get("username")?,
            email: row.try_get("email")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn row_to_order(row: PgRow) -> Result<Order> {
        let items: serde_json::Value = row.try_get("items")?;
        let items: Vec<OrderItem> = serde_json::from_value(items)?;
        let status: String = row.try_get("status")?;

        Ok(Order {
            id: OrderId::new(row.try_get::<i64, _>("id")? as u64),
            user_id: UserId::new(row.try_get::<i64, _>("user_id")? as u64),
            items,
            amount: Money::from_cents(row.try_get("amount_cents")?),
            status: status.parse::<OrderStatus>().map_err(StorageError::InvalidData)?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn row_to_notification(row: PgRow) -> Result<Notification> {
        let status: String = row.try_get("status")?;

        Ok(Notification {
            id: NotificationId::new(row.try_get::<i64, _>("id")? as u64),
            user_id: UserId::new(row.try_get::<i64, _>("user_id")? as u64),
            email: row.try_get("email")?,
            subject: row.try_get("subject")?,
            message: row.try_get("message")?,
            status: status
                .parse::<NotificationStatus>()
                .map_err(StorageError::InvalidData)?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

fn as_db_id(id: u64) -> i64 {
    id as i64
}

#[async_trait]
impl UserStore for PostgresStore {
    async fn create_user(&self, user: NewUser) -> Result<User> {
        let query = format!(
            "INSERT INTO users (username, email) VALUES ($1, $2) RETURNING {USER_COLUMNS}"
        );
        let row = sqlx::query(&query)
            .bind(&user.username)
            .bind(&user.email)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                if let sqlx::Error::Database(ref db_err) = e
                    && db_err.is_unique_violation()
                {
                    return StorageError::UniqueViolation(format!("users.email = {}", user.email));
                }
                StorageError::Database(e)
            })?;

        Self::row_to_user(row)
    }

    async fn get_user(&self, id: UserId) -> Result<Option<User>> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        sqlx::query(&query)
            .bind(as_db_id(id.get()))
            .fetch_optional(&self.pool)
            .await?
            .map(Self::row_to_user)
            .transpose()
    }

    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1");
        sqlx::query(&query)
            .bind(email)
            .fetch_optional(&self.pool)
            .await?
            .map(Self::row_to_user)
            .transpose()
    }

    async fn delete_user(&self, id: UserId) -> Result<()> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(as_db_id(id.get()))
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound {
                entity: "user",
                id: id.get(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl OrderStore for PostgresStore {
    async fn create_order(&self, order: NewOrder) -> Result<Order> {
        let items = serde_json::to_value(&order.items)?;
        let query = format!(
            r#"
            INSERT INTO orders (user_id, items, amount_cents, status)
            VALUES ($1, $2, $3, $4)
            RETURNING {ORDER_COLUMNS}
            "#
        );
        let row = sqlx::query(&query)
            .bind(as_db_id(order.user_id.get()))
            .bind(items)
            .bind(order.amount.cents())
            .bind(order.status.as_str())
            .fetch_one(&self.pool)
            .await?;

        Self::row_to_order(row)
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>> {
        let query = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1");
        sqlx::query(&query)
            .bind(as_db_id(id.get()))
            .fetch_optional(&self.pool)
            .await?
            .map(Self::row_to_order)
            .transpose()
    }

    async fn get_orders_by_user(&self, user_id: UserId, page: PageRequest) -> Result<Vec<Order>> {
        let query = format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE user_id = $1 ORDER BY id DESC LIMIT $2 OFFSET $3"
        );
        let rows = sqlx::query(&query)
            .bind(as_db_id(user_id.get()))
            .bind(page.limit as i64)
            .bind(page.offset as i64)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(Self::row_to_order).collect()
    }

    async fn count_orders_by_user(&self, user_id: UserId) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM orders WHERE user_id = $1")
            .bind(as_db_id(user_id.get()))
            .fetch_one(&self.pool)
            .await?;
        Ok(count as u64)
    }
}

#[async_trait]
impl NotificationStore for PostgresStore {
    async fn create_notification(&self, notification: NewNotification) -> Result<Notification> {
        let query = format!(
            r#"
            INSERT INTO notifications (user_id, email, subject, message, status)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {NOTIFICATION_COLUMNS}
            "#
        );
        let row = sqlx::query(&query)
            .bind(as_db_id(notification.user_id.get()))
            .bind(&notification.email)
            .bind(&notification.subject)
            .bind(&notification.message)
            .bind(NotificationStatus::Pending.as_str())
            .fetch_one(&self.pool)
            .await?;

        Self::row_to_notification(row)
    }

    async fn update_notification_status(
        &self,
        id: NotificationId,
        status: NotificationStatus,
    ) -> Result<()> {
        let result =
            sqlx::query("UPDATE notifications SET status = $1, updated_at = NOW() WHERE id = $2")
                .bind(status.as_str())
                .bind(as_db_id(id.get()))
                .execute(&self.pool)
                .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound {
                entity: "notification",
                id: id.get(),
            });
        }
        Ok(())
    }

    async fn get_notification(&self, id: NotificationId) -> Result<Option<Notification>> {
        let query = format!("SELECT {NOTIFICATION_COLUMNS} FROM notifications WHERE id = $1");
        sqlx::query(&query)
            .bind(as_db_id(id.get()))
            .fetch_optional(&self.pool)
            .await?
            .map(Self::row_to_notification)
            .transpose()
    }

    async fn list_notifications_by_user(
        &self,
        user_id: UserId,
        page: PageRequest,
    ) -> Result<Page<Notification>> {
        let query = format!(
            "SELECT {NOTIFICATION_COLUMNS} FROM notifications WHERE user_id = $1 ORDER BY id DESC LIMIT $2 OFFSET $3"
        );
        let rows = sqlx::query(&query)
            .bind(as_db_id(user_id.get()))
            .bind(page.limit as i64)
            .bind(page.offset as i64)
            .fetch_all(&self.pool)
            .await?;
        let items = rows
            .into_iter()
            .map(Self::row_to_notification)
            .collect::<Result<Vec<_>>>()?;

        let total: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM notifications WHERE user_id = $1")
                .bind(as_db_id(user_id.get()))
                .fetch_one(&self.pool)
                .await?;

        Ok(Page::new(items, total as u64))
    }

    async fn list_all_notifications(&self, page: PageRequest) -> Result<Page<Notification>> {
        let query = format!(
            "SELECT {NOTIFICATION_COLUMNS} FROM notifications ORDER BY id DESC LIMIT $1 OFFSET $2"
        );
        let rows = sqlx::query(&query)
            .bind(page.limit as i64)
            .bind(page.offset as i64)
            .fetch_all(&self.pool)
            .await?;
        let items = rows
            .into_iter()
            .map(Self::row_to_notification)
            .collect::<Result<Vec<_>>>()?;

        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM notifications")
            .fetch_one(&self.pool)
            .await?;

        Ok(Page::new(items, total as u64))
    }
}
