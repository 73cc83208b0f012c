use async_trait::async_trait;
use duka_order::models::Notification;
use duka_order::repository::{NotificationRepository, RepoError};
use sqlx::PgPool;

pub struct StoreNotificationRepository {
    pool: PgPool,
}

impl StoreNotificationRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct NotificationRow {
    id: i64,
    user_id: i64,
    message: String,
    is_read: bool,
    created_at: chrono::DateTime<chrono::Utc>,
}

impl From<NotificationRow> for Notification {
    fn from(row: NotificationRow) -> Self {
        Notification {
            id: row.id,
            user_id: row.user_id,
            message: row.message,
            is_read: row.is_read,
            created_at: row.created_at,
        }
    }
}

#[async_trait]
impl NotificationRepository for StoreNotificationRepository {
    async fn create_notification(&self, user_id: i64, message: &str) -> Result<Notification, RepoError> {
        let row = sqlx::query_as::<_, NotificationRow>(
            "INSERT INTO notifications (user_id, message) VALUES ($1, $2) \
             RETURNING id, user_id, message, is_read, created_at",
        )
        .bind(user_id)
        .bind(message)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.into())
    }

    async fn list_for_user(&self, user_id: i64) -> Result<Vec<Notification>, RepoError> {
        let rows = sqlx::query_as::<_, NotificationRow>(
            "SELECT id, user_id, message, is_read, created_at FROM notifications \
             WHERE user_id = $1 ORDER BY id",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Notification::from).collect())
    }
}
