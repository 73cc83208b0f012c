use async_trait::async_trait;
use chrono::{DateTime, Utc};
use duka_order::models::{Order, OrderDraft, OrderItem, OrderStatus};
use duka_order::repository::{OrderRepository, RepoError};
use duka_shared::Money;
use sqlx::types::Json;
use sqlx::PgPool;

const ORDER_COLUMNS: &str = "id, user_id, status, total_minor, items, created_at";

pub struct StoreOrderRepository {
    pool: PgPool,
}

impl StoreOrderRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: i64,
    user_id: i64,
    status: String,
    total_minor: i64,
    items: Json<Vec<OrderItem>>,
    created_at: DateTime<Utc>,
}

impl TryFrom<OrderRow> for Order {
    type Error = RepoError;

    fn try_from(row: OrderRow) -> Result<Self, Self::Error> {
        Ok(Order {
            id: row.id,
            user_id: row.user_id,
            status: row.status.parse::<OrderStatus>()?,
            total: Money::from_minor(row.total_minor),
            items: row.items.0,
            created_at: row.created_at,
        })
    }
}

#[async_trait]
impl OrderRepository for StoreOrderRepository {
    async fn create_order(&self, draft: &OrderDraft) -> Result<Order, RepoError> {
        let row = sqlx::query_as::<_, OrderRow>(&format!(
            "INSERT INTO orders (user_id, status, total_minor, items) VALUES ($1, $2, $3, $4) RETURNING {}",
            ORDER_COLUMNS
        ))
        .bind(draft.user_id)
        .bind(draft.status.as_str())
        .bind(draft.total.minor())
        .bind(Json(&draft.items))
        .fetch_one(&self.pool)
        .await?;

        row.try_into()
    }

    async fn get_order(&self, id: i64) -> Result<Option<Order>, RepoError> {
        let row = sqlx::query_as::<_, OrderRow>(&format!("SELECT {} FROM orders WHERE id = $1", ORDER_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(Order::try_from).transpose()
    }

    async fn list_orders(&self) -> Result<Vec<Order>, RepoError> {
        let rows = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {} FROM orders ORDER BY id",
            ORDER_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Order::try_from).collect()
    }

    async fn list_orders_for_user(&self, user_id: i64) -> Result<Vec<Order>, RepoError> {
        let rows = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {} FROM orders WHERE user_id = $1 ORDER BY id",
            ORDER_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Order::try_from).collect()
    }

    async fn update_order_status(&self, id: i64, status: OrderStatus) -> Result<Option<Order>, RepoError> {
        let row = sqlx::query_as::<_, OrderRow>(&format!(
            "UPDATE orders SET status = $2 WHERE id = $1 RETURNING {}",
            ORDER_COLUMNS
        ))
        .bind(id)
        .bind(status.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Order::try_from).transpose()
    }
}
