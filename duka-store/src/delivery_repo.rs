use async_trait::async_trait;
use chrono::{DateTime, Utc};
use duka_order::models::{Delivery, DeliveryDraft, DeliveryStatus, DeliveryUpdate};
use duka_order::repository::{DeliveryRepository, RepoError};
use sqlx::PgPool;

const DELIVERY_COLUMNS: &str = "id, order_id, assigned_crew_id, status, tracking_info, created_at";

pub struct StoreDeliveryRepository {
    pool: PgPool,
}

impl StoreDeliveryRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct DeliveryRow {
    id: i64,
    order_id: i64,
    assigned_crew_id: Option<i64>,
    status: String,
    tracking_info: Option<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<DeliveryRow> for Delivery {
    type Error = RepoError;

    fn try_from(row: DeliveryRow) -> Result<Self, Self::Error> {
        Ok(Delivery {
            id: row.id,
            order_id: row.order_id,
            assigned_crew_id: row.assigned_crew_id,
            status: row.status.parse::<DeliveryStatus>()?,
            tracking_info: row.tracking_info,
            created_at: row.created_at,
        })
    }
}

#[async_trait]
impl DeliveryRepository for StoreDeliveryRepository {
    async fn create_delivery(&self, draft: &DeliveryDraft) -> Result<Delivery, RepoError> {
        let row = sqlx::query_as::<_, DeliveryRow>(&format!(
            "INSERT INTO deliveries (order_id, status, tracking_info) VALUES ($1, $2, $3) RETURNING {}",
            DELIVERY_COLUMNS
        ))
        .bind(draft.order_id)
        .bind(draft.status.as_str())
        .bind(draft.tracking_info.as_deref())
        .fetch_one(&self.pool)
        .await?;

        row.try_into()
    }

    async fn get_delivery(&self, id: i64) -> Result<Option<Delivery>, RepoError> {
        let row = sqlx::query_as::<_, DeliveryRow>(&format!(
            "SELECT {} FROM deliveries WHERE id = $1",
            DELIVERY_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Delivery::try_from).transpose()
    }

    async fn find_by_order(&self, order_id: i64) -> Result<Option<Delivery>, RepoError> {
        let row = sqlx::query_as::<_, DeliveryRow>(&format!(
            "SELECT {} FROM deliveries WHERE order_id = $1 ORDER BY id LIMIT 1",
            DELIVERY_COLUMNS
        ))
        .bind(order_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Delivery::try_from).transpose()
    }

    async fn list_deliveries(&self) -> Result<Vec<Delivery>, RepoError> {
        let rows = sqlx::query_as::<_, DeliveryRow>(&format!(
            "SELECT {} FROM deliveries ORDER BY id",
            DELIVERY_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Delivery::try_from).collect()
    }

    async fn update_delivery(&self, id: i64, update: &DeliveryUpdate) -> Result<Option<Delivery>, RepoError> {
        // absent fields keep their stored value; a delivered row only
        // accepts a status of delivered
        let row = sqlx::query_as::<_, DeliveryRow>(&format!(
            "UPDATE deliveries SET \
                status = COALESCE($2, status), \
                tracking_info = COALESCE($3, tracking_info), \
                assigned_crew_id = COALESCE($4, assigned_crew_id) \
             WHERE id = $1 \
               AND (status <> 'delivered' OR $2 IS NULL OR $2 = 'delivered') \
             RETURNING {}",
            DELIVERY_COLUMNS
        ))
        .bind(id)
        .bind(update.status.as_ref().map(|s| s.as_str()))
        .bind(update.tracking_info.as_deref())
        .bind(update.assigned_crew_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Delivery::try_from).transpose()
    }
}
