use async_trait::async_trait;
use duka_core::identity::{ContactDirectory, UserContact};
use duka_shared::Masked;
use sqlx::PgPool;

/// Reads the `users` table owned by the auth service.
pub struct StoreContactDirectory {
    pool: PgPool,
}

impl StoreContactDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct ContactRow {
    id: i64,
    name: Option<String>,
    email: Option<String>,
}

#[async_trait]
impl ContactDirectory for StoreContactDirectory {
    async fn find_contact(
        &self,
        user_id: i64,
    ) -> Result<Option<UserContact>, Box<dyn std::error::Error + Send + Sync>> {
        let row = sqlx::query_as::<_, ContactRow>("SELECT id, name, email FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|r| UserContact {
            id: r.id,
            name: r.name,
            email: r.email.map(Masked),
        }))
    }
}
