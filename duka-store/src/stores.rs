use duka_core::identity::ContactDirectory;
use duka_order::memory::{
    MemoryDeliveryRepository, MemoryNotificationRepository, MemoryOrderRepository, StaticDirectory,
};
use duka_order::repository::{DeliveryRepository, NotificationRepository, OrderRepository};
use std::sync::Arc;

use crate::app_config::DatabaseConfig;
use crate::error::StoreError;
use crate::{
    DbClient, StoreContactDirectory, StoreDeliveryRepository, StoreNotificationRepository,
    StoreOrderRepository,
};

/// The repositories the engine runs on, Postgres-backed or in-memory.
#[derive(Clone)]
pub struct Stores {
    pub orders: Arc<dyn OrderRepository>,
    pub deliveries: Arc<dyn DeliveryRepository>,
    pub notifications: Arc<dyn NotificationRepository>,
    pub directory: Arc<dyn ContactDirectory>,
}

impl Stores {
    pub async fn open(cfg: &DatabaseConfig) -> Result<Self, StoreError> {
        match DbClient::from_config(cfg).await? {
            Some(db) => {
                db.migrate().await?;
                Ok(Self::postgres(&db))
            }
            None => {
                tracing::warn!("No database url configured, data will not survive a restart");
                Ok(Self::in_memory())
            }
        }
    }

    pub fn postgres(db: &DbClient) -> Self {
        Self {
            orders: Arc::new(StoreOrderRepository::new(db.pool.clone())),
            deliveries: Arc::new(StoreDeliveryRepository::new(db.pool.clone())),
            notifications: Arc::new(StoreNotificationRepository::new(db.pool.clone())),
            directory: Arc::new(StoreContactDirectory::new(db.pool.clone())),
        }
    }

    /// No user accounts exist here, so invoices are skipped.
    pub fn in_memory() -> Self {
        Self {
            orders: Arc::new(MemoryOrderRepository::new()),
            deliveries: Arc::new(MemoryDeliveryRepository::new()),
            notifications: Arc::new(MemoryNotificationRepository::new()),
            directory: Arc::new(StaticDirectory::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_without_url_falls_back_to_memory() {
        let stores = Stores::open(&DatabaseConfig { url: Some("  ".to_string()), max_connections: 1 })
            .await
            .unwrap();

        assert!(stores.orders.list_orders().await.unwrap().is_empty());
        assert!(stores.directory.find_contact(1).await.unwrap().is_none());
    }
}
