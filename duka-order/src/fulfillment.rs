use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::models::{Delivery, DeliveryDraft, DeliveryStatus, DeliveryUpdate};
use crate::repository::{DeliveryRepository, RepoError};

/// Spawns and advances the delivery records that shadow each order
#[derive(Clone)]
pub struct DeliveryService {
    deliveries: Arc<dyn DeliveryRepository>,
}

impl DeliveryService {
    pub fn new(deliveries: Arc<dyn DeliveryRepository>) -> Self {
        Self { deliveries }
    }

    /// Create the pending delivery for a freshly placed order.
    pub async fn spawn_for_order(&self, order_id: i64) -> Result<Delivery, DeliveryError> {
        let draft = DeliveryDraft {
            order_id,
            status: DeliveryStatus::Pending,
            tracking_info: Some(tracking_token(Utc::now())),
        };
        let delivery = self.deliveries.create_delivery(&draft).await.map_err(DeliveryError::Storage)?;
        tracing::debug!(
            "Delivery {} spawned for order {} ({})",
            delivery.id,
            order_id,
            delivery.tracking_info.as_deref().unwrap_or_default()
        );
        Ok(delivery)
    }

    /// Create a delivery only if the order has none. Returns the delivery
    /// and whether it was created by this call.
    pub async fn ensure_for_order(&self, order_id: i64) -> Result<(Delivery, bool), DeliveryError> {
        if let Some(existing) = self.deliveries.find_by_order(order_id).await.map_err(DeliveryError::Storage)? {
            return Ok((existing, false));
        }
        let created = self.spawn_for_order(order_id).await?;
        Ok((created, true))
    }

    pub async fn list(&self) -> Result<Vec<Delivery>, DeliveryError> {
        self.deliveries.list_deliveries().await.map_err(DeliveryError::Storage)
    }

    pub async fn find_by_order(&self, order_id: i64) -> Result<Option<Delivery>, DeliveryError> {
        self.deliveries.find_by_order(order_id).await.map_err(DeliveryError::Storage)
    }

    /// Apply a crew/admin update. A delivered shipment keeps its status.
    pub async fn update(&self, id: i64, update: DeliveryUpdate) -> Result<Delivery, DeliveryError> {
        let current = self
            .deliveries
            .get_delivery(id)
            .await
            .map_err(DeliveryError::Storage)?
            .ok_or(DeliveryError::NotFound(id))?;

        if update.is_empty() {
            return Ok(current);
        }

        if let Some(next) = update.status {
            if current.status == DeliveryStatus::Delivered && next != DeliveryStatus::Delivered {
                return Err(DeliveryError::AlreadyDelivered(id));
            }
        }

        let Some(updated) = self
            .deliveries
            .update_delivery(id, &update)
            .await
            .map_err(DeliveryError::Storage)?
        else {
            // refused by the store: gone, or delivered since the read above
            return Err(match self.deliveries.get_delivery(id).await.map_err(DeliveryError::Storage)? {
                Some(_) => DeliveryError::AlreadyDelivered(id),
                None => DeliveryError::NotFound(id),
            });
        };

        if current.status != updated.status {
            tracing::info!("Delivery {} moved {} -> {}", id, current.status, updated.status);
        }
        Ok(updated)
    }
}

/// `TRK-<epoch millis>`. Two deliveries created in the same millisecond
/// share a token.
pub fn tracking_token(at: DateTime<Utc>) -> String {
    format!("TRK-{}", at.timestamp_millis())
}

#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("Delivery not found: {0}")]
    NotFound(i64),

    #[error("Delivery {0} is already delivered")]
    AlreadyDelivered(i64),

    #[error("Delivery storage failed: {0}")]
    Storage(RepoError),
}
