use async_trait::async_trait;

use crate::models::{
    Delivery, DeliveryDraft, DeliveryUpdate, Notification, Order, OrderDraft, OrderStatus,
};

pub type RepoError = Box<dyn std::error::Error + Send + Sync>;

/// Repository trait for order data access
#[async_trait]
pub trait OrderRepository: Send + Sync {
    async fn create_order(&self, draft: &OrderDraft) -> Result<Order, RepoError>;

    async fn get_order(&self, id: i64) -> Result<Option<Order>, RepoError>;

    async fn list_orders(&self) -> Result<Vec<Order>, RepoError>;

    async fn list_orders_for_user(&self, user_id: i64) -> Result<Vec<Order>, RepoError>;

    /// Returns `None` when no order has this id.
    async fn update_order_status(
        &self,
        id: i64,
        status: OrderStatus,
    ) -> Result<Option<Order>, RepoError>;
}

/// Repository trait for delivery data access
#[async_trait]
pub trait DeliveryRepository: Send + Sync {
    async fn create_delivery(&self, draft: &DeliveryDraft) -> Result<Delivery, RepoError>;

    async fn get_delivery(&self, id: i64) -> Result<Option<Delivery>, RepoError>;

    async fn find_by_order(&self, order_id: i64) -> Result<Option<Delivery>, RepoError>;

    async fn list_deliveries(&self) -> Result<Vec<Delivery>, RepoError>;

    /// Writes nothing and returns `None` when the row is missing or is
    /// delivered and the update names another status. The check and the
    /// write are one atomic step.
    async fn update_delivery(
        &self,
        id: i64,
        update: &DeliveryUpdate,
    ) -> Result<Option<Delivery>, RepoError>;
}

/// Repository trait for the in-app notification feed
#[async_trait]
pub trait NotificationRepository: Send + Sync {
    async fn create_notification(&self, user_id: i64, message: &str) -> Result<Notification, RepoError>;

    async fn list_for_user(&self, user_id: i64) -> Result<Vec<Notification>, RepoError>;
}
