use duka_order::repository::NotificationRepository;
use duka_order::{DeliveryService, OrderManager};
use std::sync::Arc;

#[derive(Clone)]
pub struct AuthConfig {
    pub secret: String,
}

#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<OrderManager>,
    pub deliveries: DeliveryService,
    pub notifications: Arc<dyn NotificationRepository>,
    pub auth: AuthConfig,
}
