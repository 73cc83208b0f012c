use crate::{Masked, Money};

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct OrderPlacedEvent {
    pub order_id: i64,
    pub user_id: i64,
    pub total: Money,
    pub item_count: usize,
    pub delivery_id: Option<i64>,
    pub timestamp: i64,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct OrderStatusChangedEvent {
    pub order_id: i64,
    pub from: String,
    pub to: String,
    pub timestamp: i64,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct PaymentRequestedEvent {
    pub order_id: i64,
    pub amount: u64,
    pub phone: Masked<String>,
    pub outcome: String, // ACCEPTED | NOT_ACCEPTED | FAILED
    pub timestamp: i64,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct DeliveryReconciledEvent {
    pub order_id: i64,
    pub delivery_id: i64,
    pub timestamp: i64,
}
