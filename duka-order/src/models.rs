use chrono::{DateTime, Utc};
use duka_shared::Money;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Order status in the lifecycle
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Processing,
    Shipped,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 5] = [
        OrderStatus::Pending,
        OrderStatus::Processing,
        OrderStatus::Shipped,
        OrderStatus::Delivered,
        OrderStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Processing => "processing",
            OrderStatus::Shipped => "shipped",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown status '{0}'")]
pub struct UnknownStatus(pub String);

impl FromStr for OrderStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OrderStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| UnknownStatus(s.to_string()))
    }
}

/// A single product line within an order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    pub product_id: i64,
    pub quantity: i64,
    pub price: Money,
}

impl OrderItem {
    pub fn line_total(&self) -> Option<Money> {
        u32::try_from(self.quantity).ok().and_then(|q| self.price.checked_mul(q))
    }
}

/// The single source of truth for a customer's purchase
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: i64,
    pub user_id: i64,
    pub status: OrderStatus,
    pub total: Money,
    pub items: Vec<OrderItem>,
    pub created_at: DateTime<Utc>,
}

impl Order {
    /// Sum of line totals. Informational only: `total` is what the customer
    /// was quoted and is stored as given.
    pub fn items_total(&self) -> Option<Money> {
        self.items
            .iter()
            .try_fold(Money::ZERO, |acc, item| acc.checked_add(item.line_total()?))
    }
}

/// Placement request as submitted by the client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewOrder {
    pub user_id: i64,
    /// Accepted for wire compatibility and ignored: new orders start pending.
    #[serde(default)]
    pub status: Option<String>,
    pub total: Money,
    pub items: Vec<OrderItem>,
}

/// Validated order ready to persist.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderDraft {
    pub user_id: i64,
    pub status: OrderStatus,
    pub total: Money,
    pub items: Vec<OrderItem>,
}

impl NewOrder {
    pub fn validate(self) -> Result<OrderDraft, String> {
        if self.items.is_empty() {
            return Err("order must contain at least one item".to_string());
        }
        if self.total.is_negative() {
            return Err(format!("total must not be negative: {}", self.total));
        }
        for (idx, item) in self.items.iter().enumerate() {
            if item.quantity <= 0 {
                return Err(format!("items[{}].quantity must be greater than zero", idx));
            }
            if item.price.is_negative() {
                return Err(format!("items[{}].price must not be negative", idx));
            }
        }

        Ok(OrderDraft {
            user_id: self.user_id,
            status: OrderStatus::Pending,
            total: self.total,
            items: self.items,
        })
    }
}

/// Delivery status, independent of the order status namespace
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Pending,
    OutForDelivery,
    Delivered,
}

impl DeliveryStatus {
    pub const ALL: [DeliveryStatus; 3] = [
        DeliveryStatus::Pending,
        DeliveryStatus::OutForDelivery,
        DeliveryStatus::Delivered,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryStatus::Pending => "pending",
            DeliveryStatus::OutForDelivery => "out_for_delivery",
            DeliveryStatus::Delivered => "delivered",
        }
    }
}

impl fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeliveryStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DeliveryStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| UnknownStatus(s.to_string()))
    }
}

/// Shipment record spawned for every order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Delivery {
    pub id: i64,
    pub order_id: i64,
    pub assigned_crew_id: Option<i64>,
    pub status: DeliveryStatus,
    pub tracking_info: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeliveryDraft {
    pub order_id: i64,
    pub status: DeliveryStatus,
    pub tracking_info: Option<String>,
}

/// Partial update from the delivery crew. Absent fields are left alone.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryUpdate {
    #[serde(default)]
    pub status: Option<DeliveryStatus>,
    #[serde(default)]
    pub tracking_info: Option<String>,
    #[serde(default)]
    pub assigned_crew_id: Option<i64>,
}

impl DeliveryUpdate {
    pub fn is_empty(&self) -> bool {
        self.status.is_none() && self.tracking_info.is_none() && self.assigned_crew_id.is_none()
    }
}

/// In-app feed entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: i64,
    pub user_id: i64,
    pub message: String,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}
