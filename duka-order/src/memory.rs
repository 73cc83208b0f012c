//! In-process implementations of the store and collaborator contracts.
//! Used by tests and by servers started without a database URL.

use async_trait::async_trait;
use chrono::Utc;
use duka_core::identity::{ContactDirectory, UserContact};
use duka_core::mail::{MailError, MailRelay, OutboundMail};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use tokio::sync::RwLock;

use crate::models::{
    Delivery, DeliveryDraft, DeliveryStatus, DeliveryUpdate, Notification, Order, OrderDraft, OrderStatus,
};
use crate::repository::{DeliveryRepository, NotificationRepository, OrderRepository, RepoError};

#[derive(Default)]
pub struct MemoryOrderRepository {
    next_id: AtomicI64,
    orders: RwLock<BTreeMap<i64, Order>>,
}

impl MemoryOrderRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OrderRepository for MemoryOrderRepository {
    async fn create_order(&self, draft: &OrderDraft) -> Result<Order, RepoError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let order = Order {
            id,
            user_id: draft.user_id,
            status: draft.status,
            total: draft.total,
            items: draft.items.clone(),
            created_at: Utc::now(),
        };
        self.orders.write().await.insert(id, order.clone());
        Ok(order)
    }

    async fn get_order(&self, id: i64) -> Result<Option<Order>, RepoError> {
        Ok(self.orders.read().await.get(&id).cloned())
    }

    async fn list_orders(&self) -> Result<Vec<Order>, RepoError> {
        Ok(self.orders.read().await.values().cloned().collect())
    }

    async fn list_orders_for_user(&self, user_id: i64) -> Result<Vec<Order>, RepoError> {
        Ok(self
            .orders
            .read()
            .await
            .values()
            .filter(|o| o.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn update_order_status(&self, id: i64, status: OrderStatus) -> Result<Option<Order>, RepoError> {
        let mut orders = self.orders.write().await;
        Ok(orders.get_mut(&id).map(|order| {
            order.status = status;
            order.clone()
        }))
    }
}

#[derive(Default)]
pub struct MemoryDeliveryRepository {
    next_id: AtomicI64,
    deliveries: RwLock<BTreeMap<i64, Delivery>>,
    failing_creates: AtomicUsize,
}

impl MemoryDeliveryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` creates fail, to exercise reconciliation.
    pub fn fail_next_creates(&self, n: usize) {
        self.failing_creates.store(n, Ordering::SeqCst);
    }
}

#[async_trait]
impl DeliveryRepository for MemoryDeliveryRepository {
    async fn create_delivery(&self, draft: &DeliveryDraft) -> Result<Delivery, RepoError> {
        let should_fail = self
            .failing_creates
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if should_fail {
            return Err("delivery store unavailable".into());
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let delivery = Delivery {
            id,
            order_id: draft.order_id,
            assigned_crew_id: None,
            status: draft.status,
            tracking_info: draft.tracking_info.clone(),
            created_at: Utc::now(),
        };
        self.deliveries.write().await.insert(id, delivery.clone());
        Ok(delivery)
    }

    async fn get_delivery(&self, id: i64) -> Result<Option<Delivery>, RepoError> {
        Ok(self.deliveries.read().await.get(&id).cloned())
    }

    async fn find_by_order(&self, order_id: i64) -> Result<Option<Delivery>, RepoError> {
        Ok(self
            .deliveries
            .read()
            .await
            .values()
            .find(|d| d.order_id == order_id)
            .cloned())
    }

    async fn list_deliveries(&self) -> Result<Vec<Delivery>, RepoError> {
        Ok(self.deliveries.read().await.values().cloned().collect())
    }

    async fn update_delivery(&self, id: i64, update: &DeliveryUpdate) -> Result<Option<Delivery>, RepoError> {
        let mut deliveries = self.deliveries.write().await;
        let Some(delivery) = deliveries.get_mut(&id) else {
            return Ok(None);
        };
        if delivery.status == DeliveryStatus::Delivered
            && update.status.is_some_and(|next| next != DeliveryStatus::Delivered)
        {
            return Ok(None);
        }
        if let Some(status) = update.status {
            delivery.status = status;
        }
        if let Some(info) = &update.tracking_info {
            delivery.tracking_info = Some(info.clone());
        }
        if let Some(crew) = update.assigned_crew_id {
            delivery.assigned_crew_id = Some(crew);
        }
        Ok(Some(delivery.clone()))
    }
}

#[derive(Default)]
pub struct MemoryNotificationRepository {
    next_id: AtomicI64,
    notifications: RwLock<Vec<Notification>>,
}

impl MemoryNotificationRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl NotificationRepository for MemoryNotificationRepository {
    async fn create_notification(&self, user_id: i64, message: &str) -> Result<Notification, RepoError> {
        let notification = Notification {
            id: self.next_id.fetch_add(1, Ordering::SeqCst) + 1,
            user_id,
            message: message.to_string(),
            is_read: false,
            created_at: Utc::now(),
        };
        self.notifications.write().await.push(notification.clone());
        Ok(notification)
    }

    async fn list_for_user(&self, user_id: i64) -> Result<Vec<Notification>, RepoError> {
        Ok(self
            .notifications
            .read()
            .await
            .iter()
            .filter(|n| n.user_id == user_id)
            .cloned()
            .collect())
    }
}

/// Fixed set of user contacts.
#[derive(Default)]
pub struct StaticDirectory {
    contacts: HashMap<i64, UserContact>,
}

impl StaticDirectory {
    pub fn new(contacts: impl IntoIterator<Item = UserContact>) -> Self {
        Self {
            contacts: contacts.into_iter().map(|c| (c.id, c)).collect(),
        }
    }
}

#[async_trait]
impl ContactDirectory for StaticDirectory {
    async fn find_contact(&self, user_id: i64) -> Result<Option<UserContact>, RepoError> {
        Ok(self.contacts.get(&user_id).cloned())
    }
}

/// Mail relay that keeps messages in memory instead of sending them.
#[derive(Default)]
pub struct MemoryMailbox {
    sent: RwLock<Vec<OutboundMail>>,
    unreachable: AtomicBool,
    attempts: AtomicUsize,
}

impl MemoryMailbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub async fn sent(&self) -> Vec<OutboundMail> {
        self.sent.read().await.clone()
    }
}

#[async_trait]
impl MailRelay for MemoryMailbox {
    async fn send(&self, mail: &OutboundMail) -> Result<String, MailError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(MailError::Unreachable("memory mailbox offline".to_string()));
        }
        let mut sent = self.sent.write().await;
        sent.push(mail.clone());
        Ok(format!("250 queued as mem-{}", sent.len()))
    }
}
