use chrono::Utc;
use duka_core::payment::{PaymentOutcome, PaymentRequest};
use duka_shared::models::events::{OrderPlacedEvent, OrderStatusChangedEvent, PaymentRequestedEvent};
use std::sync::Arc;

use crate::fulfillment::DeliveryService;
use crate::lifecycle::{LifecyclePolicy, PaymentPolicy};
use crate::models::{NewOrder, Order, OrderStatus};
use crate::orchestrator::PaymentOrchestrator;
use crate::outbox::{FollowUpJob, Outbox};
use crate::repository::{OrderRepository, RepoError};

/// Drives orders through their lifecycle.
///
/// Holds no order state of its own: every call reads and writes through the
/// injected repositories, so concurrent status changes on one order are
/// last-write-wins at the store.
pub struct OrderManager {
    orders: Arc<dyn OrderRepository>,
    deliveries: DeliveryService,
    payments: PaymentOrchestrator,
    outbox: Outbox,
    policy: LifecyclePolicy,
}

/// Result of a status change, including the payment side effect if one ran.
#[derive(Debug, Clone)]
pub struct StatusChange {
    pub order: Order,
    pub payment: Option<PaymentOutcome>,
}

impl OrderManager {
    pub fn new(
        orders: Arc<dyn OrderRepository>,
        deliveries: DeliveryService,
        payments: PaymentOrchestrator,
        outbox: Outbox,
        policy: LifecyclePolicy,
    ) -> Self {
        Self {
            orders,
            deliveries,
            payments,
            outbox,
            policy,
        }
    }

    pub fn policy(&self) -> LifecyclePolicy {
        self.policy
    }

    /// Place an order: persist it pending, spawn its delivery, queue the
    /// invoice. Only validation and the order write itself can fail the call.
    pub async fn place_order(&self, request: NewOrder) -> Result<Order, OrderError> {
        let draft = request.validate().map_err(OrderError::Validation)?;
        let order = self.orders.create_order(&draft).await.map_err(OrderError::Storage)?;

        let delivery_id = match self.deliveries.spawn_for_order(order.id).await {
            Ok(delivery) => Some(delivery.id),
            Err(e) => {
                tracing::error!("Order {} saved without a delivery: {}", order.id, e);
                self.outbox.enqueue(FollowUpJob::VerifyDelivery { order_id: order.id });
                None
            }
        };

        self.outbox.enqueue(FollowUpJob::SendInvoice { order_id: order.id });

        let event = OrderPlacedEvent {
            order_id: order.id,
            user_id: order.user_id,
            total: order.total,
            item_count: order.items.len(),
            delivery_id,
            timestamp: Utc::now().timestamp(),
        };
        tracing::info!(?event, "Order placed");

        Ok(order)
    }

    pub async fn get_order(&self, id: i64) -> Result<Order, OrderError> {
        self.orders
            .get_order(id)
            .await
            .map_err(OrderError::Storage)?
            .ok_or(OrderError::NotFound(id))
    }

    pub async fn list_orders(&self, owner: Option<i64>) -> Result<Vec<Order>, OrderError> {
        let orders = match owner {
            Some(user_id) => self.orders.list_orders_for_user(user_id).await,
            None => self.orders.list_orders().await,
        };
        orders.map_err(OrderError::Storage)
    }

    /// Write an arbitrary status, optionally pushing a payment prompt first.
    ///
    /// The target is validated before anything else happens. Under
    /// `PaymentPolicy::Advisory` the payment outcome is reported but never
    /// blocks the write, even when the payment fields were unusable.
    pub async fn change_status(
        &self,
        id: i64,
        target: &str,
        payment: Option<PaymentRequest>,
    ) -> Result<StatusChange, OrderError> {
        let target: OrderStatus = target
            .parse()
            .map_err(|e: crate::models::UnknownStatus| OrderError::Validation(e.to_string()))?;

        let current = self.get_order(id).await?;
        self.check_transition(current.status, target)?;

        let outcome = match payment {
            Some(request) => Some(self.collect_payment(id, &request).await),
            None => None,
        };

        if let Some(outcome) = &outcome {
            if self.policy.payment == PaymentPolicy::RequireAccepted && !outcome.is_accepted() {
                return Err(OrderError::PaymentNotAccepted(outcome.message()));
            }
        }

        let order = self.write_status(&current, target).await?;
        Ok(StatusChange { order, payment: outcome })
    }

    /// Move to the next status in the flow. Terminal orders are returned
    /// unchanged.
    pub async fn advance(&self, id: i64) -> Result<Order, OrderError> {
        let current = self.get_order(id).await?;
        let next = current.status.advance();
        if next == current.status {
            return Ok(current);
        }
        self.write_status(&current, next).await
    }

    pub async fn cancel(&self, id: i64) -> Result<Order, OrderError> {
        let current = self.get_order(id).await?;
        if current.status == OrderStatus::Cancelled {
            return Ok(current);
        }
        let target = current.status.cancel();
        self.check_transition(current.status, target)?;
        self.write_status(&current, target).await
    }

    fn check_transition(&self, from: OrderStatus, to: OrderStatus) -> Result<(), OrderError> {
        if self.policy.transitions.permits(from, to) {
            Ok(())
        } else {
            Err(OrderError::InvalidTransition { from, to })
        }
    }

    async fn collect_payment(&self, order_id: i64, request: &PaymentRequest) -> PaymentOutcome {
        let instructions = match request {
            PaymentRequest::Ready(instructions) => instructions,
            PaymentRequest::Unusable(reason) => {
                tracing::warn!("Payment for order {} not attempted: {}", order_id, reason);
                return PaymentOutcome::Failed { reason: reason.clone() };
            }
        };

        let outcome = self.payments.pay(instructions).await;
        let event = PaymentRequestedEvent {
            order_id,
            amount: instructions.amount,
            phone: instructions.phone.clone(),
            outcome: outcome.label().to_string(),
            timestamp: Utc::now().timestamp(),
        };
        tracing::info!(?event, "Payment requested");
        outcome
    }

    async fn write_status(&self, current: &Order, target: OrderStatus) -> Result<Order, OrderError> {
        let order = self
            .orders
            .update_order_status(current.id, target)
            .await
            .map_err(OrderError::Storage)?
            .ok_or(OrderError::NotFound(current.id))?;

        let event = OrderStatusChangedEvent {
            order_id: order.id,
            from: current.status.to_string(),
            to: order.status.to_string(),
            timestamp: Utc::now().timestamp(),
        };
        tracing::info!(?event, "Order status changed");
        Ok(order)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum OrderError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Order not found: {0}")]
    NotFound(i64),

    #[error("Invalid state transition from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    #[error("Payment not accepted: {0}")]
    PaymentNotAccepted(String),

    #[error("Order storage failed: {0}")]
    Storage(RepoError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::TransitionPolicy;
    use crate::memory::{MemoryDeliveryRepository, MemoryOrderRepository};
    use crate::models::OrderItem;
    use crate::orchestrator::{ScriptedGateway, ScriptedResponse};
    use crate::repository::DeliveryRepository;
    use duka_core::payment::PaymentAmount;
    use duka_shared::Money;
    use tokio::sync::mpsc;

    struct Rig {
        manager: Arc<OrderManager>,
        orders: Arc<MemoryOrderRepository>,
        deliveries: Arc<MemoryDeliveryRepository>,
        gateway: Arc<ScriptedGateway>,
        jobs: mpsc::Receiver<FollowUpJob>,
    }

    fn rig_with(gateway: ScriptedGateway, policy: LifecyclePolicy) -> Rig {
        let orders = Arc::new(MemoryOrderRepository::new());
        let deliveries = Arc::new(MemoryDeliveryRepository::new());
        let gateway = Arc::new(gateway);
        let (outbox, jobs) = Outbox::channel(16);
        let manager = Arc::new(OrderManager::new(
            orders.clone(),
            DeliveryService::new(deliveries.clone()),
            PaymentOrchestrator::new(gateway.clone()),
            outbox,
            policy,
        ));
        Rig { manager, orders, deliveries, gateway, jobs }
    }

    fn rig() -> Rig {
        rig_with(ScriptedGateway::responding("0"), LifecyclePolicy::default())
    }

    fn new_order() -> NewOrder {
        NewOrder {
            user_id: 3,
            status: Some("pending".to_string()),
            total: Money::from_minor(2100),
            items: vec![OrderItem { product_id: 1, quantity: 2, price: Money::from_minor(1050) }],
        }
    }

    fn instructions() -> Option<PaymentRequest> {
        PaymentRequest::from_parts(PaymentAmount::Whole(100), Some("254700000000".to_string()))
    }

    fn fractional_amount() -> Option<PaymentRequest> {
        PaymentRequest::from_parts(PaymentAmount::Unusable("21.5".to_string()), Some("254700000000".to_string()))
    }

    #[tokio::test]
    async fn test_place_order_spawns_pending_delivery() {
        let mut rig = rig();
        let order = rig.manager.place_order(new_order()).await.unwrap();

        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.items[0].quantity, 2);
        assert_eq!(order.items[0].price, Money::from_minor(1050));

        let delivery = rig.deliveries.find_by_order(order.id).await.unwrap().unwrap();
        assert_eq!(delivery.status, crate::models::DeliveryStatus::Pending);
        assert!(!delivery.tracking_info.unwrap().is_empty());

        assert_eq!(rig.jobs.try_recv().unwrap(), FollowUpJob::SendInvoice { order_id: order.id });
        assert!(rig.jobs.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_client_supplied_status_is_ignored() {
        let rig = rig();
        let mut request = new_order();
        request.status = Some("delivered".to_string());

        let order = rig.manager.place_order(request).await.unwrap();
        assert_eq!(order.status, OrderStatus::Pending);
    }

    #[tokio::test]
    async fn test_invalid_order_is_not_persisted() {
        let rig = rig();
        let mut request = new_order();
        request.items.clear();

        let result = rig.manager.place_order(request).await;
        assert!(matches!(result, Err(OrderError::Validation(_))));
        assert!(rig.orders.list_orders().await.unwrap().is_empty());
        assert!(rig.deliveries.list_deliveries().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delivery_failure_queues_reconciliation() {
        let mut rig = rig();
        rig.deliveries.fail_next_creates(1);

        let order = rig.manager.place_order(new_order()).await.unwrap();

        assert!(rig.deliveries.find_by_order(order.id).await.unwrap().is_none());
        assert_eq!(rig.jobs.try_recv().unwrap(), FollowUpJob::VerifyDelivery { order_id: order.id });
        assert_eq!(rig.jobs.try_recv().unwrap(), FollowUpJob::SendInvoice { order_id: order.id });
    }

    #[tokio::test]
    async fn test_bogus_status_rejected_before_any_side_effect() {
        let rig = rig();
        let order = rig.manager.place_order(new_order()).await.unwrap();

        let result = rig.manager.change_status(order.id, "bogus", instructions()).await;

        assert!(matches!(result, Err(OrderError::Validation(_))));
        assert_eq!(rig.gateway.calls(), 0);
        assert_eq!(rig.manager.get_order(order.id).await.unwrap().status, OrderStatus::Pending);
    }

    #[tokio::test]
    async fn test_payment_runs_once_and_does_not_gate_write() {
        let rig = rig_with(ScriptedGateway::responding("1"), LifecyclePolicy::default());
        let order = rig.manager.place_order(new_order()).await.unwrap();

        let change = rig.manager.change_status(order.id, "processing", instructions()).await.unwrap();

        assert_eq!(rig.gateway.calls(), 1);
        assert_eq!(change.order.status, OrderStatus::Processing);
        assert!(matches!(change.payment, Some(PaymentOutcome::NotAccepted { .. })));
    }

    #[tokio::test]
    async fn test_gateway_error_does_not_gate_write() {
        let gateway = ScriptedGateway::new(ScriptedResponse::RequestRejected { status: 503, body: "down".into() });
        let rig = rig_with(gateway, LifecyclePolicy::default());
        let order = rig.manager.place_order(new_order()).await.unwrap();

        let change = rig.manager.change_status(order.id, "shipped", instructions()).await.unwrap();
        assert_eq!(change.order.status, OrderStatus::Shipped);
        assert!(matches!(change.payment, Some(PaymentOutcome::Failed { .. })));
    }

    #[tokio::test]
    async fn test_no_instructions_no_payment() {
        let rig = rig();
        let order = rig.manager.place_order(new_order()).await.unwrap();

        let change = rig.manager.change_status(order.id, "processing", None).await.unwrap();
        assert!(change.payment.is_none());
        assert_eq!(rig.gateway.calls(), 0);
    }

    #[tokio::test]
    async fn test_require_accepted_policy_blocks_write() {
        let policy = LifecyclePolicy { payment: PaymentPolicy::RequireAccepted, ..Default::default() };
        let rig = rig_with(ScriptedGateway::responding("1032"), policy);
        let order = rig.manager.place_order(new_order()).await.unwrap();

        let result = rig.manager.change_status(order.id, "processing", instructions()).await;

        assert!(matches!(result, Err(OrderError::PaymentNotAccepted(ref m)) if m.contains("1032")));
        assert_eq!(rig.manager.get_order(order.id).await.unwrap().status, OrderStatus::Pending);
    }

    #[tokio::test]
    async fn test_unusable_amount_still_writes_status() {
        let rig = rig();
        let order = rig.manager.place_order(new_order()).await.unwrap();

        let change = rig.manager.change_status(order.id, "processing", fractional_amount()).await.unwrap();

        assert_eq!(change.order.status, OrderStatus::Processing);
        assert!(matches!(change.payment, Some(PaymentOutcome::Failed { ref reason }) if reason.contains("21.5")));
        assert_eq!(rig.gateway.calls(), 0);
    }

    #[tokio::test]
    async fn test_unusable_amount_blocks_when_acceptance_required() {
        let policy = LifecyclePolicy { payment: PaymentPolicy::RequireAccepted, ..Default::default() };
        let rig = rig_with(ScriptedGateway::responding("0"), policy);
        let order = rig.manager.place_order(new_order()).await.unwrap();

        let result = rig.manager.change_status(order.id, "processing", fractional_amount()).await;

        assert!(matches!(result, Err(OrderError::PaymentNotAccepted(_))));
        assert_eq!(rig.manager.get_order(order.id).await.unwrap().status, OrderStatus::Pending);
    }

    #[tokio::test]
    async fn test_unknown_order() {
        let rig = rig();
        assert!(matches!(rig.manager.change_status(77, "shipped", instructions()).await, Err(OrderError::NotFound(77))));
        assert_eq!(rig.gateway.calls(), 0);
        assert!(matches!(rig.manager.advance(77).await, Err(OrderError::NotFound(77))));
    }

    #[tokio::test]
    async fn test_advance_walks_to_delivered_then_stops() {
        let rig = rig();
        let order = rig.manager.place_order(new_order()).await.unwrap();

        let mut seen = Vec::new();
        for _ in 0..4 {
            seen.push(rig.manager.advance(order.id).await.unwrap().status);
        }

        assert_eq!(
            seen,
            vec![OrderStatus::Processing, OrderStatus::Shipped, OrderStatus::Delivered, OrderStatus::Delivered]
        );
    }

    #[tokio::test]
    async fn test_cancel_from_live_states() {
        let rig = rig();
        for status in ["pending", "processing", "shipped"] {
            let order = rig.manager.place_order(new_order()).await.unwrap();
            rig.manager.change_status(order.id, status, None).await.unwrap();
            assert_eq!(rig.manager.cancel(order.id).await.unwrap().status, OrderStatus::Cancelled);
        }
    }

    #[tokio::test]
    async fn test_cancel_delivered_depends_on_policy() {
        let permissive = rig();
        let order = permissive.manager.place_order(new_order()).await.unwrap();
        permissive.manager.change_status(order.id, "delivered", None).await.unwrap();
        assert_eq!(permissive.manager.cancel(order.id).await.unwrap().status, OrderStatus::Cancelled);

        let policy = LifecyclePolicy { transitions: TransitionPolicy::Sequential, ..Default::default() };
        let strict = rig_with(ScriptedGateway::responding("0"), policy);
        let order = strict.manager.place_order(new_order()).await.unwrap();
        for _ in 0..3 {
            strict.manager.advance(order.id).await.unwrap();
        }
        assert!(matches!(strict.manager.cancel(order.id).await, Err(OrderError::InvalidTransition { .. })));
    }

    #[tokio::test]
    async fn test_sequential_policy_rejects_skips_before_charging() {
        let policy = LifecyclePolicy { transitions: TransitionPolicy::Sequential, ..Default::default() };
        let rig = rig_with(ScriptedGateway::responding("0"), policy);
        let order = rig.manager.place_order(new_order()).await.unwrap();

        let result = rig.manager.change_status(order.id, "delivered", instructions()).await;
        assert!(matches!(
            result,
            Err(OrderError::InvalidTransition { from: OrderStatus::Pending, to: OrderStatus::Delivered })
        ));
        assert_eq!(rig.gateway.calls(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_status_changes_last_write_wins() {
        let rig = rig();
        let order = rig.manager.place_order(new_order()).await.unwrap();

        let a = {
            let manager = rig.manager.clone();
            tokio::spawn(async move { manager.change_status(order.id, "shipped", None).await })
        };
        let b = {
            let manager = rig.manager.clone();
            tokio::spawn(async move { manager.change_status(order.id, "cancelled", None).await })
        };

        // both writes succeed; nothing serialises them beyond the store
        assert!(a.await.unwrap().is_ok());
        assert!(b.await.unwrap().is_ok());

        let final_status = rig.manager.get_order(order.id).await.unwrap().status;
        assert!(matches!(final_status, OrderStatus::Shipped | OrderStatus::Cancelled));
    }

    #[tokio::test]
    async fn test_list_scoped_to_owner() {
        let rig = rig();
        rig.manager.place_order(new_order()).await.unwrap();
        let mut other = new_order();
        other.user_id = 99;
        rig.manager.place_order(other).await.unwrap();

        assert_eq!(rig.manager.list_orders(None).await.unwrap().len(), 2);
        assert_eq!(rig.manager.list_orders(Some(99)).await.unwrap().len(), 1);
    }
}
