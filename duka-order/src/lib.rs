pub mod models;
pub mod lifecycle;
pub mod repository;
pub mod fulfillment;
pub mod orchestrator;
pub mod notifier;
pub mod outbox;
pub mod manager;
pub mod memory;

pub use models::{Delivery, DeliveryStatus, DeliveryUpdate, NewOrder, Notification, Order, OrderItem, OrderStatus};
pub use lifecycle::{LifecyclePolicy, PaymentPolicy, TransitionPolicy};
pub use manager::{OrderError, OrderManager, StatusChange};
pub use fulfillment::{DeliveryError, DeliveryService};
pub use notifier::InvoiceNotifier;
pub use orchestrator::PaymentOrchestrator;
pub use outbox::{FollowUpJob, Outbox, OutboxWorker, RetryPolicy};
