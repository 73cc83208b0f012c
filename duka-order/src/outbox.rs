//! Follow-up work that must not hold up the request that caused it.
//!
//! Jobs are keyed by order id. A delivery check creates nothing when a
//! delivery already exists; invoices are enqueued once, when the order is
//! placed.

use chrono::Utc;
use duka_shared::models::events::DeliveryReconciledEvent;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;

use crate::fulfillment::DeliveryService;
use crate::notifier::InvoiceNotifier;
use crate::repository::OrderRepository;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FollowUpJob {
    SendInvoice { order_id: i64 },
    VerifyDelivery { order_id: i64 },
}

impl FollowUpJob {
    pub fn order_id(&self) -> i64 {
        match self {
            FollowUpJob::SendInvoice { order_id } | FollowUpJob::VerifyDelivery { order_id } => *order_id,
        }
    }
}

/// Producer half handed to the order manager.
#[derive(Clone)]
pub struct Outbox {
    tx: mpsc::Sender<FollowUpJob>,
}

impl Outbox {
    pub fn channel(capacity: usize) -> (Outbox, mpsc::Receiver<FollowUpJob>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Outbox { tx }, rx)
    }

    /// Never blocks. Returns false if the job was dropped.
    pub fn enqueue(&self, job: FollowUpJob) -> bool {
        match self.tx.try_send(job) {
            Ok(()) => true,
            Err(TrySendError::Full(job)) => {
                tracing::warn!("Outbox full, dropping {:?}", job);
                false
            }
            Err(TrySendError::Closed(job)) => {
                tracing::error!("Outbox worker gone, dropping {:?}", job);
                false
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    #[serde(rename = "initial_backoff_ms", with = "millis")]
    pub initial_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    /// Exponential: initial, 2x, 4x, ...
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_backoff.saturating_mul(factor)
    }
}

mod millis {
    use serde::{Deserialize, Deserializer};
    use std::time::Duration;

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Done,
    GaveUp(String),
}

struct JobFailure {
    retryable: bool,
    reason: String,
}

impl JobFailure {
    fn retry(reason: impl ToString) -> Self {
        Self { retryable: true, reason: reason.to_string() }
    }

    fn fatal(reason: impl ToString) -> Self {
        Self { retryable: false, reason: reason.to_string() }
    }
}

pub const DEFAULT_CONCURRENCY: usize = 8;

/// Consumer half. Each job runs in its own task so a job sleeping between
/// retries never holds up the ones queued behind it.
#[derive(Clone)]
pub struct OutboxWorker {
    orders: Arc<dyn OrderRepository>,
    deliveries: DeliveryService,
    notifier: Arc<InvoiceNotifier>,
    retry: RetryPolicy,
    concurrency: usize,
}

impl OutboxWorker {
    pub fn new(
        orders: Arc<dyn OrderRepository>,
        deliveries: DeliveryService,
        notifier: Arc<InvoiceNotifier>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            orders,
            deliveries,
            notifier,
            retry,
            concurrency: DEFAULT_CONCURRENCY,
        }
    }

    /// Upper bound on jobs in flight at once.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Returns once the queue is closed and every started job has finished.
    pub async fn run(self, mut rx: mpsc::Receiver<FollowUpJob>) {
        tracing::info!("Outbox worker started ({} concurrent jobs)", self.concurrency);
        let permits = Arc::new(Semaphore::new(self.concurrency));
        let mut tasks = JoinSet::new();

        while let Some(job) = rx.recv().await {
            let Ok(permit) = permits.clone().acquire_owned().await else {
                break;
            };
            let worker = self.clone();
            tasks.spawn(async move {
                let _permit = permit;
                match worker.process(job).await {
                    JobOutcome::GaveUp(reason) => tracing::error!("Gave up on {:?}: {}", job, reason),
                    outcome => tracing::debug!("{:?} -> {:?}", job, outcome),
                }
            });
            // reap finished tasks so the set stays small
            while let Some(done) = tasks.try_join_next() {
                if let Err(e) = done {
                    tracing::error!("Outbox job task failed: {}", e);
                }
            }
        }

        while let Some(done) = tasks.join_next().await {
            if let Err(e) = done {
                tracing::error!("Outbox job task failed: {}", e);
            }
        }
        tracing::info!("Outbox worker stopped");
    }

    pub async fn process(&self, job: FollowUpJob) -> JobOutcome {
        let mut attempt = 1;
        loop {
            match self.attempt(job, attempt).await {
                Ok(()) => return JobOutcome::Done,
                Err(failure) if failure.retryable && attempt < self.retry.max_attempts => {
                    let wait = self.retry.backoff_for(attempt);
                    tracing::warn!(
                        "{:?} attempt {}/{} failed: {}; retrying in {:?}",
                        job,
                        attempt,
                        self.retry.max_attempts,
                        failure.reason,
                        wait
                    );
                    tokio::time::sleep(wait).await;
                    attempt += 1;
                }
                Err(failure) => return JobOutcome::GaveUp(failure.reason),
            }
        }
    }

    async fn attempt(&self, job: FollowUpJob, attempt: u32) -> Result<(), JobFailure> {
        match job {
            FollowUpJob::SendInvoice { order_id } => {
                let order = self
                    .orders
                    .get_order(order_id)
                    .await
                    .map_err(JobFailure::retry)?
                    .ok_or_else(|| JobFailure::fatal(format!("order {} does not exist", order_id)))?;

                match self.notifier.notify_order_placed(&order, attempt == 1).await {
                    Ok(_) => Ok(()),
                    Err(e) if e.is_retryable() => Err(JobFailure::retry(e)),
                    Err(e) => Err(JobFailure::fatal(e)),
                }
            }
            FollowUpJob::VerifyDelivery { order_id } => {
                let (delivery, created) = self
                    .deliveries
                    .ensure_for_order(order_id)
                    .await
                    .map_err(JobFailure::retry)?;
                if created {
                    let event = DeliveryReconciledEvent {
                        order_id,
                        delivery_id: delivery.id,
                        timestamp: Utc::now().timestamp(),
                    };
                    tracing::info!(?event, "Reconciled missing delivery");
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{
        MemoryDeliveryRepository, MemoryMailbox, MemoryNotificationRepository, MemoryOrderRepository,
        StaticDirectory,
    };
    use crate::models::{OrderDraft, OrderItem, OrderStatus};
    use crate::repository::{DeliveryRepository, NotificationRepository};
    use duka_core::identity::UserContact;
    use duka_shared::{Masked, Money};

    struct Rig {
        orders: Arc<MemoryOrderRepository>,
        deliveries: Arc<MemoryDeliveryRepository>,
        feed: Arc<MemoryNotificationRepository>,
        mailbox: Arc<MemoryMailbox>,
        worker: OutboxWorker,
    }

    fn rig() -> Rig {
        let orders = Arc::new(MemoryOrderRepository::new());
        let deliveries = Arc::new(MemoryDeliveryRepository::new());
        let feed = Arc::new(MemoryNotificationRepository::new());
        let mailbox = Arc::new(MemoryMailbox::new());
        let directory = Arc::new(StaticDirectory::new([UserContact {
            id: 1,
            name: None,
            email: Some(Masked("client@example.com".to_string())),
        }]));
        let notifier = Arc::new(InvoiceNotifier::new(directory, mailbox.clone(), feed.clone()));
        let worker = OutboxWorker::new(
            orders.clone(),
            DeliveryService::new(deliveries.clone()),
            notifier,
            RetryPolicy { max_attempts: 3, initial_backoff: Duration::from_millis(1) },
        );
        Rig { orders, deliveries, feed, mailbox, worker }
    }

    async fn seed(orders: &MemoryOrderRepository) -> i64 {
        orders
            .create_order(&OrderDraft {
                user_id: 1,
                status: OrderStatus::Pending,
                total: Money::from_minor(500),
                items: vec![OrderItem { product_id: 3, quantity: 1, price: Money::from_minor(500) }],
            })
            .await
            .unwrap()
            .id
    }

    #[test]
    fn test_backoff_doubles() {
        let policy = RetryPolicy { max_attempts: 4, initial_backoff: Duration::from_millis(100) };
        assert_eq!(policy.backoff_for(1), Duration::from_millis(100));
        assert_eq!(policy.backoff_for(2), Duration::from_millis(200));
        assert_eq!(policy.backoff_for(3), Duration::from_millis(400));
    }

    #[tokio::test]
    async fn test_invoice_job_mails_and_records_feed() {
        let rig = rig();
        let order_id = seed(&rig.orders).await;

        let outcome = rig.worker.process(FollowUpJob::SendInvoice { order_id }).await;

        assert_eq!(outcome, JobOutcome::Done);
        assert_eq!(rig.mailbox.sent().await.len(), 1);
        assert_eq!(rig.feed.list_for_user(1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_repeated_delivery_check_creates_one_delivery() {
        let rig = rig();
        let order_id = seed(&rig.orders).await;
        let job = FollowUpJob::VerifyDelivery { order_id };

        assert_eq!(rig.worker.process(job).await, JobOutcome::Done);
        assert_eq!(rig.worker.process(job).await, JobOutcome::Done);

        assert_eq!(rig.deliveries.list_deliveries().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_relay_outage_exhausts_retries() {
        let rig = rig();
        let order_id = seed(&rig.orders).await;
        rig.mailbox.set_unreachable(true);

        let outcome = rig.worker.process(FollowUpJob::SendInvoice { order_id }).await;

        assert!(matches!(outcome, JobOutcome::GaveUp(_)));
        assert_eq!(rig.mailbox.attempts(), 3);
        // feed entry is written once, not per attempt
        assert_eq!(rig.feed.list_for_user(1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_missing_order_is_not_retried() {
        let rig = rig();
        let outcome = rig.worker.process(FollowUpJob::SendInvoice { order_id: 999 }).await;
        assert!(matches!(outcome, JobOutcome::GaveUp(ref r) if r.contains("999")));
        assert_eq!(rig.mailbox.attempts(), 0);
    }

    #[tokio::test]
    async fn test_verify_delivery_fills_gap_after_transient_failure() {
        let rig = rig();
        let order_id = seed(&rig.orders).await;
        rig.deliveries.fail_next_creates(1);

        let outcome = rig.worker.process(FollowUpJob::VerifyDelivery { order_id }).await;

        assert_eq!(outcome, JobOutcome::Done);
        let delivery = rig.deliveries.find_by_order(order_id).await.unwrap().unwrap();
        assert!(delivery.tracking_info.unwrap().starts_with("TRK-"));
    }

    #[tokio::test]
    async fn test_queue_drains_through_run() {
        let rig = rig();
        let order_id = seed(&rig.orders).await;
        let (outbox, rx) = Outbox::channel(4);

        assert!(outbox.enqueue(FollowUpJob::VerifyDelivery { order_id }));
        drop(outbox);
        rig.worker.run(rx).await;

        assert!(rig.deliveries.find_by_order(order_id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_retrying_invoice_does_not_hold_up_delivery_check() {
        let rig = rig();
        let slow_invoice = seed(&rig.orders).await;
        let needs_delivery = seed(&rig.orders).await;
        rig.mailbox.set_unreachable(true);

        let worker = OutboxWorker {
            retry: RetryPolicy { max_attempts: 5, initial_backoff: Duration::from_millis(200) },
            ..rig.worker.clone()
        };
        let (outbox, rx) = Outbox::channel(4);
        assert!(outbox.enqueue(FollowUpJob::SendInvoice { order_id: slow_invoice }));
        assert!(outbox.enqueue(FollowUpJob::VerifyDelivery { order_id: needs_delivery }));
        let running = tokio::spawn(worker.run(rx));

        let deliveries = rig.deliveries.clone();
        tokio::time::timeout(Duration::from_secs(2), async move {
            while deliveries.find_by_order(needs_delivery).await.unwrap().is_none() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("delivery check waited behind the invoice");

        // the invoice is still backing off
        assert!(rig.mailbox.attempts() < 5);

        drop(outbox);
        running.await.unwrap();
        assert_eq!(rig.mailbox.attempts(), 5);
    }

    #[tokio::test]
    async fn test_enqueue_on_full_queue_drops() {
        let (outbox, _rx) = Outbox::channel(1);
        assert!(outbox.enqueue(FollowUpJob::SendInvoice { order_id: 1 }));
        assert!(!outbox.enqueue(FollowUpJob::SendInvoice { order_id: 2 }));
    }
}
