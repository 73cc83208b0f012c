use duka_core::identity::ContactDirectory;
use duka_core::mail::{MailError, MailRelay, OutboundMail};
use std::fmt::Write;
use std::sync::Arc;

use crate::models::{Notification, Order};
use crate::repository::{NotificationRepository, RepoError};

pub const INVOICE_SUBJECT: &str = "Order Invoice";

/// Tells customers about orders they placed: an in-app feed entry and an
/// emailed plain-text invoice.
pub struct InvoiceNotifier {
    directory: Arc<dyn ContactDirectory>,
    relay: Arc<dyn MailRelay>,
    notifications: Arc<dyn NotificationRepository>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvoiceDelivery {
    Sent { ack: String },
    NoContact,
}

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("Contact lookup failed: {0}")]
    Directory(RepoError),

    #[error(transparent)]
    Mail(#[from] MailError),

    #[error("Notification feed write failed: {0}")]
    Feed(RepoError),
}

impl NotifyError {
    /// Worth trying again later: the relay or directory may come back.
    pub fn is_retryable(&self) -> bool {
        match self {
            NotifyError::Directory(_) | NotifyError::Feed(_) => true,
            NotifyError::Mail(MailError::Unreachable(_)) => true,
            NotifyError::Mail(MailError::Rejected { status, .. }) => *status >= 500,
            NotifyError::Mail(MailError::NotConfigured(_)) => false,
        }
    }
}

impl InvoiceNotifier {
    pub fn new(
        directory: Arc<dyn ContactDirectory>,
        relay: Arc<dyn MailRelay>,
        notifications: Arc<dyn NotificationRepository>,
    ) -> Self {
        Self { directory, relay, notifications }
    }

    /// Feed entry plus emailed invoice for a newly placed order. The feed
    /// write is skipped when `record_feed` is false so retries do not
    /// duplicate it; its failure is only logged. Mail errors are returned
    /// for the caller to classify with [`NotifyError::is_retryable`].
    pub async fn notify_order_placed(&self, order: &Order, record_feed: bool) -> Result<InvoiceDelivery, NotifyError> {
        if record_feed {
            if let Err(e) = self.record_in_app(order).await {
                tracing::warn!("Failed to record notification for order {}: {}", order.id, e);
            }
        }

        let delivery = self.send_invoice(order).await?;
        match &delivery {
            InvoiceDelivery::Sent { ack } => tracing::info!("Sent invoice for order {}: {}", order.id, ack),
            InvoiceDelivery::NoContact => {
                tracing::info!("No email on file for user {}, invoice for order {} skipped", order.user_id, order.id)
            }
        }
        Ok(delivery)
    }

    pub async fn record_in_app(&self, order: &Order) -> Result<Notification, NotifyError> {
        let message = format!("Order #{} placed. Total: {}", order.id, order.total);
        self.notifications
            .create_notification(order.user_id, &message)
            .await
            .map_err(NotifyError::Feed)
    }

    pub async fn send_invoice(&self, order: &Order) -> Result<InvoiceDelivery, NotifyError> {
        let contact = self
            .directory
            .find_contact(order.user_id)
            .await
            .map_err(NotifyError::Directory)?;

        let Some(email) = contact.and_then(|c| c.email).filter(|e| !e.is_blank()) else {
            return Ok(InvoiceDelivery::NoContact);
        };

        let mail = OutboundMail {
            to: email,
            subject: INVOICE_SUBJECT.to_string(),
            text: format_invoice(order),
        };
        let ack = self.relay.send(&mail).await?;
        Ok(InvoiceDelivery::Sent { ack })
    }
}

pub fn format_invoice(order: &Order) -> String {
    let mut text = String::new();
    let _ = writeln!(text, "Order #{}", order.id);
    let _ = writeln!(text, "Total: {}", order.total);
    let _ = writeln!(text, "Status: {}", order.status);
    let _ = writeln!(text, "Date: {}", order.created_at.format("%Y-%m-%d"));
    let _ = writeln!(text, "Items:");
    for item in &order.items {
        let _ = writeln!(
            text,
            "  - product {} x{} @ {}",
            item.product_id, item.quantity, item.price
        );
    }
    text
}
