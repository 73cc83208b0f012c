use async_trait::async_trait;
use duka_shared::Masked;
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct OutboundMail {
    pub to: Masked<String>,
    pub subject: String,
    pub text: String,
}

#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("Mail relay not configured: {0}")]
    NotConfigured(String),

    #[error("Mail relay unreachable: {0}")]
    Unreachable(String),

    #[error("Mail relay rejected message ({status}): {body}")]
    Rejected { status: u16, body: String },
}

/// Outbound mail relay. Implementations must bound their own I/O time.
#[async_trait]
pub trait MailRelay: Send + Sync {
    /// Returns the relay's acknowledgement text on success.
    async fn send(&self, mail: &OutboundMail) -> Result<String, MailError>;
}
