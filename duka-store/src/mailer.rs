use async_trait::async_trait;
use duka_core::mail::{MailError, MailRelay, OutboundMail};
use serde::Serialize;
use std::time::Duration;

use crate::app_config::MailConfig;

/// Posts mail as JSON to an HTTP mail relay.
pub struct HttpMailRelay {
    http: reqwest::Client,
    relay_url: Option<String>,
    api_key: Option<String>,
    from: String,
}

#[derive(Serialize)]
struct RelayMessage<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    text: &'a str,
}

impl HttpMailRelay {
    pub fn from_config(cfg: &MailConfig) -> Result<Self, MailError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_seconds))
            .build()
            .map_err(|e| MailError::NotConfigured(e.to_string()))?;

        Ok(Self {
            http,
            relay_url: cfg.relay_url.clone().filter(|u| !u.trim().is_empty()),
            api_key: cfg.api_key.clone().filter(|k| !k.trim().is_empty()),
            from: cfg.from.clone(),
        })
    }
}

#[async_trait]
impl MailRelay for HttpMailRelay {
    async fn send(&self, mail: &OutboundMail) -> Result<String, MailError> {
        let Some(url) = &self.relay_url else {
            return Err(MailError::NotConfigured("relay url".to_string()));
        };

        let body = RelayMessage {
            from: &self.from,
            to: mail.to.expose(),
            subject: &mail.subject,
            text: &mail.text,
        };

        let mut req = self.http.post(url).json(&body);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }

        let resp = req
            .send()
            .await
            .map_err(|e| MailError::Unreachable(e.to_string()))?;

        let status = resp.status();
        let text = resp.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(MailError::Rejected { status: status.as_u16(), body: text });
        }

        Ok(if text.is_empty() { status.to_string() } else { text })
    }
}
