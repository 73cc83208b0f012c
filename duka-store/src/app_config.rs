use duka_order::outbox::DEFAULT_CONCURRENCY;
use duka_order::{LifecyclePolicy, RetryPolicy};
use serde::Deserialize;
use std::env;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub mpesa: MpesaConfig,
    #[serde(default)]
    pub mail: MailConfig,
    #[serde(default)]
    pub lifecycle: LifecyclePolicy,
    #[serde(default)]
    pub outbox: OutboxConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    /// In-memory stores are used when unset.
    pub url: Option<String>,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: default_max_connections(),
        }
    }
}

fn default_max_connections() -> u32 { 5 }

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
}

/// Mobile-money gateway settings. Secrets are optional here so the server
/// can boot without them; each payment call reports what is missing.
#[derive(Debug, Deserialize, Clone)]
pub struct MpesaConfig {
    pub auth_url: String,
    pub stk_url: String,
    pub consumer_key: Option<String>,
    pub consumer_secret: Option<String>,
    pub short_code: Option<String>,
    pub passkey: Option<String>,
    pub callback_url: Option<String>,
    #[serde(default = "default_account_reference")]
    pub account_reference: String,
    #[serde(default = "default_transaction_desc")]
    pub transaction_desc: String,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
}

fn default_account_reference() -> String { "Duka".to_string() }
fn default_transaction_desc() -> String { "Payment for order".to_string() }
fn default_timeout_seconds() -> u64 { 15 }

#[derive(Debug, Deserialize, Clone)]
pub struct MailConfig {
    pub relay_url: Option<String>,
    pub api_key: Option<String>,
    #[serde(default = "default_mail_from")]
    pub from: String,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            relay_url: None,
            api_key: None,
            from: default_mail_from(),
            timeout_seconds: default_timeout_seconds(),
        }
    }
}

fn default_mail_from() -> String { "orders@duka.local".to_string() }

#[derive(Debug, Deserialize, Clone)]
pub struct OutboxConfig {
    #[serde(default = "default_capacity")]
    pub capacity: usize,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default)]
    pub retry: RetryPolicy,
}

impl Default for OutboxConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
            concurrency: default_concurrency(),
            retry: RetryPolicy::default(),
        }
    }
}

fn default_capacity() -> usize { 1024 }
fn default_concurrency() -> usize { DEFAULT_CONCURRENCY }

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // not checked in
            .add_source(config::File::with_name("config/local").required(false))
            // e.g. DUKA__MPESA__PASSKEY=...
            .add_source(config::Environment::with_prefix("DUKA").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use duka_order::{PaymentPolicy, TransitionPolicy};

    const SAMPLE: &str = r#"
        [server]
        port = 8080

        [auth]
        jwt_secret = "dev-secret"

        [mpesa]
        auth_url = "https://sandbox.safaricom.co.ke/oauth/v1/generate?grant_type=client_credentials"
        stk_url = "https://sandbox.safaricom.co.ke/mpesa/stkpush/v1/processrequest"
        short_code = "174379"

        [lifecycle]
        payment = "require_accepted"

        [outbox.retry]
        max_attempts = 2
        initial_backoff_ms = 250
    "#;

    fn parse(raw: &str) -> Config {
        config::Config::builder()
            .add_source(config::File::from_str(raw, config::FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap()
    }

    #[test]
    fn test_defaults_fill_optional_sections() {
        let cfg = parse(SAMPLE);

        assert_eq!(cfg.server.port, 8080);
        assert!(cfg.database.url.is_none());
        assert_eq!(cfg.database.max_connections, 5);
        assert!(cfg.mpesa.passkey.is_none());
        assert_eq!(cfg.mpesa.timeout_seconds, 15);
        assert_eq!(cfg.mail.from, "orders@duka.local");
        assert_eq!(cfg.outbox.capacity, 1024);
        assert_eq!(cfg.outbox.concurrency, 8);
    }

    #[test]
    fn test_policy_and_retry_sections() {
        let cfg = parse(SAMPLE);

        assert_eq!(cfg.lifecycle.payment, PaymentPolicy::RequireAccepted);
        assert_eq!(cfg.lifecycle.transitions, TransitionPolicy::Permissive);
        assert_eq!(cfg.outbox.retry.max_attempts, 2);
        assert_eq!(cfg.outbox.retry.initial_backoff.as_millis(), 250);
    }
}
