use async_trait::async_trait;
use duka_core::payment::{
    basic_credentials, PaymentError, PaymentGateway, PaymentInstructions, StkCredentials, StkPushAck,
};
use duka_shared::Masked;
use serde::Deserialize;
use std::time::Duration;

use crate::app_config::MpesaConfig;

/// Daraja-style STK push client.
///
/// Consumer key and secret are never logged; the token is kept masked.
pub struct MpesaGateway {
    http: reqwest::Client,
    auth_url: String,
    stk_url: String,
    consumer_key: Masked<String>,
    consumer_secret: Masked<String>,
    credentials: StkCredentials,
}

#[derive(Debug, Deserialize)]
struct AccessTokenResponse {
    access_token: String,
}

impl MpesaGateway {
    pub fn from_config(cfg: &MpesaConfig) -> Result<Self, PaymentError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_seconds))
            .build()
            .map_err(|e| PaymentError::Transport(e.to_string()))?;

        let setting = |value: &Option<String>| value.clone().unwrap_or_default();

        Ok(Self {
            http,
            auth_url: cfg.auth_url.clone(),
            stk_url: cfg.stk_url.clone(),
            consumer_key: Masked(setting(&cfg.consumer_key)),
            consumer_secret: Masked(setting(&cfg.consumer_secret)),
            credentials: StkCredentials {
                short_code: setting(&cfg.short_code),
                passkey: Masked(setting(&cfg.passkey)),
                callback_url: setting(&cfg.callback_url),
                account_reference: cfg.account_reference.clone(),
                transaction_desc: cfg.transaction_desc.clone(),
            },
        })
    }

    async fn read_body(resp: reqwest::Response) -> String {
        resp.text().await.unwrap_or_default()
    }
}

#[async_trait]
impl PaymentGateway for MpesaGateway {
    async fn request_access_token(&self) -> Result<Masked<String>, PaymentError> {
        if self.consumer_key.is_blank() || self.consumer_secret.is_blank() {
            return Err(PaymentError::Configuration("consumer key or secret".to_string()));
        }

        let resp = self
            .http
            .get(&self.auth_url)
            .header(
                reqwest::header::AUTHORIZATION,
                basic_credentials(self.consumer_key.expose(), self.consumer_secret.expose()),
            )
            .send()
            .await
            .map_err(|e| PaymentError::Transport(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(PaymentError::UpstreamAuth {
                status: status.as_u16(),
                body: Self::read_body(resp).await,
            });
        }

        let token: AccessTokenResponse = resp
            .json()
            .await
            .map_err(|e| PaymentError::InvalidResponse(format!("access token: {}", e)))?;
        Ok(Masked(token.access_token))
    }

    async fn initiate_push(&self, instructions: &PaymentInstructions) -> Result<StkPushAck, PaymentError> {
        // sign first so missing merchant settings never cost an auth round trip
        let request = self
            .credentials
            .sign(instructions, chrono::Local::now().naive_local())?;
        let token = self.request_access_token().await?;

        let resp = self
            .http
            .post(&self.stk_url)
            .bearer_auth(token.expose())
            .json(&request)
            .send()
            .await
            .map_err(|e| PaymentError::Transport(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(PaymentError::UpstreamRequest {
                status: status.as_u16(),
                body: Self::read_body(resp).await,
            });
        }

        resp.json::<StkPushAck>()
            .await
            .map_err(|e| PaymentError::InvalidResponse(format!("stk push: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::State;
    use axum::http::{HeaderMap, StatusCode};
    use axum::response::{IntoResponse, Response};
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    /// Local stand-in for the OAuth and STK push endpoints.
    struct Upstream {
        oauth_status: StatusCode,
        push_status: StatusCode,
        oauth_calls: AtomicUsize,
        basic_headers: Mutex<Vec<String>>,
        bearer_headers: Mutex<Vec<String>>,
        push_bodies: Mutex<Vec<Value>>,
    }

    fn authorization(headers: &HeaderMap) -> String {
        headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string()
    }

    async fn oauth(State(up): State<Arc<Upstream>>, headers: HeaderMap) -> Response {
        up.oauth_calls.fetch_add(1, Ordering::SeqCst);
        up.basic_headers.lock().unwrap().push(authorization(&headers));
        if up.oauth_status != StatusCode::OK {
            return (up.oauth_status, "invalid client credentials").into_response();
        }
        Json(json!({ "access_token": "tok-123", "expires_in": "3599" })).into_response()
    }

    async fn push(State(up): State<Arc<Upstream>>, headers: HeaderMap, Json(body): Json<Value>) -> Response {
        up.bearer_headers.lock().unwrap().push(authorization(&headers));
        up.push_bodies.lock().unwrap().push(body);
        if up.push_status != StatusCode::OK {
            return (up.push_status, r#"{"errorMessage":"Invalid Amount"}"#).into_response();
        }
        Json(json!({
            "MerchantRequestID": "29115-34620561-1",
            "CheckoutRequestID": "ws_CO_191220191020363925",
            "ResponseCode": "0",
            "ResponseDescription": "Success. Request accepted for processing",
            "CustomerMessage": "Success. Request accepted for processing"
        }))
        .into_response()
    }

    /// Binds an ephemeral port and returns a config pointing at it.
    async fn upstream(oauth_status: StatusCode, push_status: StatusCode) -> (Arc<Upstream>, MpesaConfig) {
        let up = Arc::new(Upstream {
            oauth_status,
            push_status,
            oauth_calls: AtomicUsize::new(0),
            basic_headers: Mutex::new(Vec::new()),
            bearer_headers: Mutex::new(Vec::new()),
            push_bodies: Mutex::new(Vec::new()),
        });
        let app = Router::new()
            .route("/oauth/v1/generate", get(oauth))
            .route("/mpesa/stkpush/v1/processrequest", post(push))
            .with_state(up.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let mut cfg = config();
        cfg.auth_url = format!("http://{}/oauth/v1/generate?grant_type=client_credentials", addr);
        cfg.stk_url = format!("http://{}/mpesa/stkpush/v1/processrequest", addr);
        cfg.passkey = Some("passkey".to_string());
        (up, cfg)
    }

    fn config() -> MpesaConfig {
        MpesaConfig {
            // nothing listens here; these tests must fail before any I/O
            auth_url: "http://127.0.0.1:9/oauth".to_string(),
            stk_url: "http://127.0.0.1:9/stk".to_string(),
            consumer_key: Some("key".to_string()),
            consumer_secret: Some("secret".to_string()),
            short_code: Some("174379".to_string()),
            passkey: None,
            callback_url: Some("https://example.com/callbacks/payment".to_string()),
            account_reference: "Duka".to_string(),
            transaction_desc: "Payment for order".to_string(),
            timeout_seconds: 1,
        }
    }

    fn instructions() -> PaymentInstructions {
        PaymentInstructions::from_parts(Some(100), Some("254700000000".to_string())).unwrap()
    }

    #[tokio::test]
    async fn test_missing_passkey_fails_before_auth() {
        let gateway = MpesaGateway::from_config(&config()).unwrap();
        let err = gateway.initiate_push(&instructions()).await.unwrap_err();
        assert!(matches!(err, PaymentError::Configuration(ref what) if what == "passkey"));
    }

    #[tokio::test]
    async fn test_missing_consumer_secret() {
        let mut cfg = config();
        cfg.consumer_secret = Some("  ".to_string());
        let gateway = MpesaGateway::from_config(&cfg).unwrap();

        let err = gateway.request_access_token().await.unwrap_err();
        assert!(matches!(err, PaymentError::Configuration(_)));
    }

    #[tokio::test]
    async fn test_unreachable_auth_endpoint_is_transport_error() {
        let mut cfg = config();
        cfg.passkey = Some("passkey".to_string());
        let gateway = MpesaGateway::from_config(&cfg).unwrap();

        let err = gateway.initiate_push(&instructions()).await.unwrap_err();
        assert!(matches!(err, PaymentError::Transport(_)));
    }

    #[tokio::test]
    async fn test_push_sends_basic_then_bearer_and_parses_ack() {
        let (up, cfg) = upstream(StatusCode::OK, StatusCode::OK).await;
        let gateway = MpesaGateway::from_config(&cfg).unwrap();

        let ack = gateway.initiate_push(&instructions()).await.unwrap();

        assert!(ack.is_accepted());
        assert_eq!(ack.checkout_request_id, "ws_CO_191220191020363925");
        assert_eq!(up.basic_headers.lock().unwrap().as_slice(), [basic_credentials("key", "secret")]);
        assert_eq!(up.bearer_headers.lock().unwrap().as_slice(), ["Bearer tok-123".to_string()]);

        let body = up.push_bodies.lock().unwrap()[0].clone();
        assert_eq!(body["BusinessShortCode"], "174379");
        assert_eq!(body["Amount"], 100);
        assert_eq!(body["PartyA"], "254700000000");
        assert_eq!(body["PhoneNumber"], "254700000000");
        assert_eq!(body["CallBackURL"], "https://example.com/callbacks/payment");
        assert_eq!(body["TransactionType"], "CustomerPayBillOnline");
    }

    #[tokio::test]
    async fn test_every_push_fetches_a_fresh_token() {
        let (up, cfg) = upstream(StatusCode::OK, StatusCode::OK).await;
        let gateway = MpesaGateway::from_config(&cfg).unwrap();

        gateway.initiate_push(&instructions()).await.unwrap();
        gateway.initiate_push(&instructions()).await.unwrap();

        assert_eq!(up.oauth_calls.load(Ordering::SeqCst), 2);
        assert_eq!(up.push_bodies.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_rejected_credentials_keep_status_and_body() {
        let (up, cfg) = upstream(StatusCode::UNAUTHORIZED, StatusCode::OK).await;
        let gateway = MpesaGateway::from_config(&cfg).unwrap();

        let err = gateway.initiate_push(&instructions()).await.unwrap_err();

        match err {
            PaymentError::UpstreamAuth { status, body } => {
                assert_eq!(status, 401);
                assert!(body.contains("invalid client credentials"));
            }
            other => panic!("expected auth failure, got {:?}", other),
        }
        assert!(up.push_bodies.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rejected_push_keeps_status_and_body() {
        let (_up, cfg) = upstream(StatusCode::OK, StatusCode::BAD_REQUEST).await;
        let gateway = MpesaGateway::from_config(&cfg).unwrap();

        let err = gateway.initiate_push(&instructions()).await.unwrap_err();

        match err {
            PaymentError::UpstreamRequest { status, body } => {
                assert_eq!(status, 400);
                assert!(body.contains("Invalid Amount"));
            }
            other => panic!("expected push failure, got {:?}", other),
        }
    }
}
