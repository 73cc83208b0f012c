use async_trait::async_trait;
use duka_core::payment::{
    PaymentError, PaymentGateway, PaymentInstructions, PaymentOutcome, StkPushAck,
};
use duka_shared::Masked;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub struct PaymentOrchestrator {
    gateway: Arc<dyn PaymentGateway>,
}

impl PaymentOrchestrator {
    pub fn new(gateway: Arc<dyn PaymentGateway>) -> Self {
        Self { gateway }
    }

    /// Push a payment prompt and fold every failure into the outcome.
    pub async fn pay(&self, instructions: &PaymentInstructions) -> PaymentOutcome {
        let result = self.gateway.initiate_push(instructions).await;
        if let Err(e) = &result {
            match e {
                PaymentError::Configuration(_) => tracing::error!("Mobile money misconfigured: {}", e),
                _ => tracing::warn!("Mobile money push failed: {}", e),
            }
        }
        let outcome = PaymentOutcome::from_result(result);
        tracing::info!(
            outcome = outcome.label(),
            amount = instructions.amount,
            phone = %instructions.phone,
            "{}",
            outcome.message()
        );
        outcome
    }
}

/// Gateway double that replays a fixed response and counts calls.
pub struct ScriptedGateway {
    response: Mutex<ScriptedResponse>,
    calls: AtomicUsize,
    seen: Mutex<Vec<PaymentInstructions>>,
}

#[derive(Debug, Clone)]
pub enum ScriptedResponse {
    Code(String),
    RequestRejected { status: u16, body: String },
    Unconfigured,
}

impl ScriptedGateway {
    pub fn responding(code: &str) -> Self {
        Self::new(ScriptedResponse::Code(code.to_string()))
    }

    pub fn new(response: ScriptedResponse) -> Self {
        Self {
            response: Mutex::new(response),
            calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Every instruction passed to `initiate_push`, oldest first.
    pub fn seen(&self) -> Vec<PaymentInstructions> {
        match self.seen.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn current(&self) -> ScriptedResponse {
        match self.response.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

#[async_trait]
impl PaymentGateway for ScriptedGateway {
    async fn request_access_token(&self) -> Result<Masked<String>, PaymentError> {
        match self.current() {
            ScriptedResponse::Unconfigured => Err(PaymentError::Configuration("consumer key".to_string())),
            _ => Ok(Masked("scripted-token".to_string())),
        }
    }

    async fn initiate_push(&self, instructions: &PaymentInstructions) -> Result<StkPushAck, PaymentError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.seen.lock() {
            Ok(mut guard) => guard.push(instructions.clone()),
            Err(poisoned) => poisoned.into_inner().push(instructions.clone()),
        }
        self.request_access_token().await?;
        match self.current() {
            ScriptedResponse::Code(code) => Ok(StkPushAck {
                merchant_request_id: format!("scripted-{}", self.calls()),
                checkout_request_id: format!("ws_CO_scripted_{}", self.calls()),
                response_description: if code == "0" { "Success".to_string() } else { "Rejected".to_string() },
                customer_message: String::new(),
                response_code: code,
            }),
            ScriptedResponse::RequestRejected { status, body } => Err(PaymentError::UpstreamRequest { status, body }),
            ScriptedResponse::Unconfigured => Err(PaymentError::Configuration("consumer key".to_string())),
        }
    }
}
