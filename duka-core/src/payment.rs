use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::NaiveDateTime;
use duka_shared::Masked;
use serde::de::{self, IgnoredAny, MapAccess, SeqAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Gateway response code meaning the prompt reached the customer's phone.
pub const STK_ACCEPTED_CODE: &str = "0";

pub const TRANSACTION_TYPE_PAYBILL: &str = "CustomerPayBillOnline";

/// Charge request attached to a status change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentInstructions {
    pub amount: u64,
    pub phone: Masked<String>,
}

impl PaymentInstructions {
    /// Both halves must be present and non-empty, otherwise there is
    /// nothing to charge and the request carries no instructions.
    pub fn from_parts(amount: Option<u64>, phone: Option<String>) -> Option<Self> {
        match (amount, phone) {
            (Some(amount), Some(phone)) if amount > 0 && !phone.trim().is_empty() => Some(Self {
                amount,
                phone: Masked(phone.trim().to_string()),
            }),
            _ => None,
        }
    }
}

/// Charge amount exactly as a client sent it.
///
/// Any JSON value is accepted. Empty-ish values (`null`, `0`, `""`,
/// `false`) mean no charge. Anything else that is not a whole positive
/// number is kept as `Unusable` so the payment can fail without rejecting
/// the request it rode in on.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum PaymentAmount {
    #[default]
    Absent,
    Whole(u64),
    Unusable(String),
}

impl PaymentAmount {
    fn from_float(value: f64) -> Self {
        if value == 0.0 {
            PaymentAmount::Absent
        } else if value > 0.0 && value.fract() == 0.0 && value <= u64::MAX as f64 {
            PaymentAmount::Whole(value as u64)
        } else {
            PaymentAmount::Unusable(value.to_string())
        }
    }
}

impl<'de> Deserialize<'de> for PaymentAmount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct AmountVisitor;

        impl<'de> Visitor<'de> for AmountVisitor {
            type Value = PaymentAmount;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a payment amount")
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<PaymentAmount, E> {
                Ok(if v == 0 { PaymentAmount::Absent } else { PaymentAmount::Whole(v) })
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<PaymentAmount, E> {
                match u64::try_from(v) {
                    Ok(v) => self.visit_u64(v),
                    Err(_) => Ok(PaymentAmount::Unusable(v.to_string())),
                }
            }

            fn visit_f64<E: de::Error>(self, v: f64) -> Result<PaymentAmount, E> {
                Ok(PaymentAmount::from_float(v))
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<PaymentAmount, E> {
                let trimmed = v.trim();
                if trimmed.is_empty() {
                    return Ok(PaymentAmount::Absent);
                }
                if let Ok(whole) = trimmed.parse::<u64>() {
                    return self.visit_u64(whole);
                }
                match trimmed.parse::<f64>() {
                    Ok(number) if number.is_finite() => Ok(PaymentAmount::from_float(number)),
                    _ => Ok(PaymentAmount::Unusable(trimmed.to_string())),
                }
            }

            fn visit_bool<E: de::Error>(self, v: bool) -> Result<PaymentAmount, E> {
                Ok(if v { PaymentAmount::Unusable("true".to_string()) } else { PaymentAmount::Absent })
            }

            fn visit_unit<E: de::Error>(self) -> Result<PaymentAmount, E> {
                Ok(PaymentAmount::Absent)
            }

            fn visit_none<E: de::Error>(self) -> Result<PaymentAmount, E> {
                Ok(PaymentAmount::Absent)
            }

            fn visit_some<D: Deserializer<'de>>(self, d: D) -> Result<PaymentAmount, D::Error> {
                d.deserialize_any(self)
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<PaymentAmount, A::Error> {
                while seq.next_element::<IgnoredAny>()?.is_some() {}
                Ok(PaymentAmount::Unusable("list".to_string()))
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<PaymentAmount, A::Error> {
                while map.next_entry::<IgnoredAny, IgnoredAny>()?.is_some() {}
                Ok(PaymentAmount::Unusable("object".to_string()))
            }
        }

        deserializer.deserialize_any(AmountVisitor)
    }
}

/// Payment fields attached to a status change.
#[derive(Debug, Clone, PartialEq)]
pub enum PaymentRequest {
    Ready(PaymentInstructions),
    /// Present but not chargeable; reported as a failed payment.
    Unusable(String),
}

impl PaymentRequest {
    /// `None` unless both an amount and a phone were supplied.
    pub fn from_parts(amount: PaymentAmount, phone: Option<String>) -> Option<Self> {
        let phone = phone.filter(|p| !p.trim().is_empty())?;
        match amount {
            PaymentAmount::Absent => None,
            PaymentAmount::Whole(amount) => {
                PaymentInstructions::from_parts(Some(amount), Some(phone)).map(PaymentRequest::Ready)
            }
            PaymentAmount::Unusable(raw) => Some(PaymentRequest::Unusable(format!(
                "amount '{}' is not a whole positive number",
                raw
            ))),
        }
    }
}

impl From<PaymentInstructions> for PaymentRequest {
    fn from(instructions: PaymentInstructions) -> Self {
        PaymentRequest::Ready(instructions)
    }
}

/// Body of the STK push process request.
#[derive(Debug, Clone, Serialize)]
pub struct StkPushRequest {
    #[serde(rename = "BusinessShortCode")]
    pub business_short_code: String,
    #[serde(rename = "Password")]
    pub password: Masked<String>,
    #[serde(rename = "Timestamp")]
    pub timestamp: String,
    #[serde(rename = "TransactionType")]
    pub transaction_type: String,
    #[serde(rename = "Amount")]
    pub amount: u64,
    #[serde(rename = "PartyA")]
    pub party_a: Masked<String>,
    #[serde(rename = "PartyB")]
    pub party_b: String,
    #[serde(rename = "PhoneNumber")]
    pub phone_number: Masked<String>,
    #[serde(rename = "CallBackURL")]
    pub callback_url: String,
    #[serde(rename = "AccountReference")]
    pub account_reference: String,
    #[serde(rename = "TransactionDesc")]
    pub transaction_desc: String,
}

/// Merchant settings that sign every push.
#[derive(Debug, Clone)]
pub struct StkCredentials {
    pub short_code: String,
    pub passkey: Masked<String>,
    pub callback_url: String,
    pub account_reference: String,
    pub transaction_desc: String,
}

impl StkCredentials {
    pub fn ensure_complete(&self) -> Result<(), PaymentError> {
        if self.short_code.trim().is_empty() {
            return Err(PaymentError::Configuration("business short code".to_string()));
        }
        if self.passkey.is_blank() {
            return Err(PaymentError::Configuration("passkey".to_string()));
        }
        if self.callback_url.trim().is_empty() {
            return Err(PaymentError::Configuration("callback url".to_string()));
        }
        Ok(())
    }

    /// Build a signed request for `instructions` at the given local time.
    pub fn sign(
        &self,
        instructions: &PaymentInstructions,
        at: NaiveDateTime,
    ) -> Result<StkPushRequest, PaymentError> {
        self.ensure_complete()?;
        if instructions.amount == 0 || instructions.phone.is_blank() {
            return Err(PaymentError::Configuration("amount or phone missing".to_string()));
        }

        let timestamp = stk_timestamp(at);
        let password = stk_password(&self.short_code, self.passkey.expose(), &timestamp);

        Ok(StkPushRequest {
            business_short_code: self.short_code.clone(),
            password: Masked(password),
            timestamp,
            transaction_type: TRANSACTION_TYPE_PAYBILL.to_string(),
            amount: instructions.amount,
            party_a: instructions.phone.clone(),
            party_b: self.short_code.clone(),
            phone_number: instructions.phone.clone(),
            callback_url: self.callback_url.clone(),
            account_reference: self.account_reference.clone(),
            transaction_desc: self.transaction_desc.clone(),
        })
    }
}

/// Gateway acknowledgement. Acceptance means the prompt was shown, not that
/// money moved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StkPushAck {
    #[serde(rename = "MerchantRequestID", default)]
    pub merchant_request_id: String,
    #[serde(rename = "CheckoutRequestID", default)]
    pub checkout_request_id: String,
    #[serde(rename = "ResponseCode")]
    pub response_code: String,
    #[serde(rename = "ResponseDescription", default)]
    pub response_description: String,
    #[serde(rename = "CustomerMessage", default)]
    pub customer_message: String,
}

impl StkPushAck {
    pub fn is_accepted(&self) -> bool {
        self.response_code == STK_ACCEPTED_CODE
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PaymentError {
    #[error("Payment gateway not configured: {0} missing")]
    Configuration(String),

    #[error("Gateway rejected credentials ({status}): {body}")]
    UpstreamAuth { status: u16, body: String },

    #[error("Gateway rejected push request ({status}): {body}")]
    UpstreamRequest { status: u16, body: String },

    #[error("Gateway unreachable: {0}")]
    Transport(String),

    #[error("Unexpected gateway response: {0}")]
    InvalidResponse(String),
}

/// Result of a charge attempt. Never an error: every failure path is a value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentOutcome {
    Accepted { ack: StkPushAck },
    NotAccepted { code: String, ack: StkPushAck },
    Failed { reason: String },
}

impl PaymentOutcome {
    pub fn from_result(result: Result<StkPushAck, PaymentError>) -> Self {
        match result {
            Ok(ack) if ack.is_accepted() => PaymentOutcome::Accepted { ack },
            Ok(ack) => PaymentOutcome::NotAccepted {
                code: ack.response_code.clone(),
                ack,
            },
            Err(e) => PaymentOutcome::Failed { reason: e.to_string() },
        }
    }

    pub fn is_accepted(&self) -> bool {
        matches!(self, PaymentOutcome::Accepted { .. })
    }

    pub fn label(&self) -> &'static str {
        match self {
            PaymentOutcome::Accepted { .. } => "ACCEPTED",
            PaymentOutcome::NotAccepted { .. } => "NOT_ACCEPTED",
            PaymentOutcome::Failed { .. } => "FAILED",
        }
    }

    pub fn message(&self) -> String {
        match self {
            PaymentOutcome::Accepted { .. } => "STK push initiated successfully".to_string(),
            PaymentOutcome::NotAccepted { code, .. } => format!("Payment failed with code {}", code),
            PaymentOutcome::Failed { reason } => reason.clone(),
        }
    }
}

/// Mobile-money gateway speaking the STK push protocol.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Exchange consumer credentials for a bearer token.
    async fn request_access_token(&self) -> Result<Masked<String>, PaymentError>;

    /// Push a payment prompt to the customer's phone.
    async fn initiate_push(
        &self,
        instructions: &PaymentInstructions,
    ) -> Result<StkPushAck, PaymentError>;
}

/// `YYYYMMDDHHMMSS`, zero padded.
pub fn stk_timestamp(at: NaiveDateTime) -> String {
    at.format("%Y%m%d%H%M%S").to_string()
}

/// base64(short_code ++ passkey ++ timestamp). Protocol obfuscation, not a MAC.
pub fn stk_password(short_code: &str, passkey: &str, timestamp: &str) -> String {
    STANDARD.encode(format!("{}{}{}", short_code, passkey, timestamp))
}

/// `Basic` header value for the OAuth exchange.
pub fn basic_credentials(consumer_key: &str, consumer_secret: &str) -> String {
    format!("Basic {}", STANDARD.encode(format!("{}:{}", consumer_key, consumer_secret)))
}
