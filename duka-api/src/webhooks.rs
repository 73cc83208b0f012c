use axum::{body::Bytes, routing::post, Json, Router};
use serde_json::{json, Value};

use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/callbacks/payment", post(handle_payment_callback))
        .route("/callbacks/mpesa", post(handle_payment_callback))
}

/// POST /callbacks/payment
/// Receives the gateway's asynchronous STK result. The payload is logged
/// and always acknowledged; order status is not touched here.
pub async fn handle_payment_callback(body: Bytes) -> Json<Value> {
    match serde_json::from_slice::<Value>(&body) {
        Ok(payload) => {
            let callback = &payload["Body"]["stkCallback"];
            tracing::info!(
                checkout_request_id = callback["CheckoutRequestID"].as_str().unwrap_or("unknown"),
                result_code = ?callback["ResultCode"].as_i64(),
                "Received payment callback: {}",
                callback["ResultDesc"].as_str().unwrap_or("")
            );
        }
        Err(e) => tracing::warn!("Payment callback with unreadable body: {}", e),
    }

    Json(json!({
        "ResultCode": 0,
        "ResultDesc": "Accepted",
    }))
}
