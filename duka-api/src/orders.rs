use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    routing::{get, post},
    Extension, Json, Router,
};
use duka_core::access::Role;
use duka_core::payment::{PaymentAmount, PaymentRequest};
use duka_order::{NewOrder, Order};
use serde::Deserialize;

use crate::error::AppError;
use crate::middleware::Principal;
use crate::state::AppState;

// ============================================================================
// Request Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: String,
    /// Charge in whole currency units; only used together with `phone`.
    /// Never rejects the request: a bad amount becomes a failed payment.
    #[serde(default)]
    pub amount: PaymentAmount,
    pub phone: Option<String>,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/orders", post(create_order).get(list_orders))
        .route("/orders/{id}", get(get_order).patch(update_order_status))
        .route("/orders/{id}/advance", post(advance_order))
        .route("/orders/{id}/cancel", post(cancel_order))
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /orders
pub async fn create_order(
    State(state): State<AppState>,
    payload: Result<Json<NewOrder>, JsonRejection>,
) -> Result<(StatusCode, Json<Order>), AppError> {
    let Json(request) = payload?;
    let order = state.manager.place_order(request).await?;
    Ok((StatusCode::CREATED, Json(order)))
}

/// GET /orders
/// Clients only see their own orders.
pub async fn list_orders(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
) -> Result<Json<Vec<Order>>, AppError> {
    let owner = (principal.role == Role::Client).then_some(principal.user_id);
    Ok(Json(state.manager.list_orders(owner).await?))
}

/// GET /orders/:id
pub async fn get_order(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(order_id): Path<i64>,
) -> Result<Json<Order>, AppError> {
    let order = state.manager.get_order(order_id).await?;
    if principal.role == Role::Client && order.user_id != principal.user_id {
        return Err(AppError::AuthorizationError(format!(
            "Order {} belongs to another customer",
            order_id
        )));
    }
    Ok(Json(order))
}

/// PATCH /orders/:id
/// Sets the status outright. With `amount` and `phone` a payment prompt is
/// pushed first; its outcome is logged and only blocks the change when the
/// payment policy requires acceptance.
pub async fn update_order_status(
    State(state): State<AppState>,
    Path(order_id): Path<i64>,
    payload: Result<Json<UpdateStatusRequest>, JsonRejection>,
) -> Result<Json<Order>, AppError> {
    let Json(req) = payload?;
    let payment = PaymentRequest::from_parts(req.amount, req.phone);

    let change = state
        .manager
        .change_status(order_id, &req.status, payment)
        .await?;

    if let Some(outcome) = &change.payment {
        tracing::debug!("Order {} payment outcome: {}", order_id, outcome.label());
    }
    Ok(Json(change.order))
}

/// POST /orders/:id/advance
pub async fn advance_order(
    State(state): State<AppState>,
    Path(order_id): Path<i64>,
) -> Result<Json<Order>, AppError> {
    Ok(Json(state.manager.advance(order_id).await?))
}

/// POST /orders/:id/cancel
pub async fn cancel_order(
    State(state): State<AppState>,
    Path(order_id): Path<i64>,
) -> Result<Json<Order>, AppError> {
    Ok(Json(state.manager.cancel(order_id).await?))
}
