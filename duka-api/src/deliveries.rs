use axum::{
    extract::{rejection::JsonRejection, Path, State},
    routing::{get, patch},
    Json, Router,
};
use duka_order::{Delivery, DeliveryUpdate};

use crate::error::AppError;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/deliveries", get(list_deliveries))
        .route("/deliveries/{id}", patch(update_delivery))
}

/// GET /deliveries
pub async fn list_deliveries(State(state): State<AppState>) -> Result<Json<Vec<Delivery>>, AppError> {
    Ok(Json(state.deliveries.list().await?))
}

/// PATCH /deliveries/:id
/// Partial update; a delivered shipment cannot move back.
pub async fn update_delivery(
    State(state): State<AppState>,
    Path(delivery_id): Path<i64>,
    payload: Result<Json<DeliveryUpdate>, JsonRejection>,
) -> Result<Json<Delivery>, AppError> {
    let Json(update) = payload?;
    let delivery = state.deliveries.update(delivery_id, update).await?;
    tracing::info!("Delivery {} is now {}", delivery.id, delivery.status);
    Ok(Json(delivery))
}
