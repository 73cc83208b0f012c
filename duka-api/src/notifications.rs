use axum::{extract::State, routing::get, Extension, Json, Router};
use duka_order::Notification;

use crate::error::AppError;
use crate::middleware::Principal;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new().route("/notifications", get(list_notifications))
}

/// GET /notifications
/// The caller's own feed.
pub async fn list_notifications(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
) -> Result<Json<Vec<Notification>>, AppError> {
    let notes = state
        .notifications
        .list_for_user(principal.user_id)
        .await
        .map_err(|e| AppError::InternalServerError(e.to_string()))?;
    Ok(Json(notes))
}
