use axum::{
    extract::{MatchedPath, Request, State},
    http::Method,
    middleware::Next,
    response::Response,
};
use duka_core::access::{authorize, Capability, Role};
use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::state::AppState;

// ============================================================================
// JWT Claims
// ============================================================================

/// Tokens are issued by the auth service; `sub` is the numeric user id.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: String,
    pub role: Role,
    pub exp: usize,
}

/// The authenticated caller, inserted into request extensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Principal {
    pub user_id: i64,
    pub role: Role,
}

// ============================================================================
// Route Access Table
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteAccess {
    Public,
    Requires(Capability),
}

/// Every routed endpoint must appear here; anything missing is refused.
pub fn route_access(method: &Method, route: &str) -> Option<RouteAccess> {
    use Capability::*;

    let access = match (method.as_str(), route) {
        ("GET", "/health") => RouteAccess::Public,
        ("POST", "/callbacks/payment") | ("POST", "/callbacks/mpesa") => RouteAccess::Public,
        ("POST", "/orders") => RouteAccess::Public,
        ("GET", "/orders") | ("GET", "/orders/{id}") => RouteAccess::Requires(ViewOrders),
        ("PATCH", "/orders/{id}")
        | ("POST", "/orders/{id}/advance")
        | ("POST", "/orders/{id}/cancel") => RouteAccess::Requires(ChangeOrderStatus),
        ("GET", "/deliveries") => RouteAccess::Requires(ViewDeliveries),
        ("PATCH", "/deliveries/{id}") => RouteAccess::Requires(UpdateDelivery),
        ("GET", "/notifications") => RouteAccess::Requires(ViewNotifications),
        _ => return None,
    };
    Some(access)
}

// ============================================================================
// Access Guard Middleware
// ============================================================================

pub async fn access_guard(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let route = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| req.uri().path().to_string());

    let capability = match route_access(req.method(), &route) {
        Some(RouteAccess::Public) => return Ok(next.run(req).await),
        Some(RouteAccess::Requires(capability)) => capability,
        None => {
            tracing::warn!("No access rule for {} {}", req.method(), route);
            return Err(AppError::AuthorizationError("Route is not accessible".to_string()));
        }
    };

    let principal = authenticate(&req, &state.auth.secret)?;
    authorize(principal.role, capability)?;

    req.extensions_mut().insert(principal);
    Ok(next.run(req).await)
}

fn authenticate(req: &Request, secret: &str) -> Result<Principal, AppError> {
    let unauthenticated = || AppError::AuthenticationError("Missing or invalid bearer token".to_string());

    let token = req
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .ok_or_else(unauthenticated)?;

    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|e| {
        tracing::debug!("Rejected token: {}", e);
        unauthenticated()
    })?;

    let user_id = token_data.claims.sub.parse::<i64>().map_err(|_| unauthenticated())?;

    Ok(Principal {
        user_id,
        role: token_data.claims.role,
    })
}
