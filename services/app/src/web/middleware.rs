//! services/app/src/web/middleware.rs
//!
//! Authentication middleware for protecting routes.

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use tracing::warn;

use crate::web::state::{AppState, AuthenticatedUser};

/// Middleware that validates the bearer token with the auth provider.
///
/// If valid, inserts the `AuthenticatedUser` into request extensions for handlers to use.
/// If invalid or missing, returns 401 Unauthorized.
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    // 1. Extract the bearer token
    let token = bearer_token(req.headers())
        .ok_or(StatusCode::UNAUTHORIZED)?
        .to_string();

    // 2. Resolve it to a user with the auth provider
    let user_id = state.admin.resolve_user(&token).await.map_err(|e| {
        warn!("Failed to resolve bearer token: {:?}", e);
        StatusCode::UNAUTHORIZED
    })?;

    // 3. Insert the user into request extensions
    req.extensions_mut().insert(AuthenticatedUser(user_id));

    // 4. Continue to the handler
    Ok(next.run(req).await)
}

/// The token of an `Authorization: Bearer <token>` header.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.trim().split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}
