pub mod account;
pub mod middleware;
pub mod state;

use std::sync::Arc;

use axum::{
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE},
        Method,
    },
    middleware as axum_middleware,
    routing::delete,
    Router,
};
use tower_http::cors::{Any, CorsLayer};

pub use account::{delete_account_handler, ApiDoc};
pub use middleware::require_auth;
pub use state::{AppState, AuthenticatedUser};

/// Builds the account service router.
pub fn router(app_state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::DELETE, Method::OPTIONS])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE]);

    Router::new()
        .route("/api/account", delete(delete_account_handler))
        .layer(axum_middleware::from_fn_with_state(
            app_state.clone(),
            require_auth,
        ))
        .layer(cors)
        .with_state(app_state)
}
