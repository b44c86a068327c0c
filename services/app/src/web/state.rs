//! services/app/src/web/state.rs
//!
//! Defines the shared state of the account service.

use daily_quiz_core::ports::AccountAdminService;
use std::sync::Arc;

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub admin: Arc<dyn AccountAdminService>,
}

/// The caller resolved from the bearer token by `require_auth`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser(pub String);
