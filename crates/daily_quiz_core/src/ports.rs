//! crates/daily_quiz_core/src/ports.rs
//!
//! Defines the service contracts (traits) the client logic depends on.
//! These traits form the boundary of the hexagonal architecture, keeping the core
//! independent of the HTTP library and of the auth provider's SDK.

use async_trait::async_trait;
use serde_json::Value;

use crate::domain::AuthSession;

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., network, auth).
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
    #[error("Unauthorized")]
    Unauthorized,
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Wire Types
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Delete,
}

/// A request against the remote API. `path` is relative to the configured base URL.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: HttpMethod,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
    pub bearer: Option<String>,
}

impl ApiRequest {
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Get, path)
    }

    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self {
            body: Some(body),
            ..Self::new(HttpMethod::Post, path)
        }
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Delete, path)
    }

    fn new(method: HttpMethod, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
            bearer: None,
        }
    }

    pub fn with_query(mut self, key: &str, value: impl ToString) -> Self {
        self.query.push((key.to_string(), value.to_string()));
        self
    }

    pub fn with_bearer(mut self, token: impl Into<String>) -> Self {
        self.bearer = Some(token.into());
        self
    }
}

/// A response from the remote API.
///
/// Non-JSON bodies are carried as `Value::String`, empty bodies as `Value::Null`.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Value,
}

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Performs a single request. Any HTTP status is a successful `send`;
    /// only transport failures are errors.
    async fn send(&self, request: ApiRequest) -> PortResult<ApiResponse>;
}

#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// Returns the current session, refreshing it if the provider supports that.
    async fn get_session(&self) -> PortResult<Option<AuthSession>>;

    /// Clears the local session.
    async fn sign_out(&self) -> PortResult<()>;
}

#[async_trait]
pub trait AccountAdminService: Send + Sync {
    /// Resolves a user's bearer token to their user id.
    async fn resolve_user(&self, access_token: &str) -> PortResult<String>;

    /// Deletes the user with service-role privileges.
    async fn delete_user(&self, user_id: &str) -> PortResult<()>;
}
