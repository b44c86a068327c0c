//! crates/daily_quiz_core/src/api.rs
//!
//! The session accessor and the authenticated request wrapper. Every call to the
//! remote API goes through `ApiClient::send`, which attaches the bearer token,
//! honours the caller's cancellation token, and turns a 401 into a sign-out.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::domain::AuthSession;
use crate::error::{ClientError, ClientResult};
use crate::normalize::{first_bool, first_string};
use crate::ports::{ApiRequest, ApiResponse, AuthProvider, HttpTransport};

impl ApiResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// The server-provided error text, if any.
    pub fn error_message(&self) -> Option<String> {
        if let Some(text) = self.body.as_str() {
            let text = text.trim();
            return (!text.is_empty() && !text.starts_with('<')).then(|| text.to_string());
        }
        first_string(&self.body, &["error", "message", "detail"])
    }

    /// Whether the server flags today's quiz as already completed.
    pub fn already_completed(&self) -> bool {
        first_bool(&self.body, &["alreadyCompleted", "already_completed"]).unwrap_or(false)
    }

    /// Converts a non-2xx response into `ClientError::Server`.
    pub fn ensure_success(self) -> ClientResult<ApiResponse> {
        if self.is_success() {
            return Ok(self);
        }
        Err(ClientError::Server {
            status: self.status,
            message: self.error_message().unwrap_or_default(),
        })
    }
}

/// Shared handle on the remote API. Cheap to clone.
#[derive(Clone)]
pub struct ApiClient {
    transport: Arc<dyn HttpTransport>,
    auth: Arc<dyn AuthProvider>,
}

impl ApiClient {
    pub fn new(transport: Arc<dyn HttpTransport>, auth: Arc<dyn AuthProvider>) -> Self {
        Self { transport, auth }
    }

    /// Resolves the current session or reports that the user must sign in.
    pub async fn current_user(&self) -> ClientResult<AuthSession> {
        self.auth
            .get_session()
            .await?
            .ok_or(ClientError::SessionMissing)
    }

    /// Signs out after the server rejected the session.
    pub async fn expire_session(&self) -> ClientError {
        if let Err(e) = self.auth.sign_out().await {
            warn!("Sign-out after 401 failed: {:?}", e);
        }
        ClientError::SessionExpired
    }

    /// Sends an authenticated request.
    ///
    /// Returns `Aborted` if `cancel` fires first and `SessionExpired` on 401.
    /// Every other status is returned to the caller to interpret.
    pub async fn send(
        &self,
        request: ApiRequest,
        cancel: &CancellationToken,
    ) -> ClientResult<ApiResponse> {
        if cancel.is_cancelled() {
            return Err(ClientError::Aborted);
        }
        let session = self.current_user().await?;
        let path = request.path.clone();
        let request = request.with_bearer(session.access_token);

        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!("Request to {} aborted", path);
                return Err(ClientError::Aborted);
            }
            response = self.transport.send(request) => response?,
        };

        if response.status == 401 {
            warn!("{} answered 401; signing out", path);
            return Err(self.expire_session().await);
        }
        Ok(response)
    }

    /// `send` followed by `ensure_success`.
    pub async fn send_ok(
        &self,
        request: ApiRequest,
        cancel: &CancellationToken,
    ) -> ClientResult<ApiResponse> {
        self.send(request, cancel).await?.ensure_success()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{client_with, StaticAuth, ScriptedTransport};
    use serde_json::json;

    #[tokio::test]
    async fn attaches_bearer_token() {
        let transport = ScriptedTransport::new().on("/api/profile", 200, json!({ "id": "u1" }));
        let (client, _) = client_with(transport.clone());

        let response = client
            .send(ApiRequest::get("/api/profile"), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(response.status, 200);
        let sent = transport.requests();
        assert_eq!(sent[0].bearer.as_deref(), Some("token-1"));
    }

    #[tokio::test]
    async fn unauthorized_signs_out() {
        let transport = ScriptedTransport::new().on("/api/profile", 401, json!({}));
        let (client, auth) = client_with(transport);

        let err = client
            .send(ApiRequest::get("/api/profile"), &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, ClientError::SessionExpired));
        assert_eq!(auth.sign_outs(), 1);
    }

    #[tokio::test]
    async fn missing_session_makes_no_request() {
        let transport = ScriptedTransport::new();
        let client = ApiClient::new(Arc::new(transport.clone()), Arc::new(StaticAuth::signed_out()));

        let err = client
            .send(ApiRequest::get("/api/profile"), &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, ClientError::SessionMissing));
        assert!(transport.requests().is_empty());
    }

    #[tokio::test]
    async fn cancelled_token_aborts() {
        let transport = ScriptedTransport::new().on("/api/profile", 200, json!({}));
        let (client, _) = client_with(transport.clone());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = client
            .send(ApiRequest::get("/api/profile"), &cancel)
            .await
            .unwrap_err();

        assert!(err.is_aborted());
        assert!(transport.requests().is_empty());
    }

    #[test]
    fn error_message_prefers_error_field() {
        let response = ApiResponse {
            status: 400,
            body: json!({ "error": "Nombre no válido", "message": "ignored" }),
        };
        assert_eq!(response.error_message().as_deref(), Some("Nombre no válido"));

        let text = ApiResponse {
            status: 404,
            body: json!("No hay preguntas para hoy"),
        };
        assert_eq!(text.error_message().as_deref(), Some("No hay preguntas para hoy"));
    }
}
