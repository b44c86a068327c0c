//! services/app/src/adapters/auth.rs
//!
//! This module contains the `AuthProvider` implementation over the auth
//! provider's REST API (GoTrue-style `/auth/v1` endpoints).
//!
//! The adapter owns the session: it signs in, refreshes the access token shortly
//! before it expires, and publishes every change on a `watch` channel so other
//! parts of the client can react to sign-in and sign-out.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use daily_quiz_core::domain::AuthSession;
use daily_quiz_core::ports::{AuthProvider, PortError, PortResult};
use reqwest::Url;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::{watch, Mutex};
use tracing::{info, warn};

use crate::adapters::pkce;

/// Tokens expiring within this margin are refreshed before use.
pub const REFRESH_MARGIN_SECS: i64 = 30;

//=========================================================================================
// Wire Types
//=========================================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct AuthUser {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
}

/// Token response from the `/token` endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub expires_at: Option<i64>,
    #[serde(default)]
    pub user: Option<AuthUser>,
}

impl TokenResponse {
    fn into_session(self, now: DateTime<Utc>) -> PortResult<StoredSession> {
        let user = self
            .user
            .ok_or_else(|| PortError::Unexpected("Token response without user".to_string()))?;
        let expires_at = self
            .expires_at
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
            .or_else(|| self.expires_in.map(|secs| now + Duration::seconds(secs)));
        Ok(StoredSession {
            session: AuthSession {
                access_token: self.access_token,
                user_id: user.id,
                email: user.email,
                expires_at,
            },
            refresh_token: self.refresh_token,
        })
    }
}

#[derive(Debug, Clone)]
struct StoredSession {
    session: AuthSession,
    refresh_token: Option<String>,
}

//=========================================================================================
// Auth State Changes
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthEvent {
    InitialSession,
    SignedIn,
    TokenRefreshed,
    SignedOut,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AuthChange {
    pub event: AuthEvent,
    pub session: Option<AuthSession>,
}

/// Where to send the browser for an OAuth sign-in, and the verifier to keep
/// until the callback code comes back.
#[derive(Debug, Clone)]
pub struct OAuthRedirect {
    pub url: String,
    pub code_verifier: String,
}

/// Whether a session should be refreshed before use.
pub fn needs_refresh(session: &AuthSession, now: DateTime<Utc>) -> bool {
    session
        .expires_at
        .is_some_and(|at| at - now <= Duration::seconds(REFRESH_MARGIN_SECS))
}

//=========================================================================================
// The Adapter
//=========================================================================================

pub struct AuthRestAdapter {
    http: reqwest::Client,
    auth_url: Url,
    anon_key: String,
    state: Mutex<Option<StoredSession>>,
    changes: watch::Sender<AuthChange>,
}

impl AuthRestAdapter {
    pub fn new(auth_url: Url, anon_key: impl Into<String>) -> Self {
        let (changes, _) = watch::channel(AuthChange {
            event: AuthEvent::InitialSession,
            session: None,
        });
        Self {
            http: reqwest::Client::new(),
            auth_url,
            anon_key: anon_key.into(),
            state: Mutex::new(None),
            changes,
        }
    }

    /// Use a custom HTTP client (for connection pool reuse).
    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.http = client;
        self
    }

    /// Subscribes to sign-in, refresh and sign-out events.
    pub fn subscribe(&self) -> watch::Receiver<AuthChange> {
        self.changes.subscribe()
    }

    pub async fn sign_in_with_password(&self, email: &str, password: &str) -> PortResult<AuthSession> {
        let token = self
            .token_grant("password", json!({ "email": email, "password": password }))
            .await?;
        let stored = token.into_session(Utc::now())?;
        info!("Signed in as {}", stored.session.user_id);
        Ok(self.store(stored, AuthEvent::SignedIn).await)
    }

    /// Exchanges the callback code from an OAuth redirect for a session.
    pub async fn exchange_code(&self, auth_code: &str, code_verifier: &str) -> PortResult<AuthSession> {
        let token = self
            .token_grant(
                "pkce",
                json!({ "auth_code": auth_code, "code_verifier": code_verifier }),
            )
            .await?;
        let stored = token.into_session(Utc::now())?;
        Ok(self.store(stored, AuthEvent::SignedIn).await)
    }

    /// Builds the provider redirect URL for an OAuth sign-in.
    pub fn authorize_url(&self, provider: &str, redirect_to: &str) -> PortResult<OAuthRedirect> {
        let code_verifier = pkce::code_verifier();
        let mut url = endpoint(&self.auth_url, "authorize")?;
        url.query_pairs_mut()
            .append_pair("provider", provider)
            .append_pair("redirect_to", redirect_to)
            .append_pair("code_challenge", &pkce::code_challenge(&code_verifier))
            .append_pair("code_challenge_method", "s256");
        Ok(OAuthRedirect {
            url: url.into(),
            code_verifier,
        })
    }

    /// Asks the provider to email a password-reset link.
    pub async fn send_password_reset(&self, email: &str, redirect_to: Option<&str>) -> PortResult<()> {
        let mut url = endpoint(&self.auth_url, "recover")?;
        if let Some(redirect_to) = redirect_to {
            url.query_pairs_mut().append_pair("redirect_to", redirect_to);
        }
        let response = self
            .http
            .post(url)
            .header("apikey", &self.anon_key)
            .json(&json!({ "email": email }))
            .send()
            .await
            .map_err(transport_error)?;
        ensure_success(response, "password reset").await?;
        Ok(())
    }

    async fn refresh(&self, refresh_token: &str) -> PortResult<StoredSession> {
        let token = self
            .token_grant("refresh_token", json!({ "refresh_token": refresh_token }))
            .await?;
        token.into_session(Utc::now())
    }

    async fn token_grant(&self, grant_type: &str, body: serde_json::Value) -> PortResult<TokenResponse> {
        let mut url = endpoint(&self.auth_url, "token")?;
        url.query_pairs_mut().append_pair("grant_type", grant_type);
        let response = self
            .http
            .post(url)
            .header("apikey", &self.anon_key)
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;
        let response = ensure_success(response, "token request").await?;
        response
            .json::<TokenResponse>()
            .await
            .map_err(|e| PortError::Unexpected(format!("Invalid token response: {}", e)))
    }

    async fn store(&self, stored: StoredSession, event: AuthEvent) -> AuthSession {
        let session = stored.session.clone();
        *self.state.lock().await = Some(stored);
        self.changes.send_replace(AuthChange {
            event,
            session: Some(session.clone()),
        });
        session
    }
}

#[async_trait]
impl AuthProvider for AuthRestAdapter {
    async fn get_session(&self) -> PortResult<Option<AuthSession>> {
        let mut state = self.state.lock().await;
        let Some(stored) = state.as_ref() else {
            return Ok(None);
        };
        if !needs_refresh(&stored.session, Utc::now()) {
            return Ok(Some(stored.session.clone()));
        }

        let Some(refresh_token) = stored.refresh_token.clone() else {
            warn!("Session expiring without a refresh token; signing out");
            *state = None;
            self.changes.send_replace(AuthChange {
                event: AuthEvent::SignedOut,
                session: None,
            });
            return Ok(None);
        };
        match self.refresh(&refresh_token).await {
            Ok(refreshed) => {
                let session = refreshed.session.clone();
                *state = Some(refreshed);
                self.changes.send_replace(AuthChange {
                    event: AuthEvent::TokenRefreshed,
                    session: Some(session.clone()),
                });
                Ok(Some(session))
            }
            Err(PortError::Unauthorized) => {
                warn!("Refresh token rejected; signing out");
                *state = None;
                self.changes.send_replace(AuthChange {
                    event: AuthEvent::SignedOut,
                    session: None,
                });
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    async fn sign_out(&self) -> PortResult<()> {
        let Some(stored) = self.state.lock().await.take() else {
            return Ok(());
        };
        // The local session is gone either way; the remote revoke is best effort.
        let result = async {
            let url = endpoint(&self.auth_url, "logout")?;
            let response = self
                .http
                .post(url)
                .header("apikey", &self.anon_key)
                .bearer_auth(&stored.session.access_token)
                .send()
                .await
                .map_err(transport_error)?;
            ensure_success(response, "sign-out").await
        }
        .await;
        if let Err(e) = result {
            warn!("Remote sign-out failed: {}", e);
        }
        self.changes.send_replace(AuthChange {
            event: AuthEvent::SignedOut,
            session: None,
        });
        info!("Signed out {}", stored.session.user_id);
        Ok(())
    }
}

//=========================================================================================
// Shared Helpers
//=========================================================================================

/// `{auth_url}/auth/v1/{path}`.
pub(crate) fn endpoint(auth_url: &Url, path: &str) -> PortResult<Url> {
    let joined = format!("{}/auth/v1/{}", auth_url.as_str().trim_end_matches('/'), path);
    Url::parse(&joined).map_err(|e| PortError::Unexpected(format!("Invalid auth URL {joined}: {e}")))
}

pub(crate) fn transport_error(err: reqwest::Error) -> PortError {
    PortError::Unexpected(format!("Auth request failed: {}", err))
}

/// Checks HTTP response status; returns the response on success or a port error with details.
pub(crate) async fn ensure_success(
    response: reqwest::Response,
    operation: &'static str,
) -> PortResult<reqwest::Response> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    Err(match status {
        400 | 401 | 403 => PortError::Unauthorized,
        404 => PortError::NotFound(format!("{operation}: {body}")),
        _ => PortError::Unexpected(format!("{operation} failed ({status}): {body}")),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(expires_in: Option<i64>, now: DateTime<Utc>) -> AuthSession {
        AuthSession {
            access_token: "t".to_string(),
            user_id: "u".to_string(),
            email: None,
            expires_at: expires_in.map(|secs| now + Duration::seconds(secs)),
        }
    }

    #[test]
    fn refresh_only_close_to_expiry() {
        let now = Utc::now();
        assert!(!needs_refresh(&session(None, now), now));
        assert!(!needs_refresh(&session(Some(120), now), now));
        assert!(needs_refresh(&session(Some(30), now), now));
        assert!(needs_refresh(&session(Some(-5), now), now));
    }

    #[test]
    fn token_response_prefers_absolute_expiry() {
        let now = Utc::now();
        let token: TokenResponse = serde_json::from_value(serde_json::json!({
            "access_token": "abc",
            "refresh_token": "r1",
            "expires_in": 3600,
            "expires_at": 1_900_000_000,
            "user": { "id": "user-9", "email": "ana@example.com" }
        }))
        .unwrap();
        let stored = token.into_session(now).unwrap();
        assert_eq!(stored.session.user_id, "user-9");
        assert_eq!(stored.session.expires_at.unwrap().timestamp(), 1_900_000_000);
        assert_eq!(stored.refresh_token.as_deref(), Some("r1"));
    }

    #[test]
    fn token_response_without_user_is_rejected() {
        let token: TokenResponse =
            serde_json::from_value(serde_json::json!({ "access_token": "abc" })).unwrap();
        assert!(token.into_session(Utc::now()).is_err());
    }

    #[test]
    fn authorize_url_carries_pkce_challenge() {
        let adapter = AuthRestAdapter::new("https://auth.example.com".parse().unwrap(), "anon");
        let redirect = adapter
            .authorize_url("google", "https://app.example.com/auth/callback")
            .unwrap();
        assert!(redirect
            .url
            .starts_with("https://auth.example.com/auth/v1/authorize?provider=google"));
        assert!(redirect.url.contains("code_challenge_method=s256"));
        assert!(redirect
            .url
            .contains(&format!("code_challenge={}", pkce::code_challenge(&redirect.code_verifier))));
    }

    #[tokio::test]
    async fn signed_out_adapter_has_no_session() {
        let adapter = AuthRestAdapter::new("https://auth.example.com".parse().unwrap(), "anon");
        let changes = adapter.subscribe();
        assert_eq!(adapter.get_session().await.unwrap(), None);
        adapter.sign_out().await.unwrap();
        assert_eq!(changes.borrow().event, AuthEvent::InitialSession);
    }
}
