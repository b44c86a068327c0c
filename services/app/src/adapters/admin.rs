//! services/app/src/adapters/admin.rs
//!
//! This module contains the privileged `AccountAdminService` implementation,
//! authenticated with the auth provider's service-role key.

use async_trait::async_trait;
use daily_quiz_core::ports::{AccountAdminService, PortError, PortResult};
use reqwest::Url;
use tracing::info;

use crate::adapters::auth::{endpoint, ensure_success, transport_error, AuthUser};

pub struct AdminAuthAdapter {
    http: reqwest::Client,
    auth_url: Url,
    service_role_key: String,
}

impl AdminAuthAdapter {
    pub fn new(auth_url: Url, service_role_key: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            auth_url,
            service_role_key: service_role_key.into(),
        }
    }

    /// Use a custom HTTP client (for connection pool reuse).
    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.http = client;
        self
    }
}

#[async_trait]
impl AccountAdminService for AdminAuthAdapter {
    async fn resolve_user(&self, access_token: &str) -> PortResult<String> {
        let response = self
            .http
            .get(endpoint(&self.auth_url, "user")?)
            .header("apikey", &self.service_role_key)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(transport_error)?;
        let response = ensure_success(response, "user lookup").await?;
        let user = response
            .json::<AuthUser>()
            .await
            .map_err(|e| PortError::Unexpected(format!("Invalid user response: {}", e)))?;
        Ok(user.id)
    }

    async fn delete_user(&self, user_id: &str) -> PortResult<()> {
        let url = endpoint(&self.auth_url, &format!("admin/users/{}", user_id))?;
        let response = self
            .http
            .delete(url)
            .header("apikey", &self.service_role_key)
            .bearer_auth(&self.service_role_key)
            .send()
            .await
            .map_err(transport_error)?;
        ensure_success(response, "user deletion").await?;
        info!("Deleted user {}", user_id);
        Ok(())
    }
}
