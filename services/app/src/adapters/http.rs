//! services/app/src/adapters/http.rs
//!
//! This module contains the reqwest-backed implementation of the `HttpTransport` port.

use async_trait::async_trait;
use daily_quiz_core::ports::{ApiRequest, ApiResponse, HttpMethod, HttpTransport, PortError, PortResult};
use reqwest::Url;
use serde_json::Value;
use tracing::debug;

/// Sends API requests relative to a base URL.
#[derive(Clone)]
pub struct ReqwestTransport {
    http: reqwest::Client,
    base_url: Url,
}

impl ReqwestTransport {
    pub fn new(base_url: Url) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url,
        }
    }

    /// Use a custom HTTP client (for connection pool reuse).
    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.http = client;
        self
    }

    /// Appends `path` to the base URL, keeping any path prefix the base has.
    pub fn url_for(&self, path: &str) -> PortResult<Url> {
        let joined = format!(
            "{}/{}",
            self.base_url.as_str().trim_end_matches('/'),
            path.trim_start_matches('/')
        );
        Url::parse(&joined).map_err(|e| PortError::Unexpected(format!("Invalid URL {joined}: {e}")))
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: ApiRequest) -> PortResult<ApiResponse> {
        let url = self.url_for(&request.path)?;
        let mut builder = match request.method {
            HttpMethod::Get => self.http.get(url),
            HttpMethod::Post => self.http.post(url),
            HttpMethod::Delete => self.http.delete(url),
        };
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }
        if let Some(token) = &request.bearer {
            builder = builder.bearer_auth(token);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| PortError::Unexpected(format!("Request to {} failed: {}", request.path, e)))?;
        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .map_err(|e| PortError::Unexpected(format!("Failed to read response body: {}", e)))?;
        debug!("{:?} {} -> {}", request.method, request.path, status);

        Ok(ApiResponse {
            status,
            body: parse_body(&text),
        })
    }
}

/// JSON bodies are parsed; anything else is kept as a string and empty bodies become `Null`.
pub fn parse_body(text: &str) -> Value {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Value::Null;
    }
    serde_json::from_str(trimmed).unwrap_or_else(|_| Value::String(text.to_string()))
}
