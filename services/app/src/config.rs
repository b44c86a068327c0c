//! services/app/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use std::net::SocketAddr;

use reqwest::Url;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub log_level: Level,
    pub api_base_url: Url,
    pub auth_url: Url,
    pub auth_anon_key: String,
    /// Only the account-deletion server needs this.
    pub auth_service_role_key: Option<String>,
    pub avatar_base_url: String,
    pub quiz_email: Option<String>,
    pub quiz_password: Option<String>,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from any key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let required =
            |key: &str| var(key).ok_or_else(|| ConfigError::MissingVar(key.to_string()));

        // --- Server Settings ---
        let bind_address_str = var("BIND_ADDRESS").unwrap_or_else(|| "0.0.0.0:3000".to_string());
        let bind_address = bind_address_str.parse::<SocketAddr>().map_err(|e| {
            ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string())
        })?;

        let log_level_str = var("RUST_LOG").unwrap_or_else(|| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        // --- Remote API and Auth Provider ---
        let api_base_url = parse_url("API_BASE_URL", &required("API_BASE_URL")?)?;
        let auth_url = parse_url("AUTH_URL", &required("AUTH_URL")?)?;
        let auth_anon_key = required("AUTH_ANON_KEY")?;
        let auth_service_role_key = var("AUTH_SERVICE_ROLE_KEY");

        let avatar_base_url = var("AVATAR_BASE_URL").unwrap_or_else(|| "/avatars".to_string());

        // --- Terminal Client Credentials (optional) ---
        let quiz_email = var("QUIZ_EMAIL");
        let quiz_password = var("QUIZ_PASSWORD");

        Ok(Self {
            bind_address,
            log_level,
            api_base_url,
            auth_url,
            auth_anon_key,
            auth_service_role_key,
            avatar_base_url,
            quiz_email,
            quiz_password,
        })
    }

    /// The image URL for an avatar id.
    pub fn avatar_url(&self, avatar_id: &str) -> String {
        format!(
            "{}/{}.png",
            self.avatar_base_url.trim_end_matches('/'),
            avatar_id.trim()
        )
    }

    pub fn service_role_key(&self) -> Result<&str, ConfigError> {
        self.auth_service_role_key
            .as_deref()
            .ok_or_else(|| ConfigError::MissingVar("AUTH_SERVICE_ROLE_KEY".to_string()))
    }
}

fn parse_url(key: &str, raw: &str) -> Result<Url, ConfigError> {
    Url::parse(raw.trim()).map_err(|e| ConfigError::InvalidValue(key.to_string(), e.to_string()))
}
