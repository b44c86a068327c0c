//! crates/daily_quiz_core/src/profile.rs
//!
//! Fetches and caches the current user's profile, decides which completion
//! screen (if any) the user must see first, and wraps the profile mutations.
//! Client-side validation runs before any request is built.

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde_json::{json, Value};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::api::ApiClient;
use crate::domain::{CatalogEntry, Profile};
use crate::error::{ClientError, ClientResult};
use crate::normalize::{extract_list, first_timestamp, payload_object};
use crate::onboarding::OnboardingPayload;
use crate::ports::{ApiRequest, ApiResponse};
use crate::scheduling::RequestSlot;

pub const PROFILE_PATH: &str = "/api/profile";
pub const DISPLAY_NAME_PATH: &str = "/api/profile/display-name";
pub const AVATAR_PATH: &str = "/api/profile/avatar";
pub const USERNAME_PATH: &str = "/api/profile/username";
pub const COMPLETE_REGISTRATION_PATH: &str = "/api/profile/complete-registration";
pub const UNIVERSITIES_PATH: &str = "/api/profile/universities";
pub const MIR_SPECIALTIES_PATH: &str = "/api/profile/mir-specialties";
pub const ONBOARDING_PATH: &str = "/api/profile/onboarding";

pub const DISPLAY_NAME_LEN: std::ops::RangeInclusive<usize> = 2..=40;
static USERNAME_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9._]{3,30}$").expect("username pattern compiles"));

/// Where a signed-in user has to go before using the app.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileGate {
    NeedsOnboarding,
    NeedsDisplayName,
    Ready,
}

impl Profile {
    pub fn gate(&self) -> ProfileGate {
        if !self.onboarding_completed {
            ProfileGate::NeedsOnboarding
        } else if self.must_update_display_name {
            ProfileGate::NeedsDisplayName
        } else {
            ProfileGate::Ready
        }
    }
}

/// Trims the display name and checks its length in characters.
pub fn validate_display_name(raw: &str) -> ClientResult<String> {
    let name = raw.trim();
    if !DISPLAY_NAME_LEN.contains(&name.chars().count()) {
        return Err(ClientError::Validation(format!(
            "El nombre debe tener entre {} y {} caracteres",
            DISPLAY_NAME_LEN.start(),
            DISPLAY_NAME_LEN.end()
        )));
    }
    Ok(name.to_string())
}

/// Trims and lowercases the username and checks it against the allowed pattern.
pub fn validate_username(raw: &str) -> ClientResult<String> {
    let username = raw.trim().to_lowercase();
    if !USERNAME_PATTERN.is_match(&username) {
        return Err(ClientError::Validation(
            "El usuario debe tener entre 3 y 30 caracteres: letras minúsculas, números, '.' o '_'"
                .to_string(),
        ));
    }
    Ok(username)
}

/// Fields sent when finishing signup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    pub display_name: String,
    pub username: String,
}

pub struct ProfileResolver {
    api: ApiClient,
    cached: RwLock<Option<Profile>>,
    fetches: RequestSlot,
    lifetime: CancellationToken,
}

impl ProfileResolver {
    pub fn new(api: ApiClient) -> Self {
        Self {
            api,
            cached: RwLock::new(None),
            fetches: RequestSlot::new(),
            lifetime: CancellationToken::new(),
        }
    }

    /// The cached profile, fetching it on first use.
    pub async fn profile(&self) -> ClientResult<Profile> {
        if let Some(profile) = self.cached.read().await.clone() {
            return Ok(profile);
        }
        self.refresh().await
    }

    /// Refetches the profile; a newer refresh cancels an older one.
    pub async fn refresh(&self) -> ClientResult<Profile> {
        let token = self.fetches.begin();
        let response = self
            .api
            .send_ok(ApiRequest::get(PROFILE_PATH), &token)
            .await?;
        let profile = parse_profile(&response)?;
        *self.cached.write().await = Some(profile.clone());
        Ok(profile)
    }

    pub async fn gate(&self) -> ClientResult<ProfileGate> {
        Ok(self.profile().await?.gate())
    }

    pub async fn invalidate(&self) {
        *self.cached.write().await = None;
    }

    /// Aborts in-flight requests. The resolver must not be used afterwards.
    pub fn teardown(&self) {
        self.fetches.cancel();
        self.lifetime.cancel();
    }

    pub async fn update_display_name(&self, raw: &str) -> ClientResult<()> {
        let display_name = validate_display_name(raw)?;
        self.mutate(ApiRequest::post(
            DISPLAY_NAME_PATH,
            json!({ "displayName": display_name }),
        ))
        .await?;
        info!("Display name updated");
        Ok(())
    }

    pub async fn update_avatar(&self, avatar_id: &str) -> ClientResult<()> {
        let avatar_id = avatar_id.trim();
        if avatar_id.is_empty() {
            return Err(ClientError::Validation("Elige un avatar".to_string()));
        }
        self.mutate(ApiRequest::post(AVATAR_PATH, json!({ "avatarId": avatar_id })))
            .await?;
        Ok(())
    }

    /// Changes the username. The server rate-limits this and answers 403 with
    /// the time the next change becomes possible.
    pub async fn update_username(&self, raw: &str) -> ClientResult<()> {
        let username = validate_username(raw)?;
        let response = self
            .api
            .send(
                ApiRequest::post(USERNAME_PATH, json!({ "username": username })),
                &self.lifetime.child_token(),
            )
            .await?;
        let status = response.status;
        match status {
            403 => {
                let next_available_at = parse_lock_time(&response.body);
                warn!("Username change locked until {:?}", next_available_at);
                Err(ClientError::UsernameLocked { next_available_at })
            }
            409 => Err(ClientError::UsernameTaken),
            _ => {
                response.ensure_success()?;
                self.invalidate().await;
                Ok(())
            }
        }
    }

    pub async fn complete_registration(&self, registration: &Registration) -> ClientResult<()> {
        let display_name = validate_display_name(&registration.display_name)?;
        let username = validate_username(&registration.username)?;
        let response = self
            .api
            .send(
                ApiRequest::post(
                    COMPLETE_REGISTRATION_PATH,
                    json!({ "displayName": display_name, "username": username }),
                ),
                &self.lifetime.child_token(),
            )
            .await?;
        if response.status == 409 {
            return Err(ClientError::UsernameTaken);
        }
        response.ensure_success()?;
        self.invalidate().await;
        info!("Registration completed for {}", username);
        Ok(())
    }

    pub async fn universities(&self) -> ClientResult<Vec<CatalogEntry>> {
        self.catalog(UNIVERSITIES_PATH, &["universities", "universidades"])
            .await
    }

    pub async fn mir_specialties(&self) -> ClientResult<Vec<CatalogEntry>> {
        self.catalog(
            MIR_SPECIALTIES_PATH,
            &["specialties", "mirSpecialties", "mir_specialties", "especialidades"],
        )
        .await
    }

    pub async fn submit_onboarding(&self, payload: &OnboardingPayload) -> ClientResult<()> {
        let body = serde_json::to_value(payload)
            .map_err(|e| ClientError::Validation(format!("Invalid onboarding payload: {e}")))?;
        self.mutate(ApiRequest::post(ONBOARDING_PATH, body)).await?;
        info!("Onboarding submitted");
        Ok(())
    }

    async fn mutate(&self, request: ApiRequest) -> ClientResult<ApiResponse> {
        let response = self
            .api
            .send_ok(request, &self.lifetime.child_token())
            .await?;
        self.invalidate().await;
        Ok(response)
    }

    async fn catalog(&self, path: &str, keys: &[&str]) -> ClientResult<Vec<CatalogEntry>> {
        let response = self
            .api
            .send_ok(ApiRequest::get(path), &self.lifetime.child_token())
            .await?;
        Ok(parse_catalog(&response.body, keys))
    }
}

fn parse_profile(response: &ApiResponse) -> ClientResult<Profile> {
    response
        .body
        .get("profile")
        .filter(|profile| profile.is_object())
        .or_else(|| payload_object(&response.body))
        .and_then(Profile::from_json)
        .ok_or_else(|| ClientError::Server {
            status: response.status,
            message: "Perfil no válido".to_string(),
        })
}

fn parse_lock_time(body: &Value) -> Option<DateTime<Utc>> {
    first_timestamp(body, &["nextAvailableAt", "next_available_at"])
}

/// Reads a catalog list; entries may be objects or bare strings.
pub fn parse_catalog(body: &Value, keys: &[&str]) -> Vec<CatalogEntry> {
    let list = extract_list(body, keys)
        .or_else(|| extract_list(body, &["data", "items"]));
    list.map(|items| {
        items
            .iter()
            .filter_map(|item| match item {
                Value::String(name) if !name.trim().is_empty() => Some(CatalogEntry {
                    id: name.trim().to_string(),
                    name: name.trim().to_string(),
                }),
                _ => serde_json::from_value(item.clone()).ok(),
            })
            .collect()
    })
    .unwrap_or_default()
}
