//! services/app/src/web/account.rs
//!
//! Contains the account-deletion handler and the master definition for the
//! OpenAPI specification of the account service.

use crate::web::state::{AppState, AuthenticatedUser};
use axum::{
    extract::State,
    http::StatusCode,
    response::Json,
    Extension,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info};
use utoipa::{OpenApi, ToSchema};

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        delete_account_handler,
    ),
    components(
        schemas(DeleteAccountResponse, ErrorResponse)
    ),
    tags(
        (name = "Account API", description = "Privileged account operations for the daily quiz app.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// API Response Structs
//=========================================================================================

#[derive(Debug, Serialize, ToSchema, PartialEq)]
pub struct DeleteAccountResponse {
    pub deleted: bool,
}

#[derive(Debug, Serialize, ToSchema, PartialEq)]
pub struct ErrorResponse {
    pub error: String,
}

//=========================================================================================
// Handlers
//=========================================================================================

/// Delete the caller's account.
///
/// The caller is identified by the bearer token; the deletion itself runs with
/// the auth provider's service-role credential.
#[utoipa::path(
    delete,
    path = "/api/account",
    responses(
        (status = 200, description = "Account deleted", body = DeleteAccountResponse),
        (status = 401, description = "Missing or invalid bearer token"),
        (status = 500, description = "The auth provider refused the deletion", body = ErrorResponse)
    ),
    params(
        ("Authorization" = String, Header, description = "Bearer access token of the account to delete.")
    )
)]
pub async fn delete_account_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(user): Extension<AuthenticatedUser>,
) -> Result<Json<DeleteAccountResponse>, (StatusCode, Json<ErrorResponse>)> {
    match app_state.admin.delete_user(&user.0).await {
        Ok(()) => {
            info!("Account {} deleted on request", user.0);
            Ok(Json(DeleteAccountResponse { deleted: true }))
        }
        Err(e) => {
            error!("Failed to delete account {}: {:?}", user.0, e);
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: "No se pudo eliminar la cuenta".to_string(),
                }),
            ))
        }
    }
}
