use axum::{
    extract::{rejection::JsonRejection, State},
    routing::post,
    Json, Router,
};
use serde::Deserialize;
use tracing::{error, info, instrument};

use crate::{
    auth::{dto::ApiResponse, password, validate},
    error::{AppError, AppResult},
    notify,
    state::AppState,
};

/// Same text whether or not the email belongs to an account.
pub const FORGOT_PASSWORD_ACK: &str =
    "If an account with that email exists, a password reset link has been sent";

#[derive(Debug, Default, Deserialize)]
pub struct ForgotPasswordRequest {
    #[serde(default)]
    pub email: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct ResetPasswordRequest {
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub password: String,
}

pub fn reset_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/forgot-password", post(forgot_password))
        .route("/auth/reset-password", post(reset_password))
}

#[instrument(skip_all)]
pub async fn forgot_password(
    State(state): State<AppState>,
    payload: Result<Json<ForgotPasswordRequest>, JsonRejection>,
) -> AppResult<Json<ApiResponse<()>>> {
    let Json(payload) = payload?;
    let email = validate::email(&payload.email)?;

    match state.credentials.find_by_email(&email).await? {
        // A failed issue is not reported: only known emails reach the ledger.
        Some(identity) => match state.ledger.issue(identity.id).await {
            Ok(token) => {
                notify::send_password_reset(&state.notifier, identity.email, token, identity.name)
            }
            Err(e) => error!(user_id = %identity.id, error = ?e, "reset token issue failed"),
        },
        None => info!("password reset requested for unknown email"),
    }

    Ok(Json(ApiResponse::message(FORGOT_PASSWORD_ACK)))
}

/// Redeems before hashing so dead tokens cost no hash; the password write and the token
/// deletion then commit together.
#[instrument(skip_all)]
pub async fn reset_password(
    State(state): State<AppState>,
    payload: Result<Json<ResetPasswordRequest>, JsonRejection>,
) -> AppResult<Json<ApiResponse<()>>> {
    let Json(payload) = payload?;
    validate::reset(&payload.token, &payload.password)?;
    let token = payload.token.trim();

    state.ledger.redeem(token).await?;
    let password_hash = password::hash_password_async(payload.password)
        .await
        .map_err(AppError::internal)?;
    let user_id = state.ledger.consume(token, &password_hash).await?;

    info!(user_id = %user_id, "password reset completed");
    Ok(Json(ApiResponse::message("Password reset successful")))
}
