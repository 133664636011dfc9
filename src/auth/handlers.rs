use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use tracing::{instrument, warn};

use crate::{
    auth::{
        dto::{
            ApiResponse, AuthData, ChangePasswordRequest, LoginRequest, Profile, RegisterRequest,
            UpdateProfileRequest, UserData,
        },
        jwt::AuthUser,
    },
    error::AppResult,
    state::AppState,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/me", get(get_me).put(update_me))
        .route("/auth/password", put(change_password))
}

/// Aliases kept for clients of the older users API.
pub fn profile_routes() -> Router<AppState> {
    Router::new().route("/users/profile", get(get_me).put(update_me))
}

#[instrument(skip_all)]
pub async fn register(
    State(state): State<AppState>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> AppResult<(StatusCode, Json<ApiResponse<AuthData>>)> {
    let Json(payload) = payload?;
    let (identity, token) = state.credentials.register(payload).await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::with_message(
            "User registered successfully",
            AuthData {
                user: Profile::from(identity),
                token,
            },
        )),
    ))
}

#[instrument(skip_all)]
pub async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> AppResult<Json<ApiResponse<AuthData>>> {
    let Json(payload) = payload?;
    let (identity, token) = state.credentials.authenticate(payload).await?;
    Ok(Json(ApiResponse::with_message(
        "Login successful",
        AuthData {
            user: Profile::from(identity),
            token,
        },
    )))
}

#[instrument(skip(state))]
pub async fn get_me(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> AppResult<Json<ApiResponse<UserData>>> {
    let identity = state.credentials.profile(user_id).await?;
    Ok(Json(ApiResponse::data(UserData {
        user: Profile::from(identity),
    })))
}

#[instrument(skip(state, payload))]
pub async fn update_me(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    payload: Result<Json<UpdateProfileRequest>, JsonRejection>,
) -> AppResult<Json<ApiResponse<UserData>>> {
    let Json(payload) = payload?;
    let identity = state.credentials.update_profile(user_id, payload).await?;
    Ok(Json(ApiResponse::with_message(
        "Profile updated successfully",
        UserData {
            user: Profile::from(identity),
        },
    )))
}

#[instrument(skip(state, payload))]
pub async fn change_password(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    payload: Result<Json<ChangePasswordRequest>, JsonRejection>,
) -> AppResult<Json<ApiResponse<()>>> {
    let Json(payload) = payload?;
    state
        .credentials
        .change_own_password(user_id, payload)
        .await?;
    // Outstanding reset grants were minted for the old password.
    if let Err(e) = state.ledger.retire(user_id).await {
        warn!(error = ?e, "reset tokens not retired after password change");
    }
    Ok(Json(ApiResponse::message("Password updated successfully")))
}
