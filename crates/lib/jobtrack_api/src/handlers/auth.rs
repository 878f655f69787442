//! Authentication request handlers.

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::{Extension, Json};
use jobtrack_core::models::auth::Profile;

use crate::AppState;
use crate::error::AppResult;
use crate::middleware::auth::{CurrentAccount, fingerprint};
use crate::models::{
    AccountResponse, AuthResponse, LoginRequest, LogoutRequest, RefreshRequest, RegisterRequest,
    SuccessResponse, TokenResponse,
};

/// `POST /auth/register`: create an account and sign it in.
pub async fn register_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<RegisterRequest>,
) -> AppResult<(StatusCode, Json<AuthResponse>)> {
    let profile = Profile {
        first_name: body.first_name,
        last_name: body.last_name,
    };
    let payload = state
        .session
        .register(&body.email, &body.password, profile, &fingerprint(&headers))
        .await?;
    Ok((StatusCode::CREATED, Json(payload.into())))
}

/// `POST /auth/login`: authenticate with email + password.
pub async fn login_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<LoginRequest>,
) -> AppResult<Json<AuthResponse>> {
    let payload = state
        .session
        .login(&body.email, &body.password, &fingerprint(&headers))
        .await?;
    Ok(Json(payload.into()))
}

/// `POST /auth/refresh`: exchange a refresh token for a new token pair.
pub async fn refresh_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<RefreshRequest>,
) -> AppResult<Json<TokenResponse>> {
    let pair = state
        .session
        .refresh(&body.refresh_token, &fingerprint(&headers))
        .await?;
    Ok(Json(pair.into()))
}

/// `POST /auth/logout`: revoke the refresh token and the bearer token.
pub async fn logout_handler(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentAccount>,
    Json(body): Json<LogoutRequest>,
) -> AppResult<Json<SuccessResponse>> {
    let success = state
        .session
        .logout(
            &body.refresh_token,
            &current.account.id,
            Some(&current.access_token),
        )
        .await?;
    Ok(Json(SuccessResponse { success }))
}

/// `GET /auth/me`: the signed-in account.
pub async fn me_handler(Extension(current): Extension<CurrentAccount>) -> Json<AccountResponse> {
    Json(current.account.into())
}
