//! Password and email self-service handlers.

use axum::extract::State;
use axum::{Extension, Json};

use crate::AppState;
use crate::error::AppResult;
use crate::middleware::auth::CurrentAccount;
use crate::models::{
    AccountResponse, ChangePasswordRequest, EmailChangeConfirmRequest, EmailChangeRequest,
    PasswordResetConfirmRequest, PasswordResetRequest, SuccessResponse, UpdateProfileRequest,
};

/// `POST /auth/password-reset`: always succeeds.
pub async fn request_password_reset_handler(
    State(state): State<AppState>,
    Json(body): Json<PasswordResetRequest>,
) -> AppResult<Json<SuccessResponse>> {
    let success = state.session.request_password_reset(&body.email).await?;
    Ok(Json(SuccessResponse { success }))
}

/// `POST /auth/password-reset/confirm`
pub async fn reset_password_handler(
    State(state): State<AppState>,
    Json(body): Json<PasswordResetConfirmRequest>,
) -> AppResult<Json<SuccessResponse>> {
    let success = state
        .session
        .reset_password(&body.token, &body.new_password)
        .await?;
    Ok(Json(SuccessResponse { success }))
}

/// `POST /account/password`
pub async fn change_password_handler(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentAccount>,
    Json(body): Json<ChangePasswordRequest>,
) -> AppResult<Json<SuccessResponse>> {
    let success = state
        .session
        .change_password(
            &current.account.id,
            body.old_password.as_deref(),
            &body.new_password,
        )
        .await?;
    Ok(Json(SuccessResponse { success }))
}

/// `PATCH /account/profile`
pub async fn update_profile_handler(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentAccount>,
    Json(body): Json<UpdateProfileRequest>,
) -> AppResult<Json<AccountResponse>> {
    let account = state
        .session
        .update_profile(&current.account.id, body.first_name, body.last_name)
        .await?;
    Ok(Json(account.into()))
}

/// `POST /account/email-change`: send a code to the new address.
pub async fn request_email_change_handler(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentAccount>,
    Json(body): Json<EmailChangeRequest>,
) -> AppResult<Json<SuccessResponse>> {
    let success = state
        .session
        .request_email_change(&current.account.id, &body.new_email)
        .await?;
    Ok(Json(SuccessResponse { success }))
}

/// `POST /account/email-change/confirm`
pub async fn confirm_email_change_handler(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentAccount>,
    Json(body): Json<EmailChangeConfirmRequest>,
) -> AppResult<Json<AccountResponse>> {
    let account = state
        .session
        .confirm_email_change(&current.account.id, &body.code)
        .await?;
    Ok(Json(account.into()))
}
