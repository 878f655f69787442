//! OAuth sign-in and linked-connection handlers.

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::{Extension, Json};
use jobtrack_core::session::OAuthLogin;

use crate::AppState;
use crate::error::{AppError, AppResult};
use crate::middleware::auth::{CurrentAccount, fingerprint};
use crate::models::{AuthResponse, ConnectionResponse, OAuthCallbackRequest, SuccessResponse};

/// `POST /auth/oauth/{provider}/callback`: finish an authorization-code
/// sign-in.
pub async fn callback_handler(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    headers: HeaderMap,
    Json(body): Json<OAuthCallbackRequest>,
) -> AppResult<Json<AuthResponse>> {
    if !state.session.has_provider(&provider) {
        return Err(AppError::NotFound(format!("OAuth provider {provider}")));
    }
    let payload = state
        .session
        .oauth_login(
            OAuthLogin::AuthorizationCode {
                provider,
                code: body.code,
            },
            &fingerprint(&headers),
        )
        .await?;
    Ok(Json(payload.into()))
}

/// `GET /auth/oauth/connections`
pub async fn list_connections_handler(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentAccount>,
) -> AppResult<Json<Vec<ConnectionResponse>>> {
    let identities = state
        .session
        .list_external_identities(&current.account.id)
        .await?;
    Ok(Json(identities.into_iter().map(Into::into).collect()))
}

/// `DELETE /auth/oauth/connections/{id}`
pub async fn remove_connection_handler(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentAccount>,
    Path(id): Path<String>,
) -> AppResult<Json<SuccessResponse>> {
    let success = state
        .session
        .remove_external_identity(&current.account.id, &id)
        .await?;
    Ok(Json(SuccessResponse { success }))
}
