//! Authentication middleware: Bearer token extraction and session validation.

use axum::extract::{Request, State};
use axum::http::HeaderMap;
use axum::http::header::{AUTHORIZATION, USER_AGENT};
use axum::middleware::Next;
use axum::response::Response;
use jobtrack_core::models::auth::Account;

use crate::AppState;
use crate::error::AppError;

/// The signed-in account, stored in request extensions.
#[derive(Debug, Clone)]
pub struct CurrentAccount {
    pub account: Account,
    /// The bearer token the request was authorized with.
    pub access_token: String,
}

/// Axum middleware: extracts `Authorization: Bearer <token>`, resolves the
/// account through the session service and injects [`CurrentAccount`].
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::Unauthorized("Missing authorization header".into()))?;

    let token = header
        .strip_prefix("Bearer ")
        .ok_or_else(|| AppError::Unauthorized("Invalid authorization scheme".into()))?
        .to_string();

    let account = state
        .session
        .validate_access_token(&token)
        .await
        .ok_or_else(|| AppError::Unauthorized("Invalid or expired token".into()))?;

    request.extensions_mut().insert(CurrentAccount {
        account,
        access_token: token,
    });

    Ok(next.run(request).await)
}

/// Client fingerprint recorded on refresh records.
pub fn fingerprint(headers: &HeaderMap) -> String {
    headers
        .get(USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .unwrap_or("unknown")
        .to_string()
}
