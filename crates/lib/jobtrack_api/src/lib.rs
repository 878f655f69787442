//! # jobtrack_api
//!
//! HTTP API library for Jobtrack authentication.

pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{delete, get, patch, post};
use jobtrack_core::SessionService;
use tower_http::cors::{Any, CorsLayer};

use crate::handlers::{account, auth, oauth};

/// Shared application state passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub session: Arc<SessionService>,
}

impl AppState {
    pub fn new(session: SessionService) -> Self {
        Self {
            session: Arc::new(session),
        }
    }
}

/// Builds the Axum router with all routes and shared state.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Public routes (no auth required)
    let public = Router::new()
        .route(routes::POST_AUTH_REGISTER, post(auth::register_handler))
        .route(routes::POST_AUTH_LOGIN, post(auth::login_handler))
        .route(routes::POST_AUTH_REFRESH, post(auth::refresh_handler))
        .route(routes::POST_AUTH_OAUTH_CALLBACK, post(oauth::callback_handler))
        .route(
            routes::POST_AUTH_PASSWORD_RESET,
            post(account::request_password_reset_handler),
        )
        .route(
            routes::POST_AUTH_PASSWORD_RESET_CONFIRM,
            post(account::reset_password_handler),
        );

    // Protected routes (require auth)
    let protected = Router::new()
        .route(routes::POST_AUTH_LOGOUT, post(auth::logout_handler))
        .route(routes::GET_AUTH_ME, get(auth::me_handler))
        .route(routes::GET_AUTH_OAUTH_CONNECTIONS, get(oauth::list_connections_handler))
        .route(
            routes::DELETE_AUTH_OAUTH_CONNECTIONS_ID,
            delete(oauth::remove_connection_handler),
        )
        .route(routes::POST_ACCOUNT_PASSWORD, post(account::change_password_handler))
        .route(routes::PATCH_ACCOUNT_PROFILE, patch(account::update_profile_handler))
        .route(
            routes::POST_ACCOUNT_EMAIL_CHANGE,
            post(account::request_email_change_handler),
        )
        .route(
            routes::POST_ACCOUNT_EMAIL_CHANGE_CONFIRM,
            post(account::confirm_email_change_handler),
        )
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::require_auth,
        ));

    Router::new()
        .merge(public)
        .merge(protected)
        .layer(cors)
        .with_state(state)
}
