//! Integration tests: build the router over in-memory stores and drive the
//! auth endpoints end to end.

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use jobtrack_api::AppState;
use jobtrack_core::cache::TokenStore;
use jobtrack_core::cache::memory::MemoryTokenStore;
use jobtrack_core::notify::{MemoryNotifier, Notifier, TemplateKind};
use jobtrack_core::store::CredentialStore;
use jobtrack_core::store::memory::MemoryCredentialStore;
use jobtrack_core::{SessionConfig, SessionService};
use serde_json::{Value, json};
use tower::ServiceExt;

const UA: &str = "integration-test/1.0";

struct TestApp {
    router: Router,
    notifier: Arc<MemoryNotifier>,
}

fn app() -> TestApp {
    let mut config = SessionConfig::new("test-access-secret", "test-refresh-secret").unwrap();
    config.bcrypt_cost = 4;
    let notifier = Arc::new(MemoryNotifier::new());
    let session = SessionService::new(
        config,
        Arc::new(MemoryCredentialStore::new()) as Arc<dyn CredentialStore>,
        Arc::new(MemoryTokenStore::new()) as Arc<dyn TokenStore>,
        Arc::clone(&notifier) as Arc<dyn Notifier>,
    );
    TestApp {
        router: jobtrack_api::router(AppState::new(session)),
        notifier,
    }
}

impl TestApp {
    async fn call(
        &self,
        method: Method,
        uri: &str,
        bearer: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut req = Request::builder()
            .method(method)
            .uri(uri)
            .header("user-agent", UA);
        if let Some(token) = bearer {
            req = req.header("authorization", format!("Bearer {token}"));
        }
        let req = match body {
            Some(body) => req
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => req.body(Body::empty()).unwrap(),
        };

        let resp = self.router.clone().oneshot(req).await.expect("request");
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .expect("read body");
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).expect("parse JSON")
        };
        (status, json)
    }

    async fn register(&self, email: &str) -> Value {
        let (status, body) = self
            .call(
                Method::POST,
                "/auth/register",
                None,
                Some(json!({"email": email, "password": "Passw0rdOK", "firstName": "Jane"})),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        body
    }
}

#[tokio::test]
async fn register_login_me_refresh_logout() {
    let app = app();
    let registered = app.register("Jane@Example.com").await;
    assert_eq!(registered["account"]["email"], "jane@example.com");
    assert_eq!(registered["account"]["firstName"], "Jane");
    assert_eq!(registered["tokenType"], "Bearer");
    assert_eq!(registered["expiresIn"], 900);
    assert!(registered["account"].get("passwordHash").is_none());

    let (status, login) = app
        .call(
            Method::POST,
            "/auth/login",
            None,
            Some(json!({"email": "jane@example.com", "password": "Passw0rdOK"})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let access = login["accessToken"].as_str().unwrap().to_string();
    let refresh = login["refreshToken"].as_str().unwrap().to_string();

    let (status, me) = app.call(Method::GET, "/auth/me", Some(&access), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["email"], "jane@example.com");

    let (status, rotated) = app
        .call(
            Method::POST,
            "/auth/refresh",
            None,
            Some(json!({"refreshToken": refresh})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let new_refresh = rotated["refreshToken"].as_str().unwrap().to_string();

    // The rotated-out token is dead.
    let (status, body) = app
        .call(
            Method::POST,
            "/auth/refresh",
            None,
            Some(json!({"refreshToken": refresh})),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "Invalid refresh token");

    let (status, body) = app
        .call(
            Method::POST,
            "/auth/logout",
            Some(&access),
            Some(json!({"refreshToken": new_refresh})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);

    // The access token is blacklisted.
    let (status, _) = app.call(Method::GET, "/auth/me", Some(&access), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn duplicate_registration_conflicts() {
    let app = app();
    app.register("jane@example.com").await;
    let (status, body) = app
        .call(
            Method::POST,
            "/auth/register",
            None,
            Some(json!({"email": "JANE@example.com", "password": "Passw0rdOK"})),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "conflict");
    assert_eq!(body["message"], "Email already in use");
}

#[tokio::test]
async fn bad_credentials_are_unauthorized() {
    let app = app();
    app.register("jane@example.com").await;
    for email in ["jane@example.com", "ghost@example.com"] {
        let (status, body) = app
            .call(
                Method::POST,
                "/auth/login",
                None,
                Some(json!({"email": email, "password": "Wr0ngPassword"})),
            )
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["message"], "Invalid credentials");
    }
}

#[tokio::test]
async fn protected_routes_require_a_bearer_token() {
    let app = app();
    let (status, body) = app.call(Method::GET, "/auth/me", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "Missing authorization header");

    let (status, _) = app
        .call(Method::GET, "/auth/oauth/connections", Some("garbage"), None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn password_reset_over_http() {
    let app = app();
    app.register("jane@example.com").await;

    let (status, body) = app
        .call(
            Method::POST,
            "/auth/password-reset",
            None,
            Some(json!({"email": "jane@example.com"})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);

    let sent = app.notifier.last(TemplateKind::PasswordReset).unwrap();
    let url = sent.data["resetUrl"].as_str().unwrap();
    let token = url.rsplit_once("token=").unwrap().1;

    let (status, _) = app
        .call(
            Method::POST,
            "/auth/password-reset/confirm",
            None,
            Some(json!({"token": token, "newPassword": "N3wPassword"})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app
        .call(
            Method::POST,
            "/auth/login",
            None,
            Some(json!({"email": "jane@example.com", "password": "N3wPassword"})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn account_self_service() {
    let app = app();
    let registered = app.register("jane@example.com").await;
    let access = registered["accessToken"].as_str().unwrap().to_string();

    let (status, body) = app
        .call(
            Method::PATCH,
            "/account/profile",
            Some(&access),
            Some(json!({"lastName": "Doe"})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["firstName"], "Jane");
    assert_eq!(body["lastName"], "Doe");

    let (status, body) = app
        .call(
            Method::POST,
            "/account/password",
            Some(&access),
            Some(json!({"oldPassword": "nope", "newPassword": "N3wPassword"})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Old password is incorrect");

    let (status, _) = app
        .call(
            Method::POST,
            "/account/email-change",
            Some(&access),
            Some(json!({"newEmail": "jane.doe@example.com"})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let code = app.notifier.last(TemplateKind::EmailChange).unwrap().data["code"]
        .as_str()
        .unwrap()
        .to_string();

    let (status, body) = app
        .call(
            Method::POST,
            "/account/email-change/confirm",
            Some(&access),
            Some(json!({"code": code})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["email"], "jane.doe@example.com");
}

#[tokio::test]
async fn unknown_oauth_provider_is_not_found() {
    let app = app();
    let (status, _) = app
        .call(
            Method::POST,
            "/auth/oauth/google/callback",
            None,
            Some(json!({"code": "abc"})),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn connections_start_empty() {
    let app = app();
    let registered = app.register("jane@example.com").await;
    let access = registered["accessToken"].as_str().unwrap();

    let (status, body) = app
        .call(Method::GET, "/auth/oauth/connections", Some(access), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!([]));

    let (status, body) = app
        .call(
            Method::DELETE,
            "/auth/oauth/connections/does-not-exist",
            Some(access),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "OAuth connection not found");
}
