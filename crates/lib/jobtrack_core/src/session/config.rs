//! Session configuration.

use std::fmt;
use std::time::Duration;

use crate::auth::jwt::{ACCESS_TOKEN_EXPIRY_SECS, REFRESH_TOKEN_EXPIRY_DAYS};
use crate::auth::password::{BCRYPT_COST_RANGE, DEFAULT_BCRYPT_COST};
use crate::error::SessionError;
use crate::single_use::DEFAULT_TOKEN_TTL;

/// Settings for [`super::SessionService`].
#[derive(Clone)]
pub struct SessionConfig {
    pub access_secret: String,
    pub refresh_secret: String,
    pub access_token_lifetime: chrono::Duration,
    pub refresh_token_lifetime: chrono::Duration,
    pub bcrypt_cost: u32,
    pub password_reset_ttl: Duration,
    pub email_change_ttl: Duration,
    /// Include underlying error text in OAuth failures. Development only.
    pub expose_error_detail: bool,
    /// Base URL the password-reset link points at; the token is appended as
    /// `?token=`.
    pub reset_url_base: String,
}

impl SessionConfig {
    /// Defaults around the two signing secrets. Both must be non-empty.
    pub fn new(
        access_secret: impl Into<String>,
        refresh_secret: impl Into<String>,
    ) -> Result<Self, SessionError> {
        let access_secret = access_secret.into();
        let refresh_secret = refresh_secret.into();
        if access_secret.trim().is_empty() {
            return Err(SessionError::Configuration(
                "JWT_ACCESS_SECRET is not configured".into(),
            ));
        }
        if refresh_secret.trim().is_empty() {
            return Err(SessionError::Configuration(
                "JWT_REFRESH_SECRET is not configured".into(),
            ));
        }
        Ok(Self {
            access_secret,
            refresh_secret,
            access_token_lifetime: chrono::Duration::seconds(ACCESS_TOKEN_EXPIRY_SECS),
            refresh_token_lifetime: chrono::Duration::days(REFRESH_TOKEN_EXPIRY_DAYS),
            bcrypt_cost: DEFAULT_BCRYPT_COST,
            password_reset_ttl: DEFAULT_TOKEN_TTL,
            email_change_ttl: DEFAULT_TOKEN_TTL,
            expose_error_detail: false,
            reset_url_base: "http://localhost:3000/reset-password".into(),
        })
    }

    /// Build from the process environment.
    ///
    /// Requires `JWT_ACCESS_SECRET` and `JWT_REFRESH_SECRET`. Optional:
    /// `PASSWORD_RESET_EXPIRATION`, `EMAIL_CHANGE_EXPIRATION` (minutes),
    /// `BCRYPT_COST`, `FRONTEND_URL`, `EXPOSE_ERROR_DETAIL`.
    pub fn from_env() -> Result<Self, SessionError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, SessionError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::new(
            lookup("JWT_ACCESS_SECRET").unwrap_or_default(),
            lookup("JWT_REFRESH_SECRET").unwrap_or_default(),
        )?;

        if let Some(ttl) = minutes_var(&lookup, "PASSWORD_RESET_EXPIRATION")? {
            config.password_reset_ttl = ttl;
        }
        if let Some(ttl) = minutes_var(&lookup, "EMAIL_CHANGE_EXPIRATION")? {
            config.email_change_ttl = ttl;
        }
        if let Some(cost) = parse_var::<u32>(&lookup, "BCRYPT_COST")? {
            if !BCRYPT_COST_RANGE.contains(&cost) {
                return Err(SessionError::Configuration(format!(
                    "BCRYPT_COST must be between {} and {}",
                    BCRYPT_COST_RANGE.start(),
                    BCRYPT_COST_RANGE.end()
                )));
            }
            config.bcrypt_cost = cost;
        }
        if let Some(base) = lookup("FRONTEND_URL").filter(|v| !v.trim().is_empty()) {
            config.reset_url_base = format!("{}/reset-password", base.trim_end_matches('/'));
        }
        config.expose_error_detail = matches!(
            lookup("EXPOSE_ERROR_DETAIL").as_deref(),
            Some("1" | "true" | "yes")
        );
        Ok(config)
    }
}

/// Token lifetime given in whole minutes; zero and overflowing values are
/// rejected.
fn minutes_var(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
) -> Result<Option<Duration>, SessionError> {
    let Some(minutes) = parse_var::<u64>(lookup, name)? else {
        return Ok(None);
    };
    match minutes.checked_mul(60) {
        Some(secs) if secs > 0 => Ok(Some(Duration::from_secs(secs))),
        _ => Err(SessionError::Configuration(format!(
            "{name} must be a positive number of minutes"
        ))),
    }
}

fn parse_var<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
) -> Result<Option<T>, SessionError> {
    match lookup(name).filter(|v| !v.trim().is_empty()) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| SessionError::Configuration(format!("{name} is not a valid number"))),
    }
}

impl fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionConfig")
            .field("access_secret", &"<redacted>")
            .field("refresh_secret", &"<redacted>")
            .field("access_token_lifetime", &self.access_token_lifetime)
            .field("refresh_token_lifetime", &self.refresh_token_lifetime)
            .field("bcrypt_cost", &self.bcrypt_cost)
            .field("password_reset_ttl", &self.password_reset_ttl)
            .field("email_change_ttl", &self.email_change_ttl)
            .field("expose_error_detail", &self.expose_error_detail)
            .field("reset_url_base", &self.reset_url_base)
            .finish()
    }
}
