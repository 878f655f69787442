//! Route paths.

pub const POST_AUTH_REGISTER: &str = "/auth/register";
pub const POST_AUTH_LOGIN: &str = "/auth/login";
pub const POST_AUTH_REFRESH: &str = "/auth/refresh";
pub const POST_AUTH_LOGOUT: &str = "/auth/logout";
pub const GET_AUTH_ME: &str = "/auth/me";
pub const POST_AUTH_OAUTH_CALLBACK: &str = "/auth/oauth/{provider}/callback";
pub const GET_AUTH_OAUTH_CONNECTIONS: &str = "/auth/oauth/connections";
pub const DELETE_AUTH_OAUTH_CONNECTIONS_ID: &str = "/auth/oauth/connections/{id}";
pub const POST_AUTH_PASSWORD_RESET: &str = "/auth/password-reset";
pub const POST_AUTH_PASSWORD_RESET_CONFIRM: &str = "/auth/password-reset/confirm";
pub const POST_ACCOUNT_PASSWORD: &str = "/account/password";
pub const PATCH_ACCOUNT_PROFILE: &str = "/account/profile";
pub const POST_ACCOUNT_EMAIL_CHANGE: &str = "/account/email-change";
pub const POST_ACCOUNT_EMAIL_CHANGE_CONFIRM: &str = "/account/email-change/confirm";
