//! Admin gate
//!
//! HTTP Basic authentication for every path under `/admin`. Other paths
//! pass through untouched.

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use tracing::{debug, warn};

use crate::AppState;

/// Route prefix protected by the gate
pub const ADMIN_PREFIX: &str = "/admin";

const REALM: &str = "Basic realm=\"Secure Area\"";

/// Configured admin username and password
#[derive(Clone, PartialEq, Eq)]
pub struct AdminCredentials {
    pub username: String,
    pub password: String,
}

impl AdminCredentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    fn matches(&self, username: &str, password: &str) -> bool {
        self.username == username && self.password == password
    }
}

impl std::fmt::Debug for AdminCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdminCredentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Decode `Basic base64(user:pass)`
///
/// The scheme token is matched case-insensitively. Returns `None` for any
/// other scheme or a malformed payload. The password may itself contain `:`.
pub fn parse_basic_auth(value: &str) -> Option<(String, String)> {
    let (scheme, encoded) = value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }
    let decoded = STANDARD.decode(encoded.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (user, pass) = decoded.split_once(':')?;
    Some((user.to_string(), pass.to_string()))
}

/// Gate rejection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthError {
    /// No `Authorization` header
    Missing,
    /// Wrong, malformed, or unconfigured credentials
    Rejected,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let body = match self {
            AuthError::Missing => "Auth required",
            AuthError::Rejected => "Unauthorized",
        };
        (
            StatusCode::UNAUTHORIZED,
            [(header::WWW_AUTHENTICATE, HeaderValue::from_static(REALM))],
            body,
        )
            .into_response()
    }
}

/// Check request headers against the configured credentials
pub fn check_credentials(
    headers: &HeaderMap,
    expected: Option<&AdminCredentials>,
) -> Result<(), AuthError> {
    let value = headers
        .get(header::AUTHORIZATION)
        .ok_or(AuthError::Missing)?;

    let Some(expected) = expected else {
        warn!("Admin request rejected: no admin credentials configured");
        return Err(AuthError::Rejected);
    };

    let (user, pass) = value
        .to_str()
        .ok()
        .and_then(parse_basic_auth)
        .ok_or(AuthError::Rejected)?;

    if expected.matches(&user, &pass) {
        Ok(())
    } else {
        warn!(user = %user, "Admin request rejected: bad credentials");
        Err(AuthError::Rejected)
    }
}

/// Middleware applied to the whole router
pub async fn admin_gate(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    if !request.uri().path().starts_with(ADMIN_PREFIX) {
        return Ok(next.run(request).await);
    }

    check_credentials(request.headers(), state.admin.as_ref())?;
    debug!(path = %request.uri().path(), "Admin request authorized");
    Ok(next.run(request).await)
}
