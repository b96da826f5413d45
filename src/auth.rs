//! HTTP basic authentication for the static files.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{
        HeaderMap, StatusCode,
        header::{AUTHORIZATION, WWW_AUTHENTICATE},
    },
    middleware::Next,
    response::{IntoResponse, Response},
};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use rand::Rng;
use rand::distr::Alphanumeric;
use sha2::{Digest, Sha256};

/// Challenge sent with every 401.
pub const CHALLENGE: &str = "Basic realm=\"Restricted\"";

/// The single username/password pair accepted by the server.
#[derive(Clone)]
pub struct Credentials {
    username: String,
    password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Parse `user:password`. Only the first colon separates the two, so
    /// passwords may contain colons but usernames cannot.
    pub fn parse(value: &str) -> Self {
        match value.split_once(':') {
            Some((username, password)) => Self::new(username, password),
            None => Self::new(value, ""),
        }
    }

    /// Random alphanumeric password of `length` characters from the thread
    /// local CSPRNG.
    pub fn generate(username: impl Into<String>, length: usize) -> Self {
        let password: String = rand::rng()
            .sample_iter(&Alphanumeric)
            .take(length)
            .map(char::from)
            .collect();
        Self::new(username, password)
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn password(&self) -> &str {
        &self.password
    }

    /// Compare against presented credentials without short-circuiting on the
    /// first differing byte.
    pub fn matches(&self, username: &str, password: &str) -> bool {
        let user_ok = digest_eq(&self.username, username);
        let pass_ok = digest_eq(&self.password, password);
        user_ok & pass_ok
    }
}

fn digest_eq(expected: &str, given: &str) -> bool {
    let a = Sha256::digest(expected.as_bytes());
    let b = Sha256::digest(given.as_bytes());
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Extract `(username, password)` from an `Authorization: Basic ...` header.
pub fn basic_credentials(headers: &HeaderMap) -> Option<(String, String)> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, encoded) = value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }
    let decoded = STANDARD.decode(encoded.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (username, password) = decoded.split_once(':')?;
    Some((username.to_string(), password.to_string()))
}

/// Reject requests that do not carry the configured credentials.
pub async fn require_basic_auth(
    State(credentials): State<Arc<Credentials>>,
    req: Request,
    next: Next,
) -> Response {
    let allowed = basic_credentials(req.headers())
        .is_some_and(|(user, pass)| credentials.matches(&user, &pass));

    if allowed {
        next.run(req).await
    } else {
        (StatusCode::UNAUTHORIZED, [(WWW_AUTHENTICATE, CHALLENGE)]).into_response()
    }
}
