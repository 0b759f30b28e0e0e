//! HTTP basic authentication with live-swappable credentials

use std::fmt;

use axum::http::{HeaderMap, header};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use parking_lot::RwLock;
use serde::Deserialize;
use subtle::ConstantTimeEq;

use crate::core::config::AuthConfig;
use crate::core::constants::BASIC_AUTH_REALM;

#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl From<AuthConfig> for Credentials {
    fn from(config: AuthConfig) -> Self {
        Self {
            username: config.username,
            password: config.password,
        }
    }
}

/// Request authorization scheme applied to every HTTP route
pub trait Authorizer: Send + Sync {
    /// When false every request is let through
    fn is_enabled(&self) -> bool;

    fn authorize(&self, headers: &HeaderMap) -> bool;

    /// Value of the `WWW-Authenticate` header sent with a 401
    fn challenge(&self) -> String;
}

/// Basic auth against a single credential pair that can be replaced at runtime
#[derive(Debug, Default)]
pub struct BasicAuth {
    credentials: RwLock<Option<Credentials>>,
}

impl BasicAuth {
    pub fn new(credentials: Option<Credentials>) -> Self {
        Self {
            credentials: RwLock::new(credentials),
        }
    }

    /// Replace the credentials; `None` turns authentication off
    pub fn set(&self, credentials: Option<Credentials>) {
        let enabled = credentials.is_some();
        *self.credentials.write() = credentials;
        tracing::info!(enabled, "Basic auth credentials updated");
    }
}

impl Authorizer for BasicAuth {
    fn is_enabled(&self) -> bool {
        self.credentials.read().is_some()
    }

    fn authorize(&self, headers: &HeaderMap) -> bool {
        let guard = self.credentials.read();
        let Some(expected) = guard.as_ref() else {
            return true;
        };
        let Some((username, password)) = parse_basic_header(headers) else {
            return false;
        };
        let user_ok = username.as_bytes().ct_eq(expected.username.as_bytes());
        let pass_ok = password.as_bytes().ct_eq(expected.password.as_bytes());
        bool::from(user_ok & pass_ok)
    }

    fn challenge(&self) -> String {
        format!("Basic realm=\"{}\"", BASIC_AUTH_REALM)
    }
}

fn parse_basic_header(headers: &HeaderMap) -> Option<(String, String)> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, encoded) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }
    let decoded = STANDARD.decode(encoded.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (username, password) = decoded.split_once(':')?;
    Some((username.to_string(), password.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn creds(username: &str, password: &str) -> Credentials {
        Credentials {
            username: username.to_string(),
            password: password.to_string(),
        }
    }

    fn basic_headers(user_pass: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        let value = format!("Basic {}", STANDARD.encode(user_pass));
        headers.insert(header::AUTHORIZATION, HeaderValue::from_str(&value).unwrap());
        headers
    }

    #[test]
    fn test_disabled_allows_everything() {
        let auth = BasicAuth::new(None);
        assert!(!auth.is_enabled());
        assert!(auth.authorize(&HeaderMap::new()));
    }

    #[test]
    fn test_valid_and_invalid_credentials() {
        let auth = BasicAuth::new(Some(creds("admin", "secret")));
        assert!(auth.authorize(&basic_headers("admin:secret")));
        assert!(!auth.authorize(&basic_headers("admin:wrong")));
        assert!(!auth.authorize(&basic_headers("root:secret")));
        assert!(!auth.authorize(&HeaderMap::new()));
    }

    #[test]
    fn test_password_may_contain_colon() {
        let auth = BasicAuth::new(Some(creds("admin", "a:b")));
        assert!(auth.authorize(&basic_headers("admin:a:b")));
    }

    #[test]
    fn test_rejects_other_schemes() {
        let auth = BasicAuth::new(Some(creds("admin", "secret")));
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_static("Bearer abc"),
        );
        assert!(!auth.authorize(&headers));
    }

    #[test]
    fn test_set_swaps_credentials() {
        let auth = BasicAuth::new(Some(creds("admin", "secret")));
        auth.set(Some(creds("ops", "rotated")));
        assert!(!auth.authorize(&basic_headers("admin:secret")));
        assert!(auth.authorize(&basic_headers("ops:rotated")));

        auth.set(None);
        assert!(auth.authorize(&HeaderMap::new()));
    }

    #[test]
    fn test_debug_redacts_password() {
        let rendered = format!("{:?}", creds("admin", "secret"));
        assert!(!rendered.contains("secret"));
    }
}
