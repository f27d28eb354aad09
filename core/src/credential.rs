/// Session credential lookup
use std::sync::RwLock;
use tracing::warn;

/// Name of the cookie carrying the session token
pub const SESSION_COOKIE: &str = "session_token";

/// Supplies the session credential for the current identity
pub trait CredentialSource: Send + Sync {
    /// Current credential, or `None` when signed out
    fn credential(&self) -> Option<String>;
}

/// Extract a cookie value from a raw `Cookie`-style string.
///
/// Everything after the first `=` is the value, so tokens carrying `=`
/// padding survive intact. Empty values count as absent.
pub fn parse_cookie(raw: &str, name: &str) -> Option<String> {
    raw.split(';')
        .map(str::trim)
        .filter_map(|entry| entry.split_once('='))
        .find(|(key, _)| key.trim() == name)
        .map(|(_, value)| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Cookie-backed credential source
///
/// The raw cookie string can be replaced at any time (e.g. after a login);
/// the next connection attempt picks the new value up.
#[derive(Debug, Default)]
pub struct CookieJar {
    raw: RwLock<String>,
}

impl CookieJar {
    pub fn new(raw: impl Into<String>) -> Self {
        Self {
            raw: RwLock::new(raw.into()),
        }
    }

    /// Replace the raw cookie string
    pub fn set(&self, raw: impl Into<String>) {
        match self.raw.write() {
            Ok(mut guard) => *guard = raw.into(),
            Err(poisoned) => *poisoned.into_inner() = raw.into(),
        }
    }
}

impl CredentialSource for CookieJar {
    fn credential(&self) -> Option<String> {
        let raw = match self.raw.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => {
                warn!("Cookie jar lock poisoned, reading last value");
                poisoned.into_inner().clone()
            }
        };
        parse_cookie(&raw, SESSION_COOKIE)
    }
}

/// Fixed credential, mostly for tooling and tests
#[derive(Debug, Clone, Default)]
pub struct StaticCredential(pub Option<String>);

impl StaticCredential {
    pub fn token(token: impl Into<String>) -> Self {
        Self(Some(token.into()))
    }

    pub fn missing() -> Self {
        Self(None)
    }
}

impl CredentialSource for StaticCredential {
    fn credential(&self) -> Option<String> {
        self.0.clone()
    }
}
