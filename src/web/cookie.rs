//! The refresh-token cookie.

use crate::config::RefreshConfig;
use cookie::{Cookie, SameSite};

/// Builds the `Set-Cookie` values that carry or clear the refresh token.
///
/// The cookie is `HttpOnly`, `Secure` and `SameSite=Strict`, and scoped to the
/// auth routes so browsers never attach it to other requests.
#[derive(Debug, Clone)]
pub struct RefreshCookie {
    name: String,
    path: String,
    max_age_seconds: i64,
}

impl RefreshCookie {
    pub fn new(name: impl Into<String>, path: impl Into<String>, max_age_seconds: i64) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            max_age_seconds,
        }
    }

    pub fn from_config(config: &RefreshConfig) -> Self {
        let max_age = config.ttl().as_secs().min(i64::MAX as u64) as i64;
        Self::new(config.cookie_name.clone(), config.cookie_path.clone(), max_age)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn issue(&self, token: &str) -> Cookie<'static> {
        self.build(token.to_string(), self.max_age_seconds)
    }

    /// An empty cookie with `Max-Age=0`, telling the browser to drop it.
    pub fn clear(&self) -> Cookie<'static> {
        self.build(String::new(), 0)
    }

    fn build(&self, value: String, max_age_seconds: i64) -> Cookie<'static> {
        Cookie::build((self.name.clone(), value))
            .http_only(true)
            .secure(true)
            .same_site(SameSite::Strict)
            .path(self.path.clone())
            .max_age(cookie::time::Duration::seconds(max_age_seconds))
            .build()
    }
}
