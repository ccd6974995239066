//! Anti-forgery token sources.

use std::sync::Arc;

use reqwest::cookie::CookieStore;
use url::Url;

/// Supplies the anti-forgery token attached to state-mutating requests.
pub trait CsrfSource: Send + Sync {
    /// The current token, if one is known.
    fn token(&self) -> Option<String>;
}

/// Reads the token from a cookie the server set in the shared cookie jar.
pub struct CookieCsrf {
    jar: Arc<dyn CookieStore>,
    url: Url,
    cookie_name: String,
}

impl CookieCsrf {
    /// Read `cookie_name` from the cookies `jar` would send to `url`.
    pub fn new(jar: Arc<dyn CookieStore>, url: Url, cookie_name: impl Into<String>) -> Self {
        Self {
            jar,
            url,
            cookie_name: cookie_name.into(),
        }
    }
}

impl CsrfSource for CookieCsrf {
    fn token(&self) -> Option<String> {
        let header = self.jar.cookies(&self.url)?;
        find_cookie(header.to_str().ok()?, &self.cookie_name).map(str::to_string)
    }
}

/// A fixed token, for tests and deployments without a browser-style cookie.
#[derive(Debug, Clone, Default)]
pub struct StaticCsrf(Option<String>);

impl StaticCsrf {
    /// Always send `token`.
    pub fn new(token: impl Into<String>) -> Self {
        Self(Some(token.into()))
    }

    /// Never send a token.
    #[must_use]
    pub const fn none() -> Self {
        Self(None)
    }
}

impl CsrfSource for StaticCsrf {
    fn token(&self) -> Option<String> {
        self.0.clone()
    }
}

/// Find a cookie value in a `Cookie` header (`a=1; b=2`).
fn find_cookie<'a>(header: &'a str, name: &str) -> Option<&'a str> {
    header
        .split(';')
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.trim_matches('"'))
        .filter(|value| !value.is_empty())
}
