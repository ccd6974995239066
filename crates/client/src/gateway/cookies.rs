//! Cookie jar that survives restarts.
//!
//! The server ties the guest cart (and the anti-forgery cookie) to cookies.
//! [`PersistentJar`] keeps the last `Set-Cookie` header for each cookie name
//! in the [`KeyValueStore`] and replays them into a fresh [`Jar`] on load, so
//! a later process talks to the same anonymous session.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};

use basket_core::Surface;
use reqwest::cookie::{CookieStore, Jar};
use reqwest::header::HeaderValue;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use url::Url;

use crate::store::{KeyValueStore, KeyValueStoreExt, StoreError};

/// One `Set-Cookie` header as received.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct StoredCookie {
    url: String,
    header: String,
}

/// [`CookieStore`] backed by a [`Jar`] and mirrored into a [`KeyValueStore`].
pub struct PersistentJar {
    jar: Jar,
    store: Arc<dyn KeyValueStore>,
    key: String,
    saved: Mutex<BTreeMap<String, StoredCookie>>,
}

impl PersistentJar {
    /// Load the cookies saved for `surface` into a new jar.
    ///
    /// Entries that no longer parse are skipped.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the saved cookies cannot be read.
    pub fn load(store: Arc<dyn KeyValueStore>, surface: Surface) -> Result<Self, StoreError> {
        let key = format!("{surface}:cookies");
        let saved: BTreeMap<String, StoredCookie> = store.get_json(&key)?.unwrap_or_default();

        let jar = Jar::default();
        for (name, cookie) in &saved {
            match Url::parse(&cookie.url) {
                Ok(url) => jar.add_cookie_str(&cookie.header, &url),
                Err(e) => warn!(cookie = %name, error = %e, "Skipping saved cookie"),
            }
        }
        debug!(count = saved.len(), "Loaded saved cookies");

        Ok(Self {
            jar,
            store,
            key,
            saved: Mutex::new(saved),
        })
    }

    fn remember(&self, headers: &[&HeaderValue], url: &Url) {
        let mut saved = self.saved.lock().unwrap_or_else(PoisonError::into_inner);
        let mut changed = false;
        for header in headers {
            let Ok(raw) = header.to_str() else {
                continue;
            };
            let Some(name) = cookie_name(raw) else {
                continue;
            };
            let cookie = StoredCookie {
                url: url.to_string(),
                header: raw.to_string(),
            };
            if saved.get(name) != Some(&cookie) {
                saved.insert(name.to_string(), cookie);
                changed = true;
            }
        }
        if changed && let Err(e) = self.store.set_json(&self.key, &*saved) {
            warn!(error = %e, "Failed to save cookies");
        }
    }
}

impl CookieStore for PersistentJar {
    fn set_cookies(&self, cookie_headers: &mut dyn Iterator<Item = &HeaderValue>, url: &Url) {
        let headers: Vec<&HeaderValue> = cookie_headers.collect();
        self.jar.set_cookies(&mut headers.iter().copied(), url);
        self.remember(&headers, url);
    }

    fn cookies(&self, url: &Url) -> Option<HeaderValue> {
        self.jar.cookies(url)
    }
}

/// Name part of a `Set-Cookie` header (`name=value; Path=/`).
fn cookie_name(header: &str) -> Option<&str> {
    let (name, _) = header.split_once('=')?;
    let name = name.trim();
    (!name.is_empty()).then_some(name)
}
