//! Authenticated request gateway.
//!
//! Every call to the storefront API goes through a [`Gateway`]. For an
//! authenticated request it:
//!
//! 1. Reads the session; with no complete session it tears down and fails
//!    with [`GatewayError::NotAuthenticated`] without touching the network.
//! 2. Sends the request with `Authorization: Bearer <access>`, the
//!    anti-forgery header (mutations only), and an `X-Request-Id`.
//! 3. On `401 Unauthorized`, asks the session for a fresh token and resends
//!    the same request exactly once, with the same request id. The retry's
//!    response is returned whatever its status.
//! 4. If the refresh fails, the session has been torn down and the caller
//!    receives [`GatewayError::SessionExpired`].
//!
//! Guest requests skip steps 1, 3, and 4 and carry no bearer header.

mod cookies;
mod csrf;

pub use cookies::PersistentJar;
pub use csrf::{CookieCsrf, CsrfSource, StaticCsrf};

use std::sync::Arc;

use basket_core::Identity;
use reqwest::header::HeaderName;
use reqwest::{Method, Response, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, instrument, warn};
use url::Url;
use uuid::Uuid;

use crate::error::ApiError;
use crate::session::{RefreshError, SessionContext, TeardownReason};
use crate::store::StoreError;

/// Header correlating the initial attempt and the retry of one request.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Errors that can occur in the gateway itself.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// No complete session is stored.
    #[error("Not authenticated")]
    NotAuthenticated,

    /// The server rejected the access token and it could not be refreshed.
    #[error("Session expired: {0}")]
    SessionExpired(#[source] RefreshError),

    /// The request could not be sent.
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The credential store could not be read.
    #[error("Credential store error: {0}")]
    Store(#[from] StoreError),

    /// The API base URL cannot carry path segments.
    #[error("Invalid API base URL: {0}")]
    InvalidBaseUrl(Url),
}

// =============================================================================
// Requests
// =============================================================================

/// One logical API call: method, resource path, optional JSON body.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    method: Method,
    segments: Vec<String>,
    body: Option<Value>,
}

impl ApiRequest {
    /// Build a request for the resource at `segments` below the API base.
    pub fn new<I, S>(method: Method, segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            method,
            segments: segments.into_iter().map(Into::into).collect(),
            body: None,
        }
    }

    /// `GET` request.
    pub fn get<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(Method::GET, segments)
    }

    /// `POST` request.
    pub fn post<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(Method::POST, segments)
    }

    /// `PATCH` request.
    pub fn patch<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(Method::PATCH, segments)
    }

    /// `DELETE` request.
    pub fn delete<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(Method::DELETE, segments)
    }

    /// Attach a JSON body.
    #[must_use]
    pub fn json(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// HTTP method.
    #[must_use]
    pub const fn method(&self) -> &Method {
        &self.method
    }

    /// Resource path relative to the API base, e.g. `cart/guest`.
    #[must_use]
    pub fn path(&self) -> String {
        self.segments.join("/")
    }

    /// Returns `true` for state-mutating methods.
    #[must_use]
    pub fn is_mutation(&self) -> bool {
        !matches!(
            self.method,
            Method::GET | Method::HEAD | Method::OPTIONS | Method::TRACE
        )
    }
}

// =============================================================================
// Gateway
// =============================================================================

/// Sends [`ApiRequest`]s on behalf of the current session.
#[derive(Clone)]
pub struct Gateway {
    inner: Arc<GatewayInner>,
}

struct GatewayInner {
    http: reqwest::Client,
    base: Url,
    session: SessionContext,
    csrf: Arc<dyn CsrfSource>,
    csrf_header: HeaderName,
}

impl Gateway {
    /// Create a gateway.
    pub fn new(
        http: reqwest::Client,
        base: Url,
        session: SessionContext,
        csrf: Arc<dyn CsrfSource>,
        csrf_header: HeaderName,
    ) -> Self {
        Self {
            inner: Arc::new(GatewayInner {
                http,
                base,
                session,
                csrf,
                csrf_header,
            }),
        }
    }

    /// The session this gateway authenticates with.
    #[must_use]
    pub fn session(&self) -> &SessionContext {
        &self.inner.session
    }

    /// API base URL.
    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.inner.base
    }

    /// Send an authenticated request, refreshing and retrying once on 401.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::NotAuthenticated` when no session is stored,
    /// `GatewayError::SessionExpired` when the refresh after a 401 fails, and
    /// `GatewayError::Network` when a request cannot be sent.
    #[instrument(skip(self, request), fields(method = %request.method, path = %request.path()))]
    pub async fn send(&self, request: &ApiRequest) -> Result<Response, GatewayError> {
        let session = self.session();
        let Some(current) = session.credentials().get()? else {
            session.teardown(TeardownReason::MissingCredentials);
            return Err(GatewayError::NotAuthenticated);
        };

        let request_id = Uuid::new_v4();
        let response = self
            .dispatch(request, Some(&current.access), request_id)
            .await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        debug!(%request_id, "Access token rejected, refreshing");
        let access = session
            .refresh_rejected(&current.access)
            .await
            .map_err(|e| {
                warn!(%request_id, error = %e, "Refresh after 401 failed");
                GatewayError::SessionExpired(e)
            })?;

        self.dispatch(request, Some(&access), request_id).await
    }

    /// Send a request without credentials, as the guest.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::Network` if the request cannot be sent.
    #[instrument(skip(self, request), fields(method = %request.method, path = %request.path()))]
    pub async fn send_anonymous(&self, request: &ApiRequest) -> Result<Response, GatewayError> {
        self.dispatch(request, None, Uuid::new_v4()).await
    }

    /// Send as `identity`: anonymously for the guest, authenticated otherwise.
    ///
    /// # Errors
    ///
    /// See [`Gateway::send`] and [`Gateway::send_anonymous`].
    pub async fn send_as(
        &self,
        identity: &Identity,
        request: &ApiRequest,
    ) -> Result<Response, GatewayError> {
        match identity {
            Identity::Guest => self.send_anonymous(request).await,
            Identity::User(_) => self.send(request).await,
        }
    }

    async fn dispatch(
        &self,
        request: &ApiRequest,
        access: Option<&SecretString>,
        request_id: Uuid,
    ) -> Result<Response, GatewayError> {
        let url = resource_url(&self.inner.base, &request.segments)?;
        let mut builder = self
            .inner
            .http
            .request(request.method.clone(), url)
            .header(REQUEST_ID_HEADER, request_id.to_string());

        if let Some(access) = access {
            builder = builder.bearer_auth(access.expose_secret());
        }
        if request.is_mutation()
            && let Some(token) = self.inner.csrf.token()
        {
            builder = builder.header(self.inner.csrf_header.clone(), token);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        debug!(%request_id, status = %response.status(), "Response received");
        Ok(response)
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Resolve `segments` below `base`. Each segment is percent-encoded.
///
/// # Errors
///
/// Returns `GatewayError::InvalidBaseUrl` if `base` cannot carry a path.
pub fn resource_url<S: AsRef<str>>(base: &Url, segments: &[S]) -> Result<Url, GatewayError> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|()| GatewayError::InvalidBaseUrl(base.clone()))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

/// Turn a non-2xx response into [`ApiError::Rejected`].
///
/// # Errors
///
/// Returns `ApiError::Rejected` carrying the status and body text.
pub async fn expect_success(response: Response) -> Result<Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ApiError::Rejected { status, body })
}

/// Require a 2xx response and decode its JSON body.
///
/// # Errors
///
/// Returns `ApiError::Rejected` for non-2xx and `ApiError::Decode` for bodies
/// that are not valid JSON for `T`.
pub async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T, ApiError> {
    expect_success(response)
        .await?
        .json()
        .await
        .map_err(ApiError::Decode)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_url_appends_segments() {
        let base = Url::parse("https://shop.test/api/").unwrap();
        let url = resource_url(&base, &["cart", "guest", "item", "v 1"]).unwrap();
        assert_eq!(url.as_str(), "https://shop.test/api/cart/guest/item/v%201");
    }

    #[test]
    fn test_resource_url_without_trailing_slash() {
        let base = Url::parse("https://shop.test/api").unwrap();
        let url = resource_url(&base, &["auth", "refresh"]).unwrap();
        assert_eq!(url.as_str(), "https://shop.test/api/auth/refresh");
    }

    #[test]
    fn test_resource_url_escapes_slashes_in_ids() {
        let base = Url::parse("http://localhost:8000/").unwrap();
        let url = resource_url(&base, &["wishlist", "a/b"]).unwrap();
        assert_eq!(url.path(), "/wishlist/a%2Fb");
    }

    #[test]
    fn test_mutation_methods() {
        assert!(!ApiRequest::get(["cart", "guest"]).is_mutation());
        assert!(ApiRequest::post(["auth", "login"]).is_mutation());
        assert!(ApiRequest::patch(["cart", "guest", "item", "v"]).is_mutation());
        assert!(ApiRequest::delete(["cart", "guest"]).is_mutation());
    }

    #[test]
    fn test_request_path() {
        let request = ApiRequest::delete(["cart", "7", "item", "v-1"]);
        assert_eq!(request.path(), "cart/7/item/v-1");
        assert_eq!(request.method(), Method::DELETE);
    }
}
