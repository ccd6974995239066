//! Single-flight access token refresh.

use std::sync::atomic::{AtomicU64, Ordering};

use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use url::Url;

use super::auth::exchange_refresh_token;
use super::{SessionContext, SessionEvent, TeardownReason};
use crate::store::StoreError;

/// Errors that can occur while refreshing the access token.
#[derive(Debug, Error)]
pub enum RefreshError {
    /// No complete session is stored.
    #[error("No refresh token available")]
    MissingRefreshToken,

    /// The refresh endpoint answered with a non-2xx status.
    #[error("Token refresh rejected with HTTP {status}: {body}")]
    Rejected { status: StatusCode, body: String },

    /// The exchange could not be sent or its response was unreadable.
    #[error("Token refresh request failed: {0}")]
    Network(#[from] reqwest::Error),

    /// The credential store could not be read or written.
    #[error("Credential store error: {0}")]
    Store(#[from] StoreError),
}

/// Serializes refresh-token exchanges.
///
/// Only one exchange runs at a time. A caller that queued behind a running
/// exchange finds the rejected token already replaced and receives the new
/// one without a second exchange.
pub struct RefreshCoordinator {
    http: reqwest::Client,
    endpoint: Url,
    in_flight: Mutex<()>,
    exchanges: AtomicU64,
}

impl RefreshCoordinator {
    pub(crate) fn new(http: reqwest::Client, endpoint: Url) -> Self {
        Self {
            http,
            endpoint,
            in_flight: Mutex::new(()),
            exchanges: AtomicU64::new(0),
        }
    }

    /// Number of exchanges sent since startup.
    #[must_use]
    pub fn exchanges(&self) -> u64 {
        self.exchanges.load(Ordering::Relaxed)
    }

    /// Obtain a fresh access token.
    ///
    /// `rejected` is the token the server just refused. When it no longer
    /// matches the stored token someone else already refreshed, and the
    /// stored token is returned as-is. `None` always exchanges.
    ///
    /// On failure the session is torn down before the lock is released, so
    /// queued callers observe the empty store and fail too.
    pub(crate) async fn refresh(
        &self,
        session: &SessionContext,
        rejected: Option<&SecretString>,
    ) -> Result<SecretString, RefreshError> {
        let _in_flight = self.in_flight.lock().await;

        let Some(current) = session.credentials().get()? else {
            session.teardown(TeardownReason::MissingCredentials);
            return Err(RefreshError::MissingRefreshToken);
        };

        if let Some(rejected) = rejected
            && rejected.expose_secret() != current.access.expose_secret()
        {
            debug!("Access token already refreshed by another caller");
            return Ok(current.access);
        }

        self.exchanges.fetch_add(1, Ordering::Relaxed);
        match exchange_refresh_token(&self.http, &self.endpoint, &current.refresh).await {
            Ok(access) => {
                session.credentials().save(&access, None)?;
                info!(user_id = %current.user_id, "Access token refreshed");
                session.emit(SessionEvent::Refreshed);
                Ok(access)
            }
            Err(e) => {
                warn!(error = %e, user_id = %current.user_id, "Token refresh failed");
                session.teardown(TeardownReason::RefreshFailed);
                Err(e)
            }
        }
    }
}
