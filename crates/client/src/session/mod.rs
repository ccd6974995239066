//! Session context.
//!
//! A [`SessionContext`] bundles everything that decides who the client is:
//! the credential store, the single-flight refresh coordinator, and a
//! broadcast channel announcing session lifecycle changes. It is cloned into
//! the gateway and both engines; there is no global token state.

mod auth;
mod credentials;
mod refresh;

pub use auth::{AuthError, exchange_refresh_token, login};
pub use credentials::{CredentialStore, Session};
pub use refresh::{RefreshCoordinator, RefreshError};

use std::sync::Arc;

use basket_core::{Identity, UserId};
use secrecy::SecretString;
use tokio::sync::broadcast;
use tracing::{error, info, instrument, warn};
use url::Url;

use crate::store::StoreError;

/// Capacity of the session event channel.
const EVENT_CAPACITY: usize = 32;

/// Session lifecycle notifications.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// A login response was stored.
    LoggedIn { user_id: UserId },
    /// The access token was replaced.
    Refreshed,
    /// The user logged out.
    LoggedOut,
    /// The session was torn down after an irrecoverable failure.
    Expired { reason: TeardownReason },
}

/// Why a session was torn down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TeardownReason {
    /// An authenticated request found no complete session.
    MissingCredentials,
    /// The refresh exchange failed.
    RefreshFailed,
}

/// Shared handle to the current session.
#[derive(Clone)]
pub struct SessionContext {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    credentials: CredentialStore,
    events: broadcast::Sender<SessionEvent>,
    refresh: RefreshCoordinator,
}

impl SessionContext {
    /// Create a session context.
    ///
    /// `refresh_endpoint` is the absolute URL of the token exchange.
    pub fn new(credentials: CredentialStore, http: reqwest::Client, refresh_endpoint: Url) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(SessionInner {
                credentials,
                events,
                refresh: RefreshCoordinator::new(http, refresh_endpoint),
            }),
        }
    }

    /// The credential store backing this session.
    #[must_use]
    pub fn credentials(&self) -> &CredentialStore {
        &self.inner.credentials
    }

    /// The refresh coordinator.
    #[must_use]
    pub fn refresher(&self) -> &RefreshCoordinator {
        &self.inner.refresh
    }

    /// Who the client currently acts as.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the credential store cannot be read.
    pub fn identity(&self) -> Result<Identity, StoreError> {
        Ok(Identity::from_user(
            self.credentials().get()?.map(|session| session.user_id),
        ))
    }

    /// Subscribe to lifecycle events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.events.subscribe()
    }

    pub(crate) fn emit(&self, event: SessionEvent) {
        // No subscribers is fine.
        let _ = self.inner.events.send(event);
    }

    /// Store a fresh login and announce it.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the credential store cannot be written.
    pub fn establish(&self, session: &Session) -> Result<(), StoreError> {
        self.credentials().save_session(session)?;
        info!(user_id = %session.user_id, role = %session.role, "Logged in");
        self.emit(SessionEvent::LoggedIn {
            user_id: session.user_id.clone(),
        });
        Ok(())
    }

    /// Drop the session at the user's request. Returns `false` if there was
    /// nothing to drop.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the credential store cannot be written.
    pub fn logout(&self) -> Result<bool, StoreError> {
        let had_session = self.credentials().take()?;
        if had_session {
            info!("Logged out");
            self.emit(SessionEvent::LoggedOut);
        }
        Ok(had_session)
    }

    /// Clear credentials after an irrecoverable failure.
    ///
    /// Idempotent: concurrent triggers clear the store once and emit one
    /// [`SessionEvent::Expired`]. Returns `true` for the trigger that did
    /// the clearing.
    pub fn teardown(&self, reason: TeardownReason) -> bool {
        match self.credentials().take() {
            Ok(true) => {
                warn!(?reason, "Session torn down");
                self.emit(SessionEvent::Expired { reason });
                true
            }
            Ok(false) => false,
            Err(e) => {
                error!(error = %e, ?reason, "Failed to clear credentials during teardown");
                false
            }
        }
    }

    /// Exchange the refresh token for a new access token unconditionally.
    ///
    /// # Errors
    ///
    /// Returns `RefreshError` if no session is stored or the exchange fails;
    /// the session is torn down in both cases.
    #[instrument(skip(self))]
    pub async fn refresh(&self) -> Result<SecretString, RefreshError> {
        self.inner.refresh.refresh(self, None).await
    }

    /// Obtain a replacement for an access token the server just rejected.
    ///
    /// # Errors
    ///
    /// Returns `RefreshError` if no session is stored or the exchange fails;
    /// the session is torn down in both cases.
    pub async fn refresh_rejected(
        &self,
        rejected: &SecretString,
    ) -> Result<SecretString, RefreshError> {
        self.inner.refresh.refresh(self, Some(rejected)).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use basket_core::{Role, Surface};
    use chrono::Utc;

    use super::*;
    use crate::store::MemoryStore;

    fn context() -> SessionContext {
        let credentials = CredentialStore::new(Arc::new(MemoryStore::new()), Surface::Storefront);
        SessionContext::new(
            credentials,
            reqwest::Client::new(),
            Url::parse("http://127.0.0.1:9/auth/refresh").unwrap(),
        )
    }

    fn session() -> Session {
        Session {
            access: SecretString::from("a"),
            refresh: SecretString::from("r"),
            user_id: UserId::new("7"),
            role: Role::Customer,
            authenticated_at: Utc::now(),
        }
    }

    #[test]
    fn test_identity_follows_session() {
        let ctx = context();
        assert_eq!(ctx.identity().unwrap(), Identity::Guest);

        ctx.establish(&session()).unwrap();
        assert_eq!(ctx.identity().unwrap(), Identity::User(UserId::new("7")));

        assert!(ctx.logout().unwrap());
        assert_eq!(ctx.identity().unwrap(), Identity::Guest);
        assert!(!ctx.logout().unwrap());
    }

    #[test]
    fn test_teardown_is_idempotent() {
        let ctx = context();
        let mut events = ctx.subscribe();
        ctx.establish(&session()).unwrap();

        assert!(ctx.teardown(TeardownReason::RefreshFailed));
        assert!(!ctx.teardown(TeardownReason::RefreshFailed));
        assert!(!ctx.teardown(TeardownReason::MissingCredentials));

        assert_eq!(
            events.try_recv().unwrap(),
            SessionEvent::LoggedIn {
                user_id: UserId::new("7")
            }
        );
        assert_eq!(
            events.try_recv().unwrap(),
            SessionEvent::Expired {
                reason: TeardownReason::RefreshFailed
            }
        );
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_refresh_without_session_fails_without_network() {
        let ctx = context();
        let err = ctx.refresh().await.unwrap_err();
        assert!(matches!(err, RefreshError::MissingRefreshToken));
        assert_eq!(ctx.refresher().exchanges(), 0);
    }
}
