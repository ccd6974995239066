//! Credential store.
//!
//! Persists the access token, refresh token, user id, and role of the
//! current session under surface-prefixed keys. Never touches the network.

use std::sync::{Arc, Mutex, PoisonError};

use basket_core::{Identity, Role, Surface, UserId};
use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use tracing::debug;

use crate::store::{KeyValueStore, StoreError};

/// An authenticated session.
///
/// Tokens are secrets and are redacted from `Debug` output.
#[derive(Debug, Clone)]
pub struct Session {
    /// Short-lived bearer token.
    pub access: SecretString,
    /// Long-lived token exchanged for new access tokens.
    pub refresh: SecretString,
    /// Authenticated user.
    pub user_id: UserId,
    /// Role granted at login.
    pub role: Role,
    /// When the login happened.
    pub authenticated_at: DateTime<Utc>,
}

impl Session {
    /// The identity this session acts as.
    #[must_use]
    pub fn identity(&self) -> Identity {
        Identity::User(self.user_id.clone())
    }
}

#[derive(Clone, Copy)]
enum Field {
    Access,
    Refresh,
    User,
    Role,
    AuthenticatedAt,
}

impl Field {
    const ALL: [Self; 5] = [
        Self::Access,
        Self::Refresh,
        Self::User,
        Self::Role,
        Self::AuthenticatedAt,
    ];

    const fn name(self) -> &'static str {
        match self {
            Self::Access => "access",
            Self::Refresh => "refresh",
            Self::User => "user",
            Self::Role => "role",
            Self::AuthenticatedAt => "authenticated_at",
        }
    }
}

/// Surface-scoped view of the persisted session.
///
/// A torn state (one token without the other, or tokens without a user) is
/// reported as no session at all.
#[derive(Clone)]
pub struct CredentialStore {
    store: Arc<dyn KeyValueStore>,
    surface: Surface,
    // Multi-key writes and reads are not interleaved.
    guard: Arc<Mutex<()>>,
}

impl CredentialStore {
    /// Create a credential store for `surface` on top of `store`.
    pub fn new(store: Arc<dyn KeyValueStore>, surface: Surface) -> Self {
        Self {
            store,
            surface,
            guard: Arc::new(Mutex::new(())),
        }
    }

    /// Surface this store is scoped to.
    #[must_use]
    pub const fn surface(&self) -> Surface {
        self.surface
    }

    fn key(&self, field: Field) -> String {
        format!("{}:session:{}", self.surface, field.name())
    }

    fn read(&self, field: Field) -> Result<Option<String>, StoreError> {
        self.store.get(&self.key(field))
    }

    /// Read the current session.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the backing store cannot be read.
    pub fn get(&self) -> Result<Option<Session>, StoreError> {
        let _guard = self.guard.lock().unwrap_or_else(PoisonError::into_inner);

        let (Some(access), Some(refresh), Some(user)) = (
            self.read(Field::Access)?,
            self.read(Field::Refresh)?,
            self.read(Field::User)?,
        ) else {
            return Ok(None);
        };

        let role = self
            .read(Field::Role)?
            .and_then(|raw| raw.parse().ok())
            .unwrap_or_default();
        let authenticated_at = self
            .read(Field::AuthenticatedAt)?
            .and_then(|raw| DateTime::parse_from_rfc3339(&raw).ok())
            .map(|at| at.with_timezone(&Utc))
            .unwrap_or_default();

        Ok(Some(Session {
            access: SecretString::from(access),
            refresh: SecretString::from(refresh),
            user_id: UserId::new(user),
            role,
            authenticated_at,
        }))
    }

    /// Store tokens. Passing `None` for `refresh` keeps the stored refresh
    /// token.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the backing store cannot be written.
    pub fn save(
        &self,
        access: &SecretString,
        refresh: Option<&SecretString>,
    ) -> Result<(), StoreError> {
        let _guard = self.guard.lock().unwrap_or_else(PoisonError::into_inner);
        self.store
            .set(&self.key(Field::Access), access.expose_secret())?;
        if let Some(refresh) = refresh {
            self.store
                .set(&self.key(Field::Refresh), refresh.expose_secret())?;
        }
        Ok(())
    }

    /// Store a complete login response.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the backing store cannot be written.
    pub fn save_session(&self, session: &Session) -> Result<(), StoreError> {
        let _guard = self.guard.lock().unwrap_or_else(PoisonError::into_inner);
        self.store
            .set(&self.key(Field::User), session.user_id.as_str())?;
        self.store
            .set(&self.key(Field::Role), session.role.as_str())?;
        self.store.set(
            &self.key(Field::AuthenticatedAt),
            &session.authenticated_at.to_rfc3339(),
        )?;
        self.store
            .set(&self.key(Field::Refresh), session.refresh.expose_secret())?;
        self.store
            .set(&self.key(Field::Access), session.access.expose_secret())?;
        debug!(surface = %self.surface, user_id = %session.user_id, "Session stored");
        Ok(())
    }

    /// Remove every credential.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the backing store cannot be written.
    pub fn clear(&self) -> Result<(), StoreError> {
        self.take().map(|_| ())
    }

    /// Remove every credential, reporting whether anything was stored.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the backing store cannot be written.
    pub fn take(&self) -> Result<bool, StoreError> {
        let _guard = self.guard.lock().unwrap_or_else(PoisonError::into_inner);
        let mut had_any = false;
        for field in Field::ALL {
            let key = self.key(field);
            if self.store.get(&key)?.is_some() {
                had_any = true;
                self.store.remove(&key)?;
            }
        }
        Ok(had_any)
    }

    /// Returns `true` when both tokens are stored.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the backing store cannot be read.
    pub fn is_authenticated(&self) -> Result<bool, StoreError> {
        let _guard = self.guard.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(self.read(Field::Access)?.is_some() && self.read(Field::Refresh)?.is_some())
    }
}
