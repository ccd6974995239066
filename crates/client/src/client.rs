//! The [`Basket`] client: one session, one gateway, both engines.

use std::sync::Arc;

use basket_core::{Identity, Role, UserId};
use secrecy::SecretString;
use tracing::{instrument, warn};

use crate::cart::{CartEngine, CartError, CartMerge};
use crate::config::{ClientConfig, ConfigError};
use crate::error::ClientError;
use crate::gateway::{CookieCsrf, CsrfSource, Gateway, PersistentJar, resource_url};
use crate::render::CartRenderer;
use crate::session::{self, CredentialStore, SessionContext};
use crate::store::{FileStore, KeyValueStore, MemoryStore};
use crate::wishlist::{ReplicationQueue, WishlistEngine, WishlistMerge};

/// Result of [`Basket::login`].
#[derive(Debug)]
pub struct LoginOutcome {
    pub user_id: UserId,
    pub role: Role,
    /// Guest cart merge. A failure here does not undo the login.
    pub cart: Result<CartMerge, CartError>,
    pub wishlist: WishlistMerge,
}

/// Storefront client.
///
/// Cheap to clone. Must be created inside a tokio runtime: the wishlist
/// replication worker is spawned on construction.
#[derive(Clone)]
pub struct Basket {
    inner: Arc<BasketInner>,
}

struct BasketInner {
    config: ClientConfig,
    session: SessionContext,
    gateway: Gateway,
    cart: CartEngine,
    wishlist: WishlistEngine,
}

impl Basket {
    /// Create a client whose anti-forgery token comes from the cookie jar.
    ///
    /// Cookies are kept in `store`, so a client built later over the same
    /// store continues the same anonymous session.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Store` if saved cookies cannot be read and
    /// `ClientError::Http` if the HTTP client cannot be built.
    pub fn new(
        config: ClientConfig,
        store: Arc<dyn KeyValueStore>,
        renderer: Arc<dyn CartRenderer>,
    ) -> Result<Self, ClientError> {
        let jar = Arc::new(PersistentJar::load(store.clone(), config.surface)?);
        let csrf = Arc::new(CookieCsrf::new(
            jar.clone(),
            config.api_url.clone(),
            config.csrf.cookie_name.clone(),
        ));
        Self::build(config, store, renderer, jar, csrf)
    }

    /// Create a client with an explicit anti-forgery token source.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Store` if saved cookies cannot be read and
    /// `ClientError::Http` if the HTTP client cannot be built.
    pub fn with_csrf_source(
        config: ClientConfig,
        store: Arc<dyn KeyValueStore>,
        renderer: Arc<dyn CartRenderer>,
        csrf: Arc<dyn CsrfSource>,
    ) -> Result<Self, ClientError> {
        let jar = Arc::new(PersistentJar::load(store.clone(), config.surface)?);
        Self::build(config, store, renderer, jar, csrf)
    }

    /// Create a client backed by the configured state file, or by memory when
    /// none is configured.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Store` if the state file cannot be opened.
    pub fn from_config(
        config: ClientConfig,
        renderer: Arc<dyn CartRenderer>,
    ) -> Result<Self, ClientError> {
        let store: Arc<dyn KeyValueStore> = match &config.state_file {
            Some(path) => Arc::new(FileStore::open(path)?),
            None => Arc::new(MemoryStore::new()),
        };
        Self::new(config, store, renderer)
    }

    fn build(
        config: ClientConfig,
        store: Arc<dyn KeyValueStore>,
        renderer: Arc<dyn CartRenderer>,
        jar: Arc<PersistentJar>,
        csrf: Arc<dyn CsrfSource>,
    ) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .cookie_provider(jar)
            .build()?;

        let refresh_endpoint = resource_url(&config.api_url, &["auth", "refresh"])
            .map_err(|_| {
                ConfigError::InvalidEnvVar(
                    "BASKET_API_URL".to_string(),
                    "cannot be a base URL".to_string(),
                )
            })?;

        let credentials = CredentialStore::new(store.clone(), config.surface);
        let session = SessionContext::new(credentials, http.clone(), refresh_endpoint);
        let gateway = Gateway::new(
            http,
            config.api_url.clone(),
            session.clone(),
            csrf,
            config.csrf.header_name.clone(),
        );
        let cart = CartEngine::new(gateway.clone(), renderer, config.debounce);
        let queue = ReplicationQueue::spawn(gateway.clone(), config.replication);
        let wishlist = WishlistEngine::new(gateway.clone(), store, config.surface, queue);

        Ok(Self {
            inner: Arc::new(BasketInner {
                config,
                session,
                gateway,
                cart,
                wishlist,
            }),
        })
    }

    /// Configuration the client was built with.
    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// The session context.
    #[must_use]
    pub fn session(&self) -> &SessionContext {
        &self.inner.session
    }

    /// The request gateway.
    #[must_use]
    pub fn gateway(&self) -> &Gateway {
        &self.inner.gateway
    }

    /// The cart engine.
    #[must_use]
    pub fn cart(&self) -> &CartEngine {
        &self.inner.cart
    }

    /// The wishlist engine.
    #[must_use]
    pub fn wishlist(&self) -> &WishlistEngine {
        &self.inner.wishlist
    }

    /// Who the client currently acts as.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Store` if the credential store cannot be read.
    pub fn identity(&self) -> Result<Identity, ClientError> {
        Ok(self.session().identity()?)
    }

    /// Log in, then fold the guest cart and wishlist into the user's.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::AlreadyAuthenticated` when a user is logged in,
    /// `ClientError::Auth` when the login is refused, and
    /// `ClientError::Wishlist` if the wishlist cache cannot be updated.
    #[instrument(skip(self, password), fields(email = %email))]
    pub async fn login(
        &self,
        email: &str,
        password: &SecretString,
    ) -> Result<LoginOutcome, ClientError> {
        if !self.identity()?.is_guest() {
            return Err(ClientError::AlreadyAuthenticated);
        }

        let session = session::login(self.gateway(), email, password).await?;
        self.session().establish(&session)?;

        let cart = self.cart().merge_guest_cart(&session.user_id).await;
        if let Err(e) = &cart {
            warn!(error = %e, "Guest cart merge failed");
        }
        let wishlist = self.wishlist().merge_guest_into_user(&session.user_id)?;

        Ok(LoginOutcome {
            user_id: session.user_id,
            role: session.role,
            cart,
            wishlist,
        })
    }

    /// Log out locally. Returns `false` if nobody was logged in.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Store` if the credential store cannot be written.
    pub fn logout(&self) -> Result<bool, ClientError> {
        Ok(self.session().logout()?)
    }

    /// Exchange the refresh token for a new access token now.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Refresh` if the exchange fails; the session is
    /// torn down in that case.
    pub async fn refresh(&self) -> Result<(), ClientError> {
        self.session().refresh().await?;
        Ok(())
    }
}
