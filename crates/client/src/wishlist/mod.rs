//! Wishlist state engine.
//!
//! The wishlist is a set of product ids cached locally per identity
//! (`guest` or `user:<id>`). Toggling is local and immediate; for a logged-in
//! user each change is then replicated to the server through the
//! [`ReplicationQueue`]. Guest wishlists never leave the device.

mod replication;

pub use replication::{
    BatchOutcome, ReplicationBatch, ReplicationError, ReplicationJob, ReplicationOp,
    ReplicationPolicy, ReplicationQueue, ReplicationTicket,
};

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use basket_core::{Identity, ProductId, Surface, Toggle, UserId, WishlistSet};
use thiserror::Error;
use tracing::{debug, info, instrument};

use crate::error::ApiError;
use crate::gateway::{ApiRequest, Gateway, read_json};
use crate::store::{KeyValueStore, KeyValueStoreExt, StoreError};

/// Errors that can occur in wishlist operations.
#[derive(Debug, Error)]
pub enum WishlistError {
    #[error("Wishlist cache error: {0}")]
    Store(#[from] StoreError),

    #[error(transparent)]
    Api(#[from] ApiError),
}

/// Result of a toggle.
#[derive(Debug)]
pub struct ToggleOutcome {
    pub toggle: Toggle,
    /// Pending server update; `None` for guests.
    pub replication: Option<ReplicationTicket>,
}

/// Result of merging the guest wishlist into a user's.
#[derive(Debug)]
pub struct WishlistMerge {
    /// The user's wishlist after the merge.
    pub merged: WishlistSet,
    /// One job per product that only the guest had.
    pub replication: ReplicationBatch,
}

/// Shared handle to the wishlist engine.
#[derive(Clone)]
pub struct WishlistEngine {
    inner: Arc<WishlistInner>,
}

struct WishlistInner {
    gateway: Gateway,
    store: Arc<dyn KeyValueStore>,
    surface: Surface,
    queue: ReplicationQueue,
    // Read-modify-write of cached sets, and the guest-to-user merge.
    guard: Mutex<()>,
}

impl WishlistEngine {
    /// Create a wishlist engine.
    pub fn new(
        gateway: Gateway,
        store: Arc<dyn KeyValueStore>,
        surface: Surface,
        queue: ReplicationQueue,
    ) -> Self {
        Self {
            inner: Arc::new(WishlistInner {
                gateway,
                store,
                surface,
                queue,
                guard: Mutex::new(()),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ()> {
        self.inner
            .guard
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn cache_key(&self, identity: &Identity) -> String {
        format!("{}:wishlist:{}", self.inner.surface, identity.namespace())
    }

    /// Read the cached wishlist of `identity`.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the cache cannot be read.
    pub fn load(&self, identity: &Identity) -> Result<WishlistSet, StoreError> {
        Ok(self
            .inner
            .store
            .get_json(&self.cache_key(identity))?
            .unwrap_or_default())
    }

    fn persist(&self, identity: &Identity, set: &WishlistSet) -> Result<(), StoreError> {
        self.inner.store.set_json(&self.cache_key(identity), set)
    }

    /// The current identity's cached wishlist.
    ///
    /// # Errors
    ///
    /// Returns `WishlistError::Store` if the cache or credentials cannot be
    /// read.
    pub fn current(&self) -> Result<WishlistSet, WishlistError> {
        let identity = self.inner.gateway.session().identity()?;
        Ok(self.load(&identity)?)
    }

    /// Add the product if absent, remove it if present.
    ///
    /// # Errors
    ///
    /// Returns `WishlistError::Store` if the cache cannot be updated.
    pub fn toggle(&self, product_id: ProductId) -> Result<ToggleOutcome, WishlistError> {
        let identity = self.inner.gateway.session().identity()?;
        let toggle = {
            let _guard = self.lock();
            let mut set = self.load(&identity)?;
            let toggle = set.toggle(product_id.clone());
            self.persist(&identity, &set)?;
            toggle
        };
        debug!(%product_id, ?toggle, identity = %identity, "Wishlist toggled");

        let replication = match &identity {
            Identity::Guest => None,
            Identity::User(_) => {
                let job = match toggle {
                    Toggle::Added => ReplicationJob::add(identity.clone(), product_id),
                    Toggle::Removed => ReplicationJob::remove(identity.clone(), product_id),
                };
                Some(self.inner.queue.enqueue(job))
            }
        };
        Ok(ToggleOutcome {
            toggle,
            replication,
        })
    }

    /// Replace the cached wishlist with the server's copy. Guests have no
    /// server copy; their cache is returned unchanged.
    ///
    /// # Errors
    ///
    /// Returns `WishlistError::Api` if the request fails.
    #[instrument(skip(self))]
    pub async fn fetch(&self) -> Result<WishlistSet, WishlistError> {
        let identity = self.inner.gateway.session().identity()?;
        if identity.is_guest() {
            return Ok(self.load(&identity)?);
        }

        let request = ApiRequest::get(["wishlist", identity.path_segment()]);
        let response = self
            .inner
            .gateway
            .send(&request)
            .await
            .map_err(ApiError::from)?;
        let remote: WishlistSet = read_json(response).await?;

        let _guard = self.lock();
        self.persist(&identity, &remote)?;
        debug!(products = remote.len(), "Wishlist fetched");
        Ok(remote)
    }

    /// Fold the guest wishlist into `user_id`'s.
    ///
    /// The union is stored under the user namespace and the guest namespace
    /// is deleted in one step. Products only the guest had are then
    /// replicated one request each; a failed job undoes nothing.
    ///
    /// # Errors
    ///
    /// Returns `WishlistError::Store` if the cache cannot be updated.
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub fn merge_guest_into_user(&self, user_id: &UserId) -> Result<WishlistMerge, WishlistError> {
        let user = Identity::User(user_id.clone());
        let (merged, guest_only) = {
            let _guard = self.lock();
            let guest = self.load(&Identity::Guest)?;
            let existing = self.load(&user)?;
            let merged = existing.union(&guest);
            self.persist(&user, &merged)?;
            self.inner.store.remove(&self.cache_key(&Identity::Guest))?;
            (merged, guest.difference(&existing))
        };

        info!(
            products = merged.len(),
            from_guest = guest_only.len(),
            "Guest wishlist merged"
        );
        let replication = self.inner.queue.enqueue_all(
            guest_only
                .into_iter()
                .map(|product_id| ReplicationJob::add(user.clone(), product_id)),
        );
        Ok(WishlistMerge {
            merged,
            replication,
        })
    }

    /// Empty the current identity's wishlist. For a logged-in user each
    /// previously held product is deleted on the server.
    ///
    /// # Errors
    ///
    /// Returns `WishlistError::Store` if the cache cannot be updated.
    #[instrument(skip(self))]
    pub fn clear(&self) -> Result<ReplicationBatch, WishlistError> {
        let identity = self.inner.gateway.session().identity()?;
        let removed = {
            let _guard = self.lock();
            let mut set = self.load(&identity)?;
            let removed = set.take();
            self.persist(&identity, &set)?;
            removed
        };

        debug!(products = removed.len(), identity = %identity, "Wishlist cleared");
        if identity.is_guest() {
            return Ok(ReplicationBatch::default());
        }
        Ok(self.inner.queue.enqueue_all(
            removed
                .into_iter()
                .map(|product_id| ReplicationJob::remove(identity.clone(), product_id)),
        ))
    }
}
