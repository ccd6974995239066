//! Cart state engine.
//!
//! Keeps a local copy of the current identity's cart, applies quantity edits
//! optimistically, and reconciles with the server by variant id. Every change
//! to what should be on screen is pushed to the [`CartRenderer`] as a
//! [`RenderPatch`](crate::render::RenderPatch).
//!
//! Mutations of the same line are stamped with per-line sequence numbers.
//! Every success newer than the last one recorded updates the confirmed
//! quantity; only a response that owns the shown value may change what is
//! displayed.

mod state;

use std::collections::BTreeSet;
use std::num::NonZeroU32;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use basket_core::{CartPayload, CartSnapshot, Identity, Seq, UserId, VariantId, Verdict};
use reqwest::Response;
use serde_json::json;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use self::state::CartState;
use crate::debounce::Debouncer;
use crate::error::ApiError;
use crate::gateway::{ApiRequest, Gateway, GatewayError, expect_success, read_json};
use crate::render::{CartRenderer, RenderPatch, RenderedLine, apply_patch};
use crate::store::StoreError;

/// Errors that can occur in cart operations.
#[derive(Debug, Error)]
pub enum CartError {
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("Credential store error: {0}")]
    Store(#[from] StoreError),

    #[error("Variant {0} is not in the cart")]
    NotInCart(VariantId),

    #[error("Invalid quantity: {0}")]
    InvalidQuantity(i64),

    /// A quantity update failed. `previous` is the quantity the line had
    /// before this update.
    #[error("Updating {variant_id} failed (previous quantity {previous})")]
    Mutation {
        variant_id: VariantId,
        previous: NonZeroU32,
        #[source]
        source: ApiError,
    },

    /// A removal failed and the line was restored.
    #[error("Removing {variant_id} failed")]
    Removal {
        variant_id: VariantId,
        #[source]
        source: ApiError,
    },
}

impl From<GatewayError> for CartError {
    fn from(e: GatewayError) -> Self {
        Self::Api(ApiError::Gateway(e))
    }
}

/// Result of a quantity edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuantityChange {
    /// The server accepted the new quantity.
    Updated {
        previous: NonZeroU32,
        current: NonZeroU32,
    },
    /// The quantity was below one and the line was removed.
    Removed,
    /// A later edit of the same line took over this one.
    Coalesced,
}

/// Result of merging the guest cart into a user cart.
#[derive(Debug, Clone, Default)]
pub struct CartMerge {
    /// Lines added to the user cart.
    pub merged: Vec<VariantId>,
    /// Lines that could not be merged; the guest cart was kept.
    pub failed: Vec<VariantId>,
    /// User cart after the merge.
    pub snapshot: CartSnapshot,
}

/// Shared handle to the cart engine.
#[derive(Clone)]
pub struct CartEngine {
    inner: Arc<CartInner>,
}

struct CartInner {
    gateway: Gateway,
    renderer: Arc<dyn CartRenderer>,
    debouncer: Debouncer<VariantId>,
    state: Mutex<CartState>,
}

impl CartEngine {
    /// Create a cart engine. `debounce` is the quiet period used by
    /// [`CartEngine::set_quantity_debounced`].
    pub fn new(gateway: Gateway, renderer: Arc<dyn CartRenderer>, debounce: Duration) -> Self {
        Self {
            inner: Arc::new(CartInner {
                gateway,
                renderer,
                debouncer: Debouncer::new(debounce),
                state: Mutex::new(CartState::new(Identity::Guest)),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, CartState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn apply(&self, patch: &RenderPatch) {
        apply_patch(self.inner.renderer.as_ref(), patch);
    }

    /// Local copy of the cart, including optimistic edits.
    #[must_use]
    pub fn snapshot(&self) -> CartSnapshot {
        self.lock().snapshot.clone()
    }

    /// Rows as last handed to the renderer.
    #[must_use]
    pub fn lines(&self) -> Vec<RenderedLine> {
        self.lock().rendered.values().cloned().collect()
    }

    /// Returns `true` while a removal of `variant_id` awaits confirmation.
    #[must_use]
    pub fn is_pending_removal(&self, variant_id: &VariantId) -> bool {
        self.lock().pending_removal.contains(variant_id)
    }

    /// Make the local state follow the session's identity. A change drops
    /// everything held for the previous identity.
    fn sync_identity(&self) -> Result<Identity, StoreError> {
        let identity = self.inner.gateway.session().identity()?;
        let mut state = self.lock();
        if state.identity != identity {
            debug!(from = %state.identity, to = %identity, "Cart identity changed");
            let patch = state.reset(identity.clone());
            self.apply(&patch);
        }
        Ok(identity)
    }

    async fn call(&self, identity: &Identity, request: &ApiRequest) -> Result<Response, ApiError> {
        let response = self.inner.gateway.send_as(identity, request).await?;
        expect_success(response).await
    }

    /// Fetch the cart for the current identity and reconcile.
    ///
    /// Lines with unacknowledged local edits keep their local values.
    ///
    /// # Errors
    ///
    /// Returns `CartError::Api` if the request fails.
    #[instrument(skip(self))]
    pub async fn fetch_snapshot(&self) -> Result<CartSnapshot, CartError> {
        let identity = self.sync_identity()?;
        let response = self
            .inner
            .gateway
            .send_as(&identity, &ApiRequest::get(cart_path(&identity)))
            .await?;
        let payload: CartPayload = read_json(response).await?;
        let reported = payload.wholesale_active;
        let fetched = CartSnapshot::from(payload);

        if let Some(reported) = reported
            && reported != fetched.wholesale_active()
        {
            warn!(
                reported,
                computed = fetched.wholesale_active(),
                "Ignoring server wholesale flag that disagrees with item quantities"
            );
        }

        let mut state = self.lock();
        if state.identity != identity {
            debug!("Identity changed during fetch; discarding snapshot");
            return Ok(fetched);
        }
        state.adopt(fetched);
        let patch = state.render_patch();
        self.apply(&patch);
        debug!(
            lines = state.snapshot.len(),
            wholesale = state.wholesale,
            "Cart reconciled"
        );
        Ok(state.snapshot.clone())
    }

    /// Reconcile against the ids a render target reports it shows.
    ///
    /// Ids the engine has no row for are reported as conflicts and sent
    /// as added rows.
    pub fn reconcile_rendered(&self, shown: &BTreeSet<VariantId>) -> RenderPatch {
        let mut state = self.lock();
        let patch = state.diff_from(shown);
        self.apply(&patch);
        patch
    }

    /// Set a line's quantity. Anything below one removes the line.
    ///
    /// The new quantity is shown immediately. If the update fails and no
    /// newer edit of the line was made meanwhile, the last acknowledged
    /// quantity is restored. An older update that succeeds after that
    /// rollback is then shown, since the server holds its value.
    ///
    /// # Errors
    ///
    /// Returns `CartError::NotInCart` for unknown lines,
    /// `CartError::Mutation` (carrying the previous quantity) when the
    /// update fails, and the errors of [`CartEngine::remove`] for removals.
    #[instrument(skip(self), fields(variant_id = %variant_id))]
    pub async fn set_quantity(
        &self,
        variant_id: &VariantId,
        quantity: i64,
    ) -> Result<QuantityChange, CartError> {
        let Some(quantity) = to_quantity(quantity)? else {
            self.remove(variant_id).await?;
            return Ok(QuantityChange::Removed);
        };

        let identity = self.sync_identity()?;
        self.inner.debouncer.cancel(variant_id);
        let (seq, previous) = {
            let mut state = self.lock();
            let previous = state
                .snapshot
                .set_quantity(variant_id, quantity)
                .ok_or_else(|| CartError::NotInCart(variant_id.clone()))?;
            state.unsent.remove(variant_id);
            let seq = state.sequences.issue(variant_id.clone());
            let patch = state.render_patch();
            self.apply(&patch);
            (seq, previous)
        };

        self.send_quantity(&identity, variant_id, quantity, seq, previous)
            .await
    }

    /// Like [`CartEngine::set_quantity`], but a burst of edits to the same
    /// line within the debounce window sends one request carrying the last
    /// value. Superseded calls return [`QuantityChange::Coalesced`].
    ///
    /// # Errors
    ///
    /// See [`CartEngine::set_quantity`].
    #[instrument(skip(self), fields(variant_id = %variant_id))]
    pub async fn set_quantity_debounced(
        &self,
        variant_id: &VariantId,
        quantity: i64,
    ) -> Result<QuantityChange, CartError> {
        let Some(quantity) = to_quantity(quantity)? else {
            self.inner.debouncer.cancel(variant_id);
            self.remove(variant_id).await?;
            return Ok(QuantityChange::Removed);
        };

        let identity = self.sync_identity()?;
        {
            let mut state = self.lock();
            state
                .snapshot
                .set_quantity(variant_id, quantity)
                .ok_or_else(|| CartError::NotInCart(variant_id.clone()))?;
            state.unsent.insert(variant_id.clone());
            let patch = state.render_patch();
            self.apply(&patch);
        }

        if !self.inner.debouncer.wait(variant_id).await {
            return Ok(QuantityChange::Coalesced);
        }

        let (seq, current, previous) = {
            let mut state = self.lock();
            if state.identity != identity || !state.unsent.remove(variant_id) {
                return Ok(QuantityChange::Coalesced);
            }
            let Some(current) = state.snapshot.get(variant_id).map(|item| item.quantity) else {
                return Ok(QuantityChange::Coalesced);
            };
            let previous = state
                .confirmed
                .get(variant_id)
                .copied()
                .unwrap_or(current);
            (state.sequences.issue(variant_id.clone()), current, previous)
        };

        self.send_quantity(&identity, variant_id, current, seq, previous)
            .await
    }

    async fn send_quantity(
        &self,
        identity: &Identity,
        variant_id: &VariantId,
        quantity: NonZeroU32,
        seq: Seq,
        previous: NonZeroU32,
    ) -> Result<QuantityChange, CartError> {
        let request = ApiRequest::patch(item_path(identity, variant_id))
            .json(json!({ "quantity": quantity.get() }));
        let result = self.call(identity, &request).await;

        let mut state = self.lock();
        let same_identity = state.identity == *identity;
        match result {
            Ok(_) => {
                if same_identity {
                    let verdict = state.sequences.settle(variant_id, seq);
                    if verdict.confirms() {
                        state.confirmed.insert(variant_id.clone(), quantity);
                    }
                    if verdict.should_apply()
                        && let Some(shown) = state.snapshot.set_quantity(variant_id, quantity)
                        && shown != quantity
                    {
                        let patch = state.render_patch();
                        self.apply(&patch);
                    }
                    debug!(
                        seq = seq.get(),
                        quantity = quantity.get(),
                        ?verdict,
                        "Quantity update acknowledged"
                    );
                }
                Ok(QuantityChange::Updated {
                    previous,
                    current: quantity,
                })
            }
            Err(source) => {
                if same_identity && state.sequences.fail(variant_id, seq) {
                    self.restore_confirmed(&mut state, variant_id);
                    warn!(error = %source, "Quantity update failed; rolled back");
                } else {
                    warn!(seq = seq.get(), error = %source, "Superseded quantity update failed");
                }
                Err(CartError::Mutation {
                    variant_id: variant_id.clone(),
                    previous,
                    source,
                })
            }
        }
    }

    /// Put a line back to what the server last acknowledged. A line the
    /// server no longer holds is dropped.
    fn restore_confirmed(&self, state: &mut CartState, variant_id: &VariantId) {
        match state.confirmed.get(variant_id).copied() {
            Some(quantity) => {
                state.snapshot.set_quantity(variant_id, quantity);
                debug!(restored = quantity.get(), "Restored confirmed quantity");
            }
            None => {
                state.snapshot.remove(variant_id);
                debug!("Line no longer on the server; dropped");
            }
        }
        let patch = state.render_patch();
        self.apply(&patch);
    }

    /// Remove a line.
    ///
    /// The line stays visible, marked pending, until the server confirms.
    /// A failed removal clears the mark and leaves the line in place.
    ///
    /// # Errors
    ///
    /// Returns `CartError::NotInCart` for unknown lines and
    /// `CartError::Removal` when the server refuses.
    #[instrument(skip(self), fields(variant_id = %variant_id))]
    pub async fn remove(&self, variant_id: &VariantId) -> Result<(), CartError> {
        let identity = self.sync_identity()?;
        self.inner.debouncer.cancel(variant_id);
        let seq = {
            let mut state = self.lock();
            if !state.snapshot.contains(variant_id) {
                return Err(CartError::NotInCart(variant_id.clone()));
            }
            state.unsent.remove(variant_id);
            state.pending_removal.insert(variant_id.clone());
            self.inner.renderer.set_pending_removal(variant_id, true);
            state.sequences.issue(variant_id.clone())
        };

        let result = self
            .call(&identity, &ApiRequest::delete(item_path(&identity, variant_id)))
            .await;

        let mut state = self.lock();
        let same_identity = state.identity == identity;
        if same_identity {
            state.pending_removal.remove(variant_id);
        }
        match result {
            Ok(_) => {
                if !same_identity {
                    return Ok(());
                }
                match state.sequences.settle(variant_id, seq) {
                    Verdict::Apply => {
                        state.snapshot.remove(variant_id);
                        state.confirmed.remove(variant_id);
                        let patch = state.render_patch();
                        self.apply(&patch);
                        debug!("Line removed");
                    }
                    Verdict::Superseded => {
                        // Gone on the server; a failed newer edit rolls back
                        // to that.
                        state.confirmed.remove(variant_id);
                        self.inner.renderer.set_pending_removal(variant_id, false);
                        debug!("Newer edit issued after removal; keeping line");
                    }
                    Verdict::Stale => {
                        self.inner.renderer.set_pending_removal(variant_id, false);
                        debug!("Ignoring stale removal response");
                    }
                }
                Ok(())
            }
            Err(source) => {
                if same_identity {
                    self.inner.renderer.set_pending_removal(variant_id, false);
                    if state.sequences.fail(variant_id, seq) {
                        self.restore_confirmed(&mut state, variant_id);
                    }
                }
                warn!(error = %source, "Removal failed; line restored");
                Err(CartError::Removal {
                    variant_id: variant_id.clone(),
                    source,
                })
            }
        }
    }

    /// Empty the cart.
    ///
    /// # Errors
    ///
    /// Returns `CartError::Api` if the request fails; local state is left
    /// untouched in that case.
    #[instrument(skip(self))]
    pub async fn clear(&self) -> Result<(), CartError> {
        let identity = self.sync_identity()?;
        self.call(&identity, &ApiRequest::delete(cart_path(&identity)))
            .await?;

        let mut state = self.lock();
        if state.identity == identity {
            state.snapshot.clear();
            state.confirmed.clear();
            state.unsent.clear();
            state.pending_removal.clear();
            state.sequences.reset();
            let patch = state.render_patch();
            self.apply(&patch);
        }
        info!(identity = %identity, "Cart cleared");
        Ok(())
    }

    /// Move the guest cart into `user_id`'s cart.
    ///
    /// Each guest line is added to the user cart with quantities summed. The
    /// guest cart is deleted only when every line merged. The user cart is
    /// fetched afterwards.
    ///
    /// # Errors
    ///
    /// Returns `CartError::Api` if either cart cannot be read, the guest cart
    /// cannot be deleted, or the final fetch fails. Individual line failures
    /// are reported in [`CartMerge::failed`].
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub async fn merge_guest_cart(&self, user_id: &UserId) -> Result<CartMerge, CartError> {
        let guest = Identity::Guest;
        let user = Identity::User(user_id.clone());
        let gateway = &self.inner.gateway;

        let guest_cart: CartSnapshot =
            read_json(gateway.send_anonymous(&ApiRequest::get(cart_path(&guest))).await?).await?;

        let mut merge = CartMerge::default();
        if !guest_cart.is_empty() {
            let user_cart: CartSnapshot =
                read_json(gateway.send(&ApiRequest::get(cart_path(&user))).await?).await?;

            for item in guest_cart.items() {
                let existing = user_cart
                    .get(&item.variant_id)
                    .map_or(0, |line| line.quantity.get());
                let quantity = existing.saturating_add(item.quantity.get());
                let request = ApiRequest::patch(item_path(&user, &item.variant_id))
                    .json(json!({ "quantity": quantity }));

                match self.call(&user, &request).await {
                    Ok(_) => merge.merged.push(item.variant_id.clone()),
                    Err(e) => {
                        warn!(variant_id = %item.variant_id, error = %e, "Failed to merge guest cart line");
                        merge.failed.push(item.variant_id.clone());
                    }
                }
            }

            if merge.failed.is_empty() {
                self.call(&guest, &ApiRequest::delete(cart_path(&guest)))
                    .await?;
            } else {
                warn!(failed = merge.failed.len(), "Keeping guest cart after partial merge");
            }
        }

        merge.snapshot = self.fetch_snapshot().await?;
        info!(
            merged = merge.merged.len(),
            failed = merge.failed.len(),
            "Guest cart merged"
        );
        Ok(merge)
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

fn cart_path(identity: &Identity) -> [String; 2] {
    ["cart".to_string(), identity.path_segment().to_string()]
}

fn item_path(identity: &Identity, variant_id: &VariantId) -> [String; 4] {
    [
        "cart".to_string(),
        identity.path_segment().to_string(),
        "item".to_string(),
        variant_id.to_string(),
    ]
}

/// `None` means "remove the line".
fn to_quantity(quantity: i64) -> Result<Option<NonZeroU32>, CartError> {
    if quantity < 1 {
        return Ok(None);
    }
    u32::try_from(quantity)
        .ok()
        .and_then(NonZeroU32::new)
        .map(Some)
        .ok_or(CartError::InvalidQuantity(quantity))
}
