//! Local cart state and its render bookkeeping.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::num::NonZeroU32;

use basket_core::{CartSnapshot, Identity, SequenceTracker, VariantId, reconcile};
use tracing::warn;

use crate::render::{ConflictError, RenderPatch, RenderedLine};

/// Everything the cart engine knows for one identity.
#[derive(Debug)]
pub(super) struct CartState {
    pub identity: Identity,
    /// Local (optimistic) cart.
    pub snapshot: CartSnapshot,
    /// Last quantity the server acknowledged per line.
    pub confirmed: HashMap<VariantId, NonZeroU32>,
    /// Rows as last handed to the renderer.
    pub rendered: BTreeMap<VariantId, RenderedLine>,
    pub wholesale: bool,
    pub sequences: SequenceTracker<VariantId>,
    /// Lines whose DELETE is in flight.
    pub pending_removal: BTreeSet<VariantId>,
    /// Lines edited locally while their debounce window is open.
    pub unsent: HashSet<VariantId>,
}

impl CartState {
    pub fn new(identity: Identity) -> Self {
        Self {
            identity,
            snapshot: CartSnapshot::new(),
            confirmed: HashMap::new(),
            rendered: BTreeMap::new(),
            wholesale: false,
            sequences: SequenceTracker::new(),
            pending_removal: BTreeSet::new(),
            unsent: HashSet::new(),
        }
    }

    /// Start over for a new identity, returning the patch that clears the
    /// previous identity's rows.
    pub fn reset(&mut self, identity: Identity) -> RenderPatch {
        let patch = RenderPatch {
            removed: self.rendered.keys().cloned().collect(),
            wholesale_active: self.wholesale.then_some(false),
            ..RenderPatch::default()
        };
        *self = Self::new(identity);
        patch
    }

    /// Take a freshly fetched snapshot as the new truth, keeping local rows
    /// for lines with unacknowledged mutations.
    pub fn adopt(&mut self, fetched: CartSnapshot) {
        self.confirmed = fetched
            .items()
            .map(|item| (item.variant_id.clone(), item.quantity))
            .collect();

        let local: Vec<VariantId> = self
            .sequences
            .pending()
            .chain(self.unsent.iter())
            .cloned()
            .collect();

        let mut merged = fetched;
        for variant_id in local {
            match self.snapshot.get(&variant_id) {
                Some(item) => {
                    merged.insert(item.clone());
                }
                None => {
                    merged.remove(&variant_id);
                }
            }
        }
        self.snapshot = merged;
    }

    /// Patch from the engine's own rendered rows to the current snapshot.
    pub fn render_patch(&mut self) -> RenderPatch {
        let previous: BTreeSet<VariantId> = self.rendered.keys().cloned().collect();
        self.diff_from(&previous)
    }

    /// Patch from `previous` (ids the render target shows) to the current
    /// snapshot. Every line is re-priced under the current tier.
    pub fn diff_from(&mut self, previous: &BTreeSet<VariantId>) -> RenderPatch {
        let tier = self.snapshot.price_tier();
        let diff = reconcile(previous, self.snapshot.ids());
        let mut patch = RenderPatch::default();

        for variant_id in diff.removed {
            self.rendered.remove(&variant_id);
            patch.removed.push(variant_id);
        }

        for variant_id in &diff.added {
            if let Some(item) = self.snapshot.get(variant_id) {
                let line = RenderedLine::from_item(item, tier);
                self.rendered.insert(variant_id.clone(), line.clone());
                patch.added.push(line);
            }
        }

        for variant_id in &diff.unchanged {
            let Some(item) = self.snapshot.get(variant_id) else {
                continue;
            };
            let line = RenderedLine::from_item(item, tier);
            match self.rendered.get(variant_id) {
                None => {
                    let conflict = ConflictError {
                        variant_id: variant_id.clone(),
                    };
                    warn!(error = %conflict, "Treating unknown rendered row as added");
                    patch.conflicts.push(conflict.variant_id);
                    patch.added.push(line.clone());
                }
                Some(old) if old.differs_from(&line) => patch.updated.push(line.clone()),
                Some(_) => {}
            }
            self.rendered.insert(variant_id.clone(), line);
        }

        let snapshot = &self.snapshot;
        self.rendered
            .retain(|variant_id, _| snapshot.contains(variant_id));

        let active = self.snapshot.wholesale_active();
        if active != self.wholesale {
            self.wholesale = active;
            patch.wholesale_active = Some(active);
        }
        patch
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use basket_core::{CartItem, DisplayAttributes, ProductId, UnitPrices};
    use rust_decimal::Decimal;

    use super::*;

    fn item(variant: &str, quantity: u32) -> CartItem {
        CartItem {
            variant_id: VariantId::new(variant),
            product_id: ProductId::new(format!("p-{variant}")),
            quantity: NonZeroU32::new(quantity).unwrap(),
            prices: UnitPrices::new(Decimal::new(1000, 2), Decimal::new(700, 2)),
            display_attributes: DisplayAttributes::default(),
        }
    }

    fn ids(patch_ids: &[VariantId]) -> Vec<&str> {
        patch_ids.iter().map(VariantId::as_str).collect()
    }

    #[test]
    fn test_first_render_adds_every_line() {
        let mut state = CartState::new(Identity::Guest);
        state.adopt(CartSnapshot::from_items([item("a", 1), item("b", 2)]));

        let patch = state.render_patch();
        assert_eq!(patch.added.len(), 2);
        assert!(patch.removed.is_empty());
        assert!(patch.updated.is_empty());
        assert_eq!(patch.wholesale_active, None);
        assert!(state.render_patch().is_empty());
    }

    #[test]
    fn test_keyed_diff_against_caller_ids() {
        let mut state = CartState::new(Identity::Guest);
        state.adopt(CartSnapshot::from_items([item("A", 1), item("B", 1), item("C", 1)]));
        state.render_patch();

        state.adopt(CartSnapshot::from_items([item("B", 1), item("C", 1), item("D", 1)]));
        let patch = state.render_patch();

        assert_eq!(ids(&patch.removed), vec!["A"]);
        let added: Vec<&str> = patch.added.iter().map(|l| l.variant_id.as_str()).collect();
        assert_eq!(added, vec!["D"]);
        assert!(patch.updated.is_empty());
    }

    #[test]
    fn test_wholesale_flip_reprices_every_line() {
        let mut state = CartState::new(Identity::Guest);
        state.adopt(CartSnapshot::from_items([item("a", 3), item("b", 2)]));
        state.render_patch();

        state
            .snapshot
            .set_quantity(&VariantId::new("b"), NonZeroU32::new(3).unwrap());
        let patch = state.render_patch();
        assert_eq!(patch.wholesale_active, Some(true));
        assert_eq!(patch.updated.len(), 2);
        assert!(
            patch
                .updated
                .iter()
                .all(|line| line.unit_price == Decimal::new(700, 2))
        );

        state
            .snapshot
            .set_quantity(&VariantId::new("a"), NonZeroU32::new(2).unwrap());
        let patch = state.render_patch();
        assert_eq!(patch.wholesale_active, Some(false));
        assert!(
            patch
                .updated
                .iter()
                .all(|line| line.unit_price == Decimal::new(1000, 2))
        );
    }

    #[test]
    fn test_unknown_rendered_id_is_conflict_treated_as_added() {
        let mut state = CartState::new(Identity::Guest);
        state.adopt(CartSnapshot::from_items([item("a", 1)]));

        let shown: BTreeSet<VariantId> = [VariantId::new("a")].into_iter().collect();
        let patch = state.diff_from(&shown);

        assert_eq!(ids(&patch.conflicts), vec!["a"]);
        assert_eq!(patch.added.len(), 1);
        assert!(state.rendered.contains_key(&VariantId::new("a")));
    }

    #[test]
    fn test_adopt_keeps_lines_with_pending_mutations() {
        let mut state = CartState::new(Identity::Guest);
        state.adopt(CartSnapshot::from_items([item("a", 1), item("b", 1)]));

        let a = VariantId::new("a");
        state.snapshot.set_quantity(&a, NonZeroU32::new(4).unwrap());
        let _seq = state.sequences.issue(a.clone());

        state.adopt(CartSnapshot::from_items([item("a", 1), item("b", 5)]));
        assert_eq!(state.snapshot.get(&a).unwrap().quantity.get(), 4);
        assert_eq!(
            state.snapshot.get(&VariantId::new("b")).unwrap().quantity.get(),
            5
        );
        assert_eq!(state.confirmed.get(&a).unwrap().get(), 1);
    }

    #[test]
    fn test_reset_clears_rendered_rows() {
        let mut state = CartState::new(Identity::Guest);
        state.adopt(CartSnapshot::from_items([item("a", 6)]));
        state.render_patch();

        let patch = state.reset(Identity::User(basket_core::UserId::new("1")));
        assert_eq!(ids(&patch.removed), vec!["a"]);
        assert_eq!(patch.wholesale_active, Some(false));
        assert!(state.snapshot.is_empty());
        assert!(state.rendered.is_empty());
    }
}
