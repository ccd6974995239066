//! Render contract.
//!
//! The cart engine never draws anything. It hands a [`CartRenderer`] the
//! rows to add, the ids to remove, and the rows whose quantity or price
//! changed, and nothing else.

use basket_core::{CartItem, DisplayAttributes, PriceTier, ProductId, VariantId};
use rust_decimal::Decimal;
use thiserror::Error;

/// One cart row as a render target should show it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedLine {
    pub variant_id: VariantId,
    pub product_id: ProductId,
    pub quantity: u32,
    /// Unit price under the tier in effect for the whole cart.
    pub unit_price: Decimal,
    pub line_total: Decimal,
    pub display: DisplayAttributes,
}

impl RenderedLine {
    /// Render `item` under `tier`.
    #[must_use]
    pub fn from_item(item: &CartItem, tier: PriceTier) -> Self {
        Self {
            variant_id: item.variant_id.clone(),
            product_id: item.product_id.clone(),
            quantity: item.quantity.get(),
            unit_price: item.unit_price(tier),
            line_total: item.line_total(tier),
            display: item.display_attributes.clone(),
        }
    }

    /// Returns `true` if `other` would look different on screen.
    #[must_use]
    pub fn differs_from(&self, other: &Self) -> bool {
        self.quantity != other.quantity || self.unit_price != other.unit_price
    }
}

/// Changes between what is rendered and what should be.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderPatch {
    pub added: Vec<RenderedLine>,
    pub removed: Vec<VariantId>,
    pub updated: Vec<RenderedLine>,
    /// Ids the caller claimed to show but the engine had no row for.
    pub conflicts: Vec<VariantId>,
    /// New wholesale state, when it flipped.
    pub wholesale_active: Option<bool>,
}

impl RenderPatch {
    /// Returns `true` if applying the patch would change nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.added.is_empty()
            && self.removed.is_empty()
            && self.updated.is_empty()
            && self.wholesale_active.is_none()
    }
}

/// A rendered id with no backing row.
#[derive(Debug, Clone, Error)]
#[error("Rendered row {variant_id} has no backing cart line")]
pub struct ConflictError {
    pub variant_id: VariantId,
}

/// Something that shows the cart.
///
/// Called while the engine holds its state lock; implementations must not
/// call back into the engine.
pub trait CartRenderer: Send + Sync {
    /// Draw new rows.
    fn render(&self, added: &[RenderedLine]);

    /// Drop rows.
    fn remove(&self, removed: &[VariantId]);

    /// Redraw rows whose quantity or unit price changed.
    fn update(&self, updated: &[RenderedLine]);

    /// Mark a row as waiting for its removal to be confirmed.
    fn set_pending_removal(&self, _variant_id: &VariantId, _pending: bool) {}

    /// Switch the pricing banner.
    fn set_wholesale(&self, _active: bool) {}
}

/// Apply `patch` to `renderer`, skipping empty calls.
pub fn apply_patch(renderer: &dyn CartRenderer, patch: &RenderPatch) {
    if !patch.removed.is_empty() {
        renderer.remove(&patch.removed);
    }
    if !patch.added.is_empty() {
        renderer.render(&patch.added);
    }
    if !patch.updated.is_empty() {
        renderer.update(&patch.updated);
    }
    if let Some(active) = patch.wholesale_active {
        renderer.set_wholesale(active);
    }
}

/// Renderer that draws nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopRenderer;

impl CartRenderer for NoopRenderer {
    fn render(&self, _added: &[RenderedLine]) {}
    fn remove(&self, _removed: &[VariantId]) {}
    fn update(&self, _updated: &[RenderedLine]) {}
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::num::NonZeroU32;
    use std::sync::Mutex;

    use basket_core::UnitPrices;

    use super::*;

    #[derive(Default)]
    struct Calls(Mutex<Vec<String>>);

    impl CartRenderer for Calls {
        fn render(&self, added: &[RenderedLine]) {
            self.0.lock().unwrap().push(format!("render {}", added.len()));
        }
        fn remove(&self, removed: &[VariantId]) {
            self.0.lock().unwrap().push(format!("remove {}", removed.len()));
        }
        fn update(&self, updated: &[RenderedLine]) {
            self.0.lock().unwrap().push(format!("update {}", updated.len()));
        }
        fn set_wholesale(&self, active: bool) {
            self.0.lock().unwrap().push(format!("wholesale {active}"));
        }
    }

    fn item(quantity: u32) -> CartItem {
        CartItem {
            variant_id: VariantId::new("v1"),
            product_id: ProductId::new("p1"),
            quantity: NonZeroU32::new(quantity).unwrap(),
            prices: UnitPrices::new(Decimal::new(1000, 2), Decimal::new(800, 2)),
            display_attributes: DisplayAttributes::default(),
        }
    }

    #[test]
    fn test_line_uses_tier_price() {
        let line = RenderedLine::from_item(&item(3), PriceTier::Wholesale);
        assert_eq!(line.unit_price, Decimal::new(800, 2));
        assert_eq!(line.line_total, Decimal::new(2400, 2));
    }

    #[test]
    fn test_differs_on_quantity_or_price() {
        let retail = RenderedLine::from_item(&item(2), PriceTier::Retail);
        assert!(!retail.differs_from(&retail.clone()));
        assert!(retail.differs_from(&RenderedLine::from_item(&item(3), PriceTier::Retail)));
        assert!(retail.differs_from(&RenderedLine::from_item(&item(2), PriceTier::Wholesale)));
    }

    #[test]
    fn test_apply_patch_skips_empty_parts() {
        let calls = Calls::default();
        let patch = RenderPatch {
            added: vec![RenderedLine::from_item(&item(1), PriceTier::Retail)],
            wholesale_active: Some(false),
            ..RenderPatch::default()
        };
        apply_patch(&calls, &patch);
        assert_eq!(
            *calls.0.lock().unwrap(),
            vec!["render 1".to_string(), "wholesale false".to_string()]
        );
        assert!(RenderPatch::default().is_empty());
    }
}
