//! Cart snapshot and the wholesale pricing rule.
//!
//! A [`CartSnapshot`] is the client's copy of the authoritative server cart.
//! Items are keyed by [`VariantId`]; quantities are always positive, so a
//! quantity of zero can only be expressed by removing the item.
//!
//! The wholesale flag is derived, never stored: [`CartSnapshot::wholesale_active`]
//! recomputes it from the item set every time it is asked.

use std::collections::{BTreeMap, BTreeSet};
use std::num::NonZeroU32;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::types::{PriceTier, ProductId, UnitPrices, VariantId};

/// Total units at which wholesale pricing switches on.
pub const WHOLESALE_THRESHOLD: u64 = 6;

/// Presentation data carried with a cart line. Opaque to the engine.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplayAttributes {
    /// Product title.
    #[serde(default)]
    pub title: String,
    /// Variant title (e.g. "Large / Blue").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant_title: Option<String>,
    /// Thumbnail URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    /// Anything else the backend sends along.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// A single line in the cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartItem {
    /// Unique key of the line.
    pub variant_id: VariantId,
    /// Product the variant belongs to.
    pub product_id: ProductId,
    /// Units of this variant; never zero.
    pub quantity: NonZeroU32,
    /// Retail and wholesale unit prices.
    #[serde(flatten)]
    pub prices: UnitPrices,
    /// Presentation data.
    #[serde(default)]
    pub display_attributes: DisplayAttributes,
}

impl CartItem {
    /// Unit price under the given tier.
    #[must_use]
    pub const fn unit_price(&self, tier: PriceTier) -> Decimal {
        self.prices.for_tier(tier)
    }

    /// Line total (`unit price * quantity`) under the given tier.
    #[must_use]
    pub fn line_total(&self, tier: PriceTier) -> Decimal {
        self.unit_price(tier) * Decimal::from(self.quantity.get())
    }
}

/// Serialized form of a [`CartSnapshot`].
///
/// `wholesale_active` is written for consumers that want it, but is only
/// informational when read back: the snapshot recomputes it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartPayload {
    /// Cart lines.
    #[serde(default)]
    pub items: Vec<CartItem>,
    /// Flag as reported by whoever produced the payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wholesale_active: Option<bool>,
}

/// The client's copy of a cart.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "CartPayload", into = "CartPayload")]
pub struct CartSnapshot {
    items: BTreeMap<VariantId, CartItem>,
}

impl CartSnapshot {
    /// Create an empty snapshot.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a snapshot from a list of items. A repeated variant keeps the
    /// last occurrence.
    #[must_use]
    pub fn from_items(items: impl IntoIterator<Item = CartItem>) -> Self {
        Self {
            items: items
                .into_iter()
                .map(|item| (item.variant_id.clone(), item))
                .collect(),
        }
    }

    /// Variant ids currently in the cart.
    #[must_use]
    pub fn ids(&self) -> BTreeSet<VariantId> {
        self.items.keys().cloned().collect()
    }

    /// Iterate over the cart lines.
    pub fn items(&self) -> impl Iterator<Item = &CartItem> {
        self.items.values()
    }

    /// Look up a line.
    #[must_use]
    pub fn get(&self, variant_id: &VariantId) -> Option<&CartItem> {
        self.items.get(variant_id)
    }

    /// Returns `true` if the variant is in the cart.
    #[must_use]
    pub fn contains(&self, variant_id: &VariantId) -> bool {
        self.items.contains_key(variant_id)
    }

    /// Number of distinct lines.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns `true` if the cart has no lines.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Sum of all quantities.
    #[must_use]
    pub fn total_quantity(&self) -> u64 {
        self.items
            .values()
            .map(|item| u64::from(item.quantity.get()))
            .sum()
    }

    /// Whether wholesale pricing applies, derived from the current item set.
    #[must_use]
    pub fn wholesale_active(&self) -> bool {
        self.total_quantity() >= WHOLESALE_THRESHOLD
    }

    /// Price tier every line is rendered with.
    #[must_use]
    pub fn price_tier(&self) -> PriceTier {
        PriceTier::from_wholesale(self.wholesale_active())
    }

    /// Sum of line totals under the current tier.
    #[must_use]
    pub fn subtotal(&self) -> Decimal {
        let tier = self.price_tier();
        self.items.values().map(|item| item.line_total(tier)).sum()
    }

    /// Set the quantity of an existing line.
    ///
    /// Returns the previous quantity, or `None` (leaving the cart untouched)
    /// when the variant is not in the cart.
    pub fn set_quantity(
        &mut self,
        variant_id: &VariantId,
        quantity: NonZeroU32,
    ) -> Option<NonZeroU32> {
        self.items
            .get_mut(variant_id)
            .map(|item| std::mem::replace(&mut item.quantity, quantity))
    }

    /// Insert or replace a line, returning the replaced one.
    pub fn insert(&mut self, item: CartItem) -> Option<CartItem> {
        self.items.insert(item.variant_id.clone(), item)
    }

    /// Remove a line.
    pub fn remove(&mut self, variant_id: &VariantId) -> Option<CartItem> {
        self.items.remove(variant_id)
    }

    /// Remove every line.
    pub fn clear(&mut self) {
        self.items.clear();
    }
}

impl From<CartPayload> for CartSnapshot {
    fn from(payload: CartPayload) -> Self {
        Self::from_items(payload.items)
    }
}

impl From<CartSnapshot> for CartPayload {
    fn from(snapshot: CartSnapshot) -> Self {
        let wholesale_active = Some(snapshot.wholesale_active());
        Self {
            items: snapshot.items.into_values().collect(),
            wholesale_active,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn item(variant: &str, quantity: u32) -> CartItem {
        CartItem {
            variant_id: VariantId::new(variant),
            product_id: ProductId::new(format!("p-{variant}")),
            quantity: NonZeroU32::new(quantity).unwrap(),
            prices: UnitPrices::new(Decimal::new(1000, 2), Decimal::new(800, 2)),
            display_attributes: DisplayAttributes::default(),
        }
    }

    #[test]
    fn test_wholesale_threshold_flips_at_six_units() {
        let mut cart = CartSnapshot::from_items([item("a", 3), item("b", 2)]);
        assert_eq!(cart.total_quantity(), 5);
        assert!(!cart.wholesale_active());

        cart.set_quantity(&VariantId::new("b"), NonZeroU32::new(3).unwrap());
        assert_eq!(cart.total_quantity(), 6);
        assert!(cart.wholesale_active());
        assert_eq!(cart.price_tier(), PriceTier::Wholesale);

        cart.set_quantity(&VariantId::new("b"), NonZeroU32::new(2).unwrap());
        assert!(!cart.wholesale_active());
        assert_eq!(cart.price_tier(), PriceTier::Retail);
    }

    #[test]
    fn test_removing_a_line_recomputes_wholesale() {
        let mut cart = CartSnapshot::from_items([item("a", 5), item("b", 1)]);
        assert!(cart.wholesale_active());
        cart.remove(&VariantId::new("b"));
        assert!(!cart.wholesale_active());
    }

    #[test]
    fn test_subtotal_uses_one_tier_for_every_line() {
        let retail = CartSnapshot::from_items([item("a", 1), item("b", 1)]);
        assert_eq!(retail.subtotal(), Decimal::new(2000, 2));

        let wholesale = CartSnapshot::from_items([item("a", 3), item("b", 3)]);
        assert_eq!(wholesale.subtotal(), Decimal::new(4800, 2));
    }

    #[test]
    fn test_set_quantity_on_missing_variant_is_noop() {
        let mut cart = CartSnapshot::from_items([item("a", 1)]);
        let previous = cart.set_quantity(&VariantId::new("zzz"), NonZeroU32::new(4).unwrap());
        assert!(previous.is_none());
        assert_eq!(cart.len(), 1);
    }

    #[test]
    fn test_payload_flag_is_recomputed_not_trusted() {
        let json = serde_json::json!({
            "items": [{
                "variantId": "a",
                "productId": "p-a",
                "quantity": 2,
                "unitPriceRetail": "10.00",
                "unitPriceWholesale": "8.00",
                "displayAttributes": { "title": "Tee", "color": "red" }
            }],
            "wholesaleActive": true
        });
        let cart: CartSnapshot = serde_json::from_value(json).unwrap();
        assert!(!cart.wholesale_active());

        let line = cart.get(&VariantId::new("a")).unwrap();
        assert_eq!(line.display_attributes.title, "Tee");
        assert_eq!(
            line.display_attributes.extra.get("color"),
            Some(&serde_json::json!("red"))
        );

        let written = serde_json::to_value(&cart).unwrap();
        assert_eq!(written["wholesaleActive"], serde_json::json!(false));
    }

    #[test]
    fn test_zero_quantity_is_rejected_on_decode() {
        let json = serde_json::json!({
            "variantId": "a",
            "productId": "p-a",
            "quantity": 0,
            "unitPriceRetail": "10.00",
            "unitPriceWholesale": "8.00"
        });
        assert!(serde_json::from_value::<CartItem>(json).is_err());
    }
}
