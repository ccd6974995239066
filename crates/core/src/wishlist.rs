//! Wishlist set.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::types::ProductId;

/// Result of toggling a product on a wishlist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Toggle {
    /// The product was not on the list and now is.
    Added,
    /// The product was on the list and no longer is.
    Removed,
}

/// A duplicate-free set of wishlisted products.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WishlistSet {
    #[serde(default)]
    product_ids: BTreeSet<ProductId>,
}

impl WishlistSet {
    /// Create an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if the product is on the list.
    #[must_use]
    pub fn contains(&self, product_id: &ProductId) -> bool {
        self.product_ids.contains(product_id)
    }

    /// Add the product if absent, remove it if present.
    pub fn toggle(&mut self, product_id: ProductId) -> Toggle {
        if self.product_ids.remove(&product_id) {
            Toggle::Removed
        } else {
            self.product_ids.insert(product_id);
            Toggle::Added
        }
    }

    /// Insert a product. Returns `false` if it was already present.
    pub fn insert(&mut self, product_id: ProductId) -> bool {
        self.product_ids.insert(product_id)
    }

    /// Remove a product. Returns `false` if it was not present.
    pub fn remove(&mut self, product_id: &ProductId) -> bool {
        self.product_ids.remove(product_id)
    }

    /// Union of two sets.
    #[must_use]
    pub fn union(&self, other: &Self) -> Self {
        self.product_ids
            .union(&other.product_ids)
            .cloned()
            .collect()
    }

    /// Products in `self` that are not in `other`.
    #[must_use]
    pub fn difference(&self, other: &Self) -> Vec<ProductId> {
        self.product_ids
            .difference(&other.product_ids)
            .cloned()
            .collect()
    }

    /// Empty the set, returning what it held.
    pub fn take(&mut self) -> Vec<ProductId> {
        std::mem::take(&mut self.product_ids).into_iter().collect()
    }

    /// Iterate in id order.
    pub fn iter(&self) -> impl Iterator<Item = &ProductId> {
        self.product_ids.iter()
    }

    /// Number of products.
    #[must_use]
    pub fn len(&self) -> usize {
        self.product_ids.len()
    }

    /// Returns `true` if the set is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.product_ids.is_empty()
    }
}

impl FromIterator<ProductId> for WishlistSet {
    fn from_iter<I: IntoIterator<Item = ProductId>>(iter: I) -> Self {
        Self {
            product_ids: iter.into_iter().collect(),
        }
    }
}
