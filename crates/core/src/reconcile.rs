//! Keyed reconciliation between what is rendered and what the server holds.
//!
//! Rendering targets are told which keys appeared, which disappeared, and
//! which stayed. Nothing here depends on ordering or on the position of a row
//! in the rendered list.

use std::collections::BTreeSet;

/// Id-set difference between a previous and a next key set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diff<K: Ord> {
    /// Keys present in the next set only.
    pub added: BTreeSet<K>,
    /// Keys present in the previous set only.
    pub removed: BTreeSet<K>,
    /// Keys present in both.
    pub unchanged: BTreeSet<K>,
}

impl<K: Ord> Default for Diff<K> {
    fn default() -> Self {
        Self {
            added: BTreeSet::new(),
            removed: BTreeSet::new(),
            unchanged: BTreeSet::new(),
        }
    }
}

impl<K: Ord> Diff<K> {
    /// Returns `true` if nothing was added or removed.
    #[must_use]
    pub fn is_stable(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// Compute `removed = previous - next`, `added = next - previous`, and
/// `unchanged = previous ∩ next`.
#[must_use]
pub fn reconcile<K, I>(previous: &BTreeSet<K>, next: I) -> Diff<K>
where
    K: Ord + Clone,
    I: IntoIterator<Item = K>,
{
    let next: BTreeSet<K> = next.into_iter().collect();

    let mut diff = Diff::default();
    for key in previous {
        if next.contains(key) {
            diff.unchanged.insert(key.clone());
        } else {
            diff.removed.insert(key.clone());
        }
    }
    for key in next {
        if !previous.contains(&key) {
            diff.added.insert(key);
        }
    }
    diff
}
