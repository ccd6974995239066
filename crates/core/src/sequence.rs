//! Per-entity mutation sequencing.
//!
//! Responses to two mutations of the same entity can arrive in either order.
//! Each mutation is stamped with a [`Seq`] when issued; when its response
//! arrives, [`SequenceTracker::settle`] (or [`SequenceTracker::fail`]) decides
//! whether that response may touch local state.
//!
//! Two things are tracked per entity: the newest success the server has
//! reported (the confirmed state), and which mutation, if any, owns the
//! optimistic value currently shown. A failure only rolls back when it owns
//! the shown value; a success older than the owner still updates the confirmed
//! state so a later rollback lands on what the server actually holds.

use std::collections::HashMap;
use std::hash::Hash;

/// Sequence number of one issued mutation. Monotonic per entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Seq(u64);

impl Seq {
    /// Raw value, for logging.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

/// What to do with a successful response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// No newer mutation owns the shown value; apply the response to both
    /// the confirmed and the shown state.
    Apply,
    /// The server now holds this mutation's value, but a newer mutation
    /// still owns the shown value. Update the confirmed state only.
    Superseded,
    /// A newer response has already been recorded; ignore this one.
    Stale,
}

impl Verdict {
    /// Returns `true` for [`Verdict::Apply`].
    #[must_use]
    pub const fn should_apply(self) -> bool {
        matches!(self, Self::Apply)
    }

    /// Returns `true` when the response is the newest server state seen so
    /// far ([`Verdict::Apply`] or [`Verdict::Superseded`]).
    #[must_use]
    pub const fn confirms(self) -> bool {
        matches!(self, Self::Apply | Self::Superseded)
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct Entry {
    issued: u64,
    /// Newest succeeded seq.
    applied: u64,
    /// Seq whose optimistic value is shown; 0 when the shown value is the
    /// confirmed one.
    owner: u64,
    in_flight: usize,
}

/// Tracks issued, applied, and outstanding mutations per entity key.
#[derive(Debug, Clone)]
pub struct SequenceTracker<K> {
    entries: HashMap<K, Entry>,
}

impl<K> Default for SequenceTracker<K> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }
}

impl<K: Eq + Hash> SequenceTracker<K> {
    /// Create an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stamp a new mutation of `key`. The new mutation owns the shown value.
    pub fn issue(&mut self, key: K) -> Seq {
        let entry = self.entries.entry(key).or_default();
        entry.issued += 1;
        entry.in_flight += 1;
        entry.owner = entry.issued;
        Seq(entry.issued)
    }

    /// Returns `true` if `seq` is the newest mutation issued for `key`.
    #[must_use]
    pub fn is_latest(&self, key: &K, seq: Seq) -> bool {
        self.entries
            .get(key)
            .is_some_and(|entry| entry.issued == seq.0)
    }

    /// Returns `true` while any mutation of `key` awaits its response.
    #[must_use]
    pub fn in_flight(&self, key: &K) -> bool {
        self.entries.get(key).is_some_and(|entry| entry.in_flight > 0)
    }

    /// Keys with at least one outstanding mutation.
    pub fn pending(&self) -> impl Iterator<Item = &K> {
        self.entries
            .iter()
            .filter(|(_, entry)| entry.in_flight > 0)
            .map(|(key, _)| key)
    }

    /// Decide what to do with the successful response to mutation `seq` of
    /// `key`, and record it.
    pub fn settle(&mut self, key: &K, seq: Seq) -> Verdict {
        let Some(entry) = self.entries.get_mut(key) else {
            return Verdict::Stale;
        };
        entry.in_flight = entry.in_flight.saturating_sub(1);
        if seq.0 <= entry.applied {
            return Verdict::Stale;
        }
        entry.applied = seq.0;
        if seq.0 < entry.owner {
            Verdict::Superseded
        } else {
            entry.owner = 0;
            Verdict::Apply
        }
    }

    /// Record that mutation `seq` of `key` failed. Returns `true` if it owned
    /// the shown value, i.e. the caller must restore the confirmed state.
    pub fn fail(&mut self, key: &K, seq: Seq) -> bool {
        let Some(entry) = self.entries.get_mut(key) else {
            return false;
        };
        entry.in_flight = entry.in_flight.saturating_sub(1);
        if entry.owner == seq.0 {
            entry.owner = 0;
            true
        } else {
            false
        }
    }

    /// Forget every key. Used when the identity behind the tracked entities
    /// changes.
    pub fn reset(&mut self) {
        self.entries.clear();
    }
}
