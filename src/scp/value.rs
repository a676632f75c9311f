//! The application-supplied value type. The core treats values as
//! opaque tokens with a total order, a deterministic combine function,
//! and a canonical byte serialization used for hashing.

use std::fmt::Debug;

use super::slot_id::SlotId;

/// Capability set a host must provide for its nomination/ballot
/// payload. Prefer this trait-object-free generic bound over a deep
/// inheritance hierarchy; the core is generic over `V: Value`.
pub trait Value: Clone + Eq + Ord + Debug + Send + Sync + 'static {
    /// Deterministically combine two values for the given slot,
    /// returning one of the two inputs (never a synthesized third
    /// value). Must agree across all honest nodes given the same
    /// inputs and slot.
    fn combine(&self, other: &Self, slot: SlotId) -> Self;

    /// True for the sentinel "no value" token (the `X = nil` bottom
    /// ballot). Caller must never externalize, prepare, or nominate a
    /// nil value.
    fn is_nil(&self) -> bool;

    /// Canonical byte serialization, used only for hashing (priority
    /// and neighbor computation). Must be deterministic for a given
    /// value.
    fn to_bytes(&self) -> Vec<u8>;
}

/// `combine` ties are broken by slot parity: even slots prefer the
/// greater of the two inputs, odd slots prefer the lesser. This is
/// the one place the protocol's tie-breaking depends on the slot
/// number at all, and it exists specifically to avoid perpetual
/// disagreement among nodes that nominate distinct values for the
/// same slot.
///
/// Host `Value` impls whose combine rule is "just break ties on
/// value order" can implement `combine` by delegating to this helper.
pub fn combine_by_parity<V: Ord + Clone>(a: &V, b: &V, slot: SlotId) -> V {
    let winner = if slot.is_even() { a.max(b) } else { a.min(b) };
    winner.clone()
}

/// Folds `combine` over a set of values in their natural sorted order.
/// Deterministic for a given slot and set, regardless of the
/// insertion order the caller originally observed the values in;
/// the input is required to already be sorted (callers pass a
/// `BTreeSet`/`BTreeMap` iterator).
pub fn combine_all<V: Value>(mut values: impl Iterator<Item = V>, slot: SlotId) -> Option<V> {
    let first = values.next()?;
    Some(values.fold(first, |acc, v| acc.combine(&v, slot)))
}
