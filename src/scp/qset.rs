//! Quorum sets: an ordered collection of quorum slices, each a set of
//! node IDs.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::node_id::NodeId;

/// A single quorum slice: a set of node IDs, any one of which being
/// wholly contained in a candidate set satisfies that member's
/// requirement for membership in a quorum.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct QuorumSlice(BTreeSet<NodeId>);

impl QuorumSlice {
    pub fn new(members: impl IntoIterator<Item = NodeId>) -> Self {
        QuorumSlice(members.into_iter().collect())
    }

    pub fn members(&self) -> impl Iterator<Item = &NodeId> {
        self.0.iter()
    }

    pub fn contains(&self, id: &NodeId) -> bool {
        self.0.contains(id)
    }

    pub fn is_subset_of(&self, other: &BTreeSet<NodeId>) -> bool {
        self.0.is_subset(other)
    }

    pub fn intersects(&self, other: &BTreeSet<NodeId>) -> bool {
        self.0.iter().any(|m| other.contains(m))
    }
}

/// A node's quorum configuration: an ordered list of slices.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuorumSet(Vec<QuorumSlice>);

impl QuorumSet {
    pub fn new(slices: impl IntoIterator<Item = QuorumSlice>) -> Self {
        QuorumSet(slices.into_iter().collect())
    }

    pub fn slices(&self) -> impl Iterator<Item = &QuorumSlice> {
        self.0.iter()
    }

    pub fn slice_count(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// True if `candidate` satisfies at least one of this qset's
    /// slices, i.e. some slice of `self` is wholly contained in
    /// `candidate`.
    pub fn has_slice_satisfied_by(&self, candidate: &BTreeSet<NodeId>) -> bool {
        self.0.iter().any(|slice| slice.is_subset_of(candidate))
    }

    /// `true` when `members` is a v-blocking set for the node owning
    /// this qset: it intersects every slice.
    pub fn is_v_blocking(&self, members: &BTreeSet<NodeId>) -> bool {
        if self.0.is_empty() {
            return false;
        }
        self.0.iter().all(|slice| slice.intersects(members))
    }

    /// Deduplicated, sorted list of node IDs named anywhere in this
    /// qset's slices. The owning node's own ID is not excluded here;
    /// callers pass a qset that already excludes self, or filter the
    /// result themselves (`Node::peers` does the filtering).
    pub fn flattened_members(&self) -> BTreeSet<NodeId> {
        self.0
            .iter()
            .flat_map(|slice| slice.members().cloned())
            .collect()
    }

    /// Weight of `id` under this qset: 1.0 for the owning node itself
    /// (`self_id`), else the fraction of slices containing `id`.
    pub fn weight(&self, self_id: &NodeId, id: &NodeId) -> f64 {
        if id == self_id {
            return 1.0;
        }
        if self.0.is_empty() {
            return 0.0;
        }
        let count = self.0.iter().filter(|slice| slice.contains(id)).count();
        count as f64 / self.0.len() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(names: &[&str]) -> BTreeSet<NodeId> {
        names.iter().map(|n| NodeId::new(*n)).collect()
    }

    fn slice(names: &[&str]) -> QuorumSlice {
        QuorumSlice::new(names.iter().map(|n| NodeId::new(*n)))
    }

    #[test]
    fn v_blocking_requires_intersecting_every_slice() {
        let q = QuorumSet::new([slice(&["a", "b"]), slice(&["c", "d"])]);
        assert!(q.is_v_blocking(&ids(&["a", "c"])));
        assert!(!q.is_v_blocking(&ids(&["a", "b"])));
    }

    #[test]
    fn empty_qset_is_never_v_blocked() {
        let q = QuorumSet::default();
        assert!(!q.is_v_blocking(&ids(&["a"])));
    }

    #[test]
    fn weight_self_is_one() {
        let q = QuorumSet::new([slice(&["a", "b", "c"])]);
        let self_id = NodeId::new("a");
        assert_eq!(q.weight(&self_id, &self_id), 1.0);
    }

    #[test]
    fn weight_peer_in_all_slices_is_one() {
        let q = QuorumSet::new([slice(&["a", "b"]), slice(&["a", "c"])]);
        let self_id = NodeId::new("z");
        assert_eq!(q.weight(&self_id, &NodeId::new("a")), 1.0);
        assert_eq!(q.weight(&self_id, &NodeId::new("b")), 0.5);
    }

    #[test]
    fn has_slice_satisfied_by() {
        let q = QuorumSet::new([slice(&["a", "b"]), slice(&["c"])]);
        assert!(q.has_slice_satisfied_by(&ids(&["c", "x"])));
        assert!(!q.has_slice_satisfied_by(&ids(&["a", "x"])));
    }

    #[test]
    fn flattened_members_dedupes_and_sorts() {
        let q = QuorumSet::new([slice(&["b", "a"]), slice(&["a", "c"])]);
        let flat: Vec<_> = q.flattened_members().into_iter().collect();
        assert_eq!(
            flat,
            vec![NodeId::new("a"), NodeId::new("b"), NodeId::new("c")]
        );
    }
}
