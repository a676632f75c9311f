//! Federated voting predicates: v-blocking, quorum-satisfying, accept,
//! confirm. These operate purely over the slot's latest-envelope-per-sender
//! map, the local node's own `QuorumSet`, and a predicate over messages,
//! with no other state.
//!
//! The local node's own current statement is never stored as an
//! envelope in `latest` (a node doesn't address an envelope to
//! itself); callers pass whether the local statement already
//! satisfies the predicate in question as `self_satisfies`.

use std::collections::BTreeSet;
use std::collections::BTreeMap;

use super::envelope::Envelope;
use super::node_id::NodeId;
use super::qset::QuorumSet;
use super::value::Value;

/// `true` when `members` is a v-blocking set for the node owning
/// `self_qset`: it intersects every one of its slices.
pub fn is_v_blocking(self_qset: &QuorumSet, members: &BTreeSet<NodeId>) -> bool {
    self_qset.is_v_blocking(members)
}

/// `true` when there exists a set `U` containing the local node such
/// that every member of `U` has a slice contained in `U`, and every
/// member of `U` satisfies `predicate` (the local node via
/// `self_satisfies`, every other member via its latest envelope).
pub fn has_quorum_satisfying<V, P>(
    self_id: &NodeId,
    self_qset: &QuorumSet,
    self_satisfies: bool,
    latest: &BTreeMap<NodeId, Envelope<V>>,
    predicate: P,
) -> bool
where
    V: Value,
    P: Fn(&Envelope<V>) -> bool,
{
    if !self_satisfies {
        return false;
    }

    let mut candidates: BTreeSet<NodeId> = latest
        .iter()
        .filter(|(_, env)| predicate(env))
        .map(|(id, _)| id.clone())
        .collect();
    candidates.insert(self_id.clone());

    loop {
        let snapshot = candidates.clone();
        candidates.retain(|member| {
            let qset = if member == self_id {
                self_qset
            } else {
                match latest.get(member) {
                    Some(env) => &env.qset,
                    None => return false,
                }
            };
            qset.has_slice_satisfied_by(&snapshot)
        });
        if !candidates.contains(self_id) {
            return false;
        }
        if candidates.len() == snapshot.len() {
            break;
        }
    }

    candidates.contains(self_id)
}

/// `accept(T)`: local node accepts statement T when either a
/// v-blocking set has already accepted T, or a quorum (including self)
/// has voted-or-accepted T.
pub fn accept<V, Accepted, VotedOrAccepted>(
    self_id: &NodeId,
    self_qset: &QuorumSet,
    self_voted_or_accepted: bool,
    latest: &BTreeMap<NodeId, Envelope<V>>,
    already_accepted: Accepted,
    voted_or_accepted: VotedOrAccepted,
) -> bool
where
    V: Value,
    Accepted: Fn(&Envelope<V>) -> bool,
    VotedOrAccepted: Fn(&Envelope<V>) -> bool,
{
    let accepters: BTreeSet<NodeId> = latest
        .iter()
        .filter(|(_, env)| already_accepted(env))
        .map(|(id, _)| id.clone())
        .collect();

    if is_v_blocking(self_qset, &accepters) {
        return true;
    }

    has_quorum_satisfying(
        self_id,
        self_qset,
        self_voted_or_accepted,
        latest,
        voted_or_accepted,
    )
}

/// `confirm(T)`: a quorum (including self) has accepted T.
pub fn confirm<V, Accepted>(
    self_id: &NodeId,
    self_qset: &QuorumSet,
    self_accepted: bool,
    latest: &BTreeMap<NodeId, Envelope<V>>,
    already_accepted: Accepted,
) -> bool
where
    V: Value,
    Accepted: Fn(&Envelope<V>) -> bool,
{
    has_quorum_satisfying(self_id, self_qset, self_accepted, latest, already_accepted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scp::message::Message;
    use crate::scp::qset::QuorumSlice;
    use crate::scp::slot_id::SlotId;
    use crate::scp::value::test_value::TestValue;

    fn env_with_voted(
        sender: &str,
        qset: QuorumSet,
        voted: &[&str],
        accepted: &[&str],
    ) -> Envelope<TestValue> {
        Envelope::new(
            NodeId::new(sender),
            SlotId::new(1),
            qset,
            Message::Nominate {
                voted: voted.iter().map(|s| TestValue::new(*s)).collect(),
                accepted: accepted.iter().map(|s| TestValue::new(*s)).collect(),
            },
        )
    }

    fn sym_qset() -> QuorumSet {
        QuorumSet::new([QuorumSlice::new(["a", "b", "c"].map(NodeId::new))])
    }

    fn has_voted_or_accepted(v: &TestValue) -> impl Fn(&Envelope<TestValue>) -> bool + '_ {
        move |env: &Envelope<TestValue>| match &env.message {
            Message::Nominate { voted, accepted } => voted.contains(v) || accepted.contains(v),
            _ => false,
        }
    }

    fn has_accepted(v: &TestValue) -> impl Fn(&Envelope<TestValue>) -> bool + '_ {
        move |env: &Envelope<TestValue>| match &env.message {
            Message::Nominate { accepted, .. } => accepted.contains(v),
            _ => false,
        }
    }

    #[test]
    fn quorum_of_three_symmetric_nodes_satisfies() {
        let qset = sym_qset();
        let a = NodeId::new("a");
        let v = TestValue::new("pizza");

        let mut latest = BTreeMap::new();
        latest.insert(
            NodeId::new("b"),
            env_with_voted("b", qset.clone(), &["pizza"], &[]),
        );
        latest.insert(
            NodeId::new("c"),
            env_with_voted("c", qset.clone(), &["pizza"], &[]),
        );

        assert!(has_quorum_satisfying(
            &a,
            &qset,
            true, // self voted pizza too
            &latest,
            has_voted_or_accepted(&v)
        ));
    }

    #[test]
    fn missing_member_breaks_quorum() {
        let qset = sym_qset();
        let a = NodeId::new("a");
        let v = TestValue::new("pizza");

        let mut latest = BTreeMap::new();
        latest.insert(
            NodeId::new("b"),
            env_with_voted("b", qset.clone(), &["pizza"], &[]),
        );
        // "c" never voted.

        assert!(!has_quorum_satisfying(
            &a,
            &qset,
            true,
            &latest,
            has_voted_or_accepted(&v)
        ));
    }

    #[test]
    fn self_not_satisfying_fails_immediately() {
        let qset = sym_qset();
        let a = NodeId::new("a");
        let v = TestValue::new("pizza");
        let mut latest = BTreeMap::new();
        latest.insert(
            NodeId::new("b"),
            env_with_voted("b", qset.clone(), &["pizza"], &[]),
        );
        latest.insert(
            NodeId::new("c"),
            env_with_voted("c", qset.clone(), &["pizza"], &[]),
        );
        assert!(!has_quorum_satisfying(
            &a,
            &qset,
            false,
            &latest,
            has_voted_or_accepted(&v)
        ));
    }

    #[test]
    fn accept_via_v_blocking() {
        // self's qset is {a, b, c}; {b, c} is v-blocking for self.
        let qset = sym_qset();
        let a = NodeId::new("a");
        let v = TestValue::new("pizza");

        let mut latest = BTreeMap::new();
        latest.insert(
            NodeId::new("b"),
            env_with_voted("b", qset.clone(), &[], &["pizza"]),
        );
        latest.insert(
            NodeId::new("c"),
            env_with_voted("c", qset.clone(), &[], &["pizza"]),
        );

        assert!(accept(
            &a,
            &qset,
            false,
            &latest,
            has_accepted(&v),
            has_voted_or_accepted(&v)
        ));
    }

    #[test]
    fn confirm_requires_quorum_of_accepters() {
        let qset = sym_qset();
        let a = NodeId::new("a");
        let v = TestValue::new("pizza");

        let mut latest = BTreeMap::new();
        latest.insert(
            NodeId::new("b"),
            env_with_voted("b", qset.clone(), &[], &["pizza"]),
        );
        latest.insert(
            NodeId::new("c"),
            env_with_voted("c", qset.clone(), &[], &[]),
        );

        assert!(!confirm(&a, &qset, true, &latest, has_accepted(&v)));

        latest.insert(
            NodeId::new("c"),
            env_with_voted("c", qset.clone(), &[], &["pizza"]),
        );
        assert!(confirm(&a, &qset, true, &latest, has_accepted(&v)));
    }
}
