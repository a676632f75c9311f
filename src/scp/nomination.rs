//! Nomination: produces a non-empty candidate set `Z` on which the
//! ballot protocol can converge.

use std::collections::{BTreeMap, BTreeSet};

use super::envelope::Envelope;
use super::federated_vote;
use super::message::Message;
use super::node_id::NodeId;
use super::priority;
use super::qset::QuorumSet;
use super::slot_id::SlotId;
use super::value::{combine_all, Value};

#[derive(Clone, Debug)]
pub struct NominationState<V: Value> {
    pub round: u32,
    pub voted: BTreeSet<V>,
    pub accepted: BTreeSet<V>,
    pub candidates: BTreeSet<V>,
    pub round_leaders: BTreeSet<NodeId>,
    /// This round's neighbor set: a superset of `round_leaders` used
    /// to gate which senders' votes get echoed into our own (the
    /// `Neighbors` function, distinct from the max-priority subset
    /// that may introduce brand-new values).
    pub neighbors: BTreeSet<NodeId>,
    pub nomination_started: bool,
    /// The value this node last asked to nominate, kept so a later
    /// round can retry the vote once this node becomes a leader;
    /// `vote` itself only takes effect in a round this node leads.
    pending_value: Option<V>,
}

impl<V: Value> Default for NominationState<V> {
    fn default() -> Self {
        NominationState {
            round: 0,
            voted: BTreeSet::new(),
            accepted: BTreeSet::new(),
            candidates: BTreeSet::new(),
            round_leaders: BTreeSet::new(),
            neighbors: BTreeSet::new(),
            nomination_started: false,
            pending_value: None,
        }
    }
}

impl<V: Value> NominationState<V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts (or restarts, on round timeout) a nomination round:
    /// bumps `round`, recomputes the leader set via `Neighbors`/
    /// `Priority`.
    pub fn start_round(
        &mut self,
        slot: SlotId,
        self_id: &NodeId,
        self_qset: &QuorumSet,
        prev_value_bytes: &[u8],
    ) {
        self.round += 1;
        self.nomination_started = true;
        self.round_leaders = priority::leader_set(slot, self.round, self_id, self_qset, prev_value_bytes);
        self.neighbors = priority::neighbors(slot, self.round, self_id, self_qset, prev_value_bytes);

        // Retry our own candidate now that the leader set has changed.
        // A node that wasn't a leader in an earlier round would
        // otherwise never get to vote for the value it was asked to
        // nominate.
        if let Some(value) = self.pending_value.clone() {
            self.vote(self_id, value);
        }
    }

    pub fn is_leader(&self, id: &NodeId) -> bool {
        self.round_leaders.contains(id)
    }

    /// Leader-only: vote for a new value by inserting it into `voted`.
    /// No-op (returns `false`) if the local node isn't a leader this
    /// round, or the value is already voted/accepted. Remembers
    /// `value` regardless, so a later round can retry it.
    pub fn vote(&mut self, self_id: &NodeId, value: V) -> bool {
        self.pending_value = Some(value.clone());
        if !self.is_leader(self_id) {
            return false;
        }
        if self.accepted.contains(&value) {
            return false;
        }
        self.voted.insert(value)
    }

    /// Applies the per-envelope nomination update: moves values from
    /// `voted` to `accepted` once accepted, and into `candidates` once
    /// confirmed. Returns `true` if `candidates` grew.
    pub fn update(
        &mut self,
        self_id: &NodeId,
        self_qset: &QuorumSet,
        latest: &BTreeMap<NodeId, Envelope<V>>,
    ) -> bool {
        let mut universe: BTreeSet<V> =
            self.voted.iter().chain(self.accepted.iter()).cloned().collect();
        for env in latest.values() {
            if let Message::Nominate { voted, accepted } = &env.message {
                universe.extend(voted.iter().cloned());
                universe.extend(accepted.iter().cloned());
            }
        }

        // Echo this round's neighbors: a node only ever votes for
        // values it was itself asked to nominate, so without this it
        // could never satisfy "self voted-or-accepted" for a value
        // someone else proposed, and nomination would stall as soon
        // as it isn't its own round's leader. Gating on `neighbors`
        // rather than the narrower `round_leaders` is deliberate:
        // leadership decides who may introduce a brand-new value, not
        // who a node is willing to corroborate.
        for env in latest.values() {
            if !self.neighbors.contains(&env.sender) {
                continue;
            }
            if let Message::Nominate { voted, accepted } = &env.message {
                for v in voted.iter().chain(accepted.iter()) {
                    if !self.voted.contains(v) && !self.accepted.contains(v) {
                        self.voted.insert(v.clone());
                    }
                }
            }
        }

        let mut candidates_grew = false;

        for v in universe.iter() {
            if self.accepted.contains(v) {
                continue;
            }
            let self_voted_or_accepted = self.voted.contains(v) || self.accepted.contains(v);
            let accepted_now = federated_vote::accept(
                self_id,
                self_qset,
                self_voted_or_accepted,
                latest,
                |env| nominate_has_accepted(env, v),
                |env| nominate_has_voted_or_accepted(env, v),
            );
            if accepted_now {
                self.voted.remove(v);
                self.accepted.insert(v.clone());
            }
        }

        for v in self.accepted.clone().iter() {
            if self.candidates.contains(v) {
                continue;
            }
            let confirmed_now = federated_vote::confirm(
                self_id,
                self_qset,
                true, // self already accepted v (loop invariant above)
                latest,
                |env| nominate_has_accepted(env, v),
            );
            if confirmed_now {
                self.candidates.insert(v.clone());
                candidates_grew = true;
            }
        }

        candidates_grew
    }

    /// Folds `combine` over `candidates` in sorted order
    /// (`combine-all`). `None` while `candidates` is empty.
    pub fn composite_value(&self, slot: SlotId) -> Option<V> {
        combine_all(self.candidates.iter().cloned(), slot)
    }

    /// The outbound `NOM` message reflecting this node's current
    /// voted/accepted sets.
    pub fn to_message(&self) -> Message<V> {
        Message::Nominate {
            voted: self.voted.clone(),
            accepted: self.accepted.clone(),
        }
    }
}

fn nominate_has_accepted<V: Value>(env: &Envelope<V>, v: &V) -> bool {
    match &env.message {
        Message::Nominate { accepted, .. } => accepted.contains(v),
        _ => false,
    }
}

fn nominate_has_voted_or_accepted<V: Value>(env: &Envelope<V>, v: &V) -> bool {
    match &env.message {
        Message::Nominate { voted, accepted } => voted.contains(v) || accepted.contains(v),
        _ => false,
    }
}
