//! A `Slot` composes nomination and the ballot protocol over one
//! shared latest-envelope-per-sender map and drives the phase
//! progression from NOMINATE through PREPARE and COMMIT to
//! EXTERNALIZE.

use std::collections::BTreeMap;

use super::ballot::Ballot;
use super::ballot_protocol::{self, BallotState, CounterBumpAction};
use super::envelope::Envelope;
use super::error::SlotResult;
use super::message::Message;
use super::node_id::NodeId;
use super::nomination::NominationState;
use super::qset::QuorumSet;
use super::slot_id::SlotId;
use super::value::Value;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Phase {
    Nominate,
    Prepare,
    Commit,
    Externalize,
}

pub struct Slot<V: Value> {
    pub id: SlotId,
    self_id: NodeId,
    self_qset: QuorumSet,
    pub phase: Phase,
    pub nomination: NominationState<V>,
    pub ballot: BallotState<V>,
    pub latest: BTreeMap<NodeId, Envelope<V>>,
    externalized: Option<Message<V>>,
    last_outbound: Option<Message<V>>,
    malformed_dropped: u64,
}

impl<V: Value> Slot<V> {
    pub fn new(id: SlotId, self_id: NodeId, self_qset: QuorumSet) -> Self {
        Slot {
            id,
            self_id,
            self_qset,
            phase: Phase::Nominate,
            nomination: NominationState::new(),
            ballot: BallotState::new(),
            latest: BTreeMap::new(),
            externalized: None,
            last_outbound: None,
            malformed_dropped: 0,
        }
    }

    /// Number of inbound envelopes dropped for failing a per-variant
    /// invariant check ("malformed-envelope" incidents).
    pub fn malformed_dropped(&self) -> u64 {
        self.malformed_dropped
    }

    pub fn externalized_message(&self) -> Option<&Message<V>> {
        self.externalized.as_ref()
    }

    pub fn is_externalized(&self) -> bool {
        self.externalized.is_some()
    }

    /// Records an inbound envelope, retaining at most one per sender:
    /// the strongest seen, per the inter-message total order. A
    /// weaker or equal (e.g. duplicate) envelope is dropped without
    /// changing state.
    pub fn handle_envelope(&mut self, env: Envelope<V>) -> SlotResult<Option<Envelope<V>>> {
        if let Err(e) = env.message.validate() {
            log::warn!("slot {}: dropping malformed envelope from {}: {e}", self.id, env.sender);
            self.malformed_dropped += 1;
            return Ok(None);
        }

        let stronger = match self.latest.get(&env.sender) {
            Some(prev) => env.message > prev.message,
            None => true,
        };
        if stronger {
            self.latest.insert(env.sender.clone(), env);
        }
        self.run()
    }

    /// Casts a nomination vote for `value`. Starts round 1 first if
    /// nomination hasn't started yet, so a slot doesn't sit idle
    /// until its first round-timeout fires; the vote itself is still
    /// a no-op unless the local node leads the resulting round.
    pub fn nominate(&mut self, value: V, prev_value_bytes: &[u8]) -> SlotResult<Option<Envelope<V>>> {
        if !self.nomination.nomination_started {
            self.nomination
                .start_round(self.id, &self.self_id, &self.self_qset, prev_value_bytes);
        }
        self.nomination.vote(&self.self_id, value);
        self.run()
    }

    /// Nomination round timer expired: bump the round and recompute
    /// leaders. A no-op once the ballot protocol has started, since
    /// nomination keeps contributing evidence but no longer drives
    /// new rounds.
    pub fn handle_round_timeout(&mut self, prev_value_bytes: &[u8]) -> SlotResult<Option<Envelope<V>>> {
        self.nomination
            .start_round(self.id, &self.self_id, &self.self_qset, prev_value_bytes);
        self.run()
    }

    /// Counter-bump timer expired: increments `B.N` by one.
    pub fn handle_counter_timeout(&mut self) -> SlotResult<Option<Envelope<V>>> {
        self.ballot.bump_counter_on_timeout();
        self.run()
    }

    /// Whether the counter-bump timer should fire immediately, be
    /// armed, or stay idle, given the current evidence.
    pub fn counter_bump_action(&self) -> CounterBumpAction {
        ballot_protocol::check_counter_bump(&self.ballot, &self.self_id, &self.self_qset, &self.latest)
    }

    fn run(&mut self) -> SlotResult<Option<Envelope<V>>> {
        if self.phase == Phase::Externalize {
            return Ok(None);
        }

        let candidates_grew = self
            .nomination
            .update(&self.self_id, &self.self_qset, &self.latest);
        if candidates_grew && self.ballot.b.is_bottom() {
            if let Some(z) = self.nomination.composite_value(self.id) {
                self.ballot.start_with_value(z);
                self.phase = Phase::Prepare;
            }
        }

        if !self.ballot.b.is_bottom() {
            let bump = self.counter_bump_action();
            self.ballot.apply_counter_bump(&bump);

            let step = self.ballot.advance(&self.self_id, &self.self_qset, &self.latest);
            if let Some((value, lo, hi)) = step.externalize {
                self.phase = Phase::Externalize;
                let msg = Message::Externalize {
                    c: Ballot::new(lo, value),
                    hn: hi,
                };
                self.externalized = Some(msg.clone());
                return Ok(self.emit(msg));
            }
            if self.ballot.c.is_some() && self.phase == Phase::Prepare {
                self.phase = Phase::Commit;
            }
        }

        let msg = if !self.ballot.b.is_bottom() {
            self.ballot.to_message()
        } else {
            self.nomination.to_message()
        };
        Ok(self.emit(msg))
    }

    /// Emits `message` as a new outbound envelope only if it's
    /// strictly stronger than the last one emitted; "nothing to say"
    /// is a valid outcome of every step.
    fn emit(&mut self, message: Message<V>) -> Option<Envelope<V>> {
        let stronger = match &self.last_outbound {
            None => true,
            Some(prev) => message > *prev,
        };
        if !stronger {
            return None;
        }
        self.last_outbound = Some(message.clone());
        Some(Envelope::new(
            self.self_id.clone(),
            self.id,
            self.self_qset.clone(),
            message,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scp::qset::QuorumSlice;
    use crate::scp::value::test_value::TestValue;

    fn qset(members: &[&str]) -> QuorumSet {
        QuorumSet::new([QuorumSlice::new(members.iter().map(|s| NodeId::new(*s)))])
    }

    #[test]
    fn single_node_externalizes_its_own_vote() {
        let id = NodeId::new("a");
        let q = qset(&["a"]);
        let mut slot = Slot::<TestValue>::new(SlotId::new(1), id.clone(), q);

        let env = slot.nominate(TestValue::new("pizza"), &[]).unwrap();
        // "a" is vacuously its own quorum and leader, so a single
        // round should be enough to confirm and start the ballot.
        assert!(env.is_some());

        // Feed the node's own envelope back as if received (a single
        // member satisfies its own quorum slice).
        let mut current = env;
        for _ in 0..8 {
            let Some(e) = current.take() else { break };
            current = slot.handle_envelope(e).unwrap();
            if slot.is_externalized() {
                break;
            }
        }
        assert!(slot.is_externalized());
        match slot.externalized_message().unwrap() {
            Message::Externalize { c, .. } => assert_eq!(c.value(), Some(&TestValue::new("pizza"))),
            other => panic!("expected externalize, got {other:?}"),
        }
    }

    #[test]
    fn phase_never_regresses() {
        let id = NodeId::new("a");
        let q = qset(&["a"]);
        let mut slot = Slot::<TestValue>::new(SlotId::new(1), id, q);
        assert_eq!(slot.phase, Phase::Nominate);
        let mut current = slot.nominate(TestValue::new("tacos"), &[]).unwrap();
        let mut last_phase = slot.phase;
        for _ in 0..8 {
            let Some(e) = current.take() else { break };
            current = slot.handle_envelope(e).unwrap();
            assert!(slot.phase >= last_phase);
            last_phase = slot.phase;
            if slot.is_externalized() {
                break;
            }
        }
    }

    #[test]
    fn duplicate_envelope_is_a_no_op() {
        let id = NodeId::new("a");
        let q = qset(&["a", "b", "c"]);
        let mut slot = Slot::<TestValue>::new(SlotId::new(1), id, q.clone());

        let env_from_b = Envelope::new(
            NodeId::new("b"),
            SlotId::new(1),
            q.clone(),
            Message::Nominate {
                voted: [TestValue::new("pizza")].into_iter().collect(),
                accepted: Default::default(),
            },
        );

        let _ = slot.handle_envelope(env_from_b.clone()).unwrap();
        let accepted_after_first = slot.nomination.accepted.clone();
        let last_outbound_after_first = slot.last_outbound.clone();
        let second = slot.handle_envelope(env_from_b).unwrap();
        assert_eq!(slot.nomination.accepted, accepted_after_first);
        assert_eq!(slot.last_outbound, last_outbound_after_first);
        assert!(second.is_none());
    }

    #[test]
    fn malformed_prepare_is_dropped_silently() {
        let id = NodeId::new("a");
        let q = qset(&["a", "b", "c"]);
        let mut slot = Slot::<TestValue>::new(SlotId::new(1), id, q.clone());

        // PP.X == P.X violates the PREPARE invariant that PP and P carry
        // distinct values.
        let same_value = Ballot::new(1, TestValue::new("x"));
        let bad = Envelope::new(
            NodeId::new("b"),
            SlotId::new(1),
            q,
            Message::Prepare {
                b: Ballot::new(2, TestValue::new("x")),
                p: Some(Ballot::new(2, TestValue::new("x"))),
                pp: Some(same_value),
                hn: 0,
                cn: 0,
            },
        );

        let reply = slot.handle_envelope(bad).unwrap();
        assert!(reply.is_none());
        assert!(slot.latest.is_empty());
        assert_eq!(slot.malformed_dropped(), 1);
    }
}
