//! Shared scaffolding for the integration tests: a minimal `Value`
//! impl and a synchronous envelope-flooding driver standing in for
//! the real `tokio`-timer-driven dispatch loop (`src/bin/lunch.rs`)
//! so these tests stay deterministic without sleeping on real timers.

use std::collections::{BTreeMap, VecDeque};

use federated_scp::scp::envelope::Envelope;
use federated_scp::scp::node_id::NodeId;
use federated_scp::scp::qset::{QuorumSet, QuorumSlice};
use federated_scp::scp::slot::Slot;
use federated_scp::scp::slot_id::SlotId;
use federated_scp::scp::value::{combine_by_parity, Value};

#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct Food(pub String);

impl Food {
    pub fn new(s: impl Into<String>) -> Self {
        Food(s.into())
    }
}

impl Value for Food {
    fn combine(&self, other: &Self, slot: SlotId) -> Self {
        combine_by_parity(self, other, slot)
    }

    fn is_nil(&self) -> bool {
        self.0.is_empty()
    }

    fn to_bytes(&self) -> Vec<u8> {
        self.0.as_bytes().to_vec()
    }
}

pub fn qset(members: &[&str]) -> QuorumSet {
    QuorumSet::new([QuorumSlice::new(members.iter().map(|s| NodeId::new(*s)))])
}

/// A quorum set with one slice per `&[&str]` group, e.g.
/// `qset_slices(&[&["a","b","c"], &["b","c","d"]])`.
pub fn qset_slices(slices: &[&[&str]]) -> QuorumSet {
    QuorumSet::new(
        slices
            .iter()
            .map(|members| QuorumSlice::new(members.iter().map(|s| NodeId::new(*s)))),
    )
}

/// Floods `seed` through every slot not its sender, feeding replies
/// back into the queue until it drains or `max_steps` envelopes have
/// been delivered (a safety valve against a test hanging forever if a
/// scenario can't converge).
pub fn flood(slots: &mut BTreeMap<NodeId, Slot<Food>>, seed: Vec<Envelope<Food>>, max_steps: usize) {
    let mut queue: VecDeque<Envelope<Food>> = seed.into();
    let mut steps = 0;
    while let Some(env) = queue.pop_front() {
        steps += 1;
        if steps > max_steps {
            break;
        }
        let recipients: Vec<NodeId> = slots.keys().filter(|id| **id != env.sender).cloned().collect();
        for id in recipients {
            let slot = slots.get_mut(&id).unwrap();
            if let Some(reply) = slot.handle_envelope(env.clone()).unwrap() {
                queue.push_back(reply);
            }
        }
    }
}

/// Forces `value` directly into `slot`'s nomination vote set,
/// bypassing the leader gate, and re-runs the slot so the forced vote
/// is reflected in its outbound message, simulating "this node
/// nominates `value`" for a federation where natural leader election
/// would otherwise only let one member vote per round.
pub fn force_nominate(slot: &mut Slot<Food>, value: Food) -> Option<Envelope<Food>> {
    let _ = slot.nominate(value.clone(), &[]);
    slot.nomination.voted.insert(value.clone());
    slot.nominate(value, &[]).unwrap()
}

/// Like `flood`, but every envelope sent by `delayed` is requeued
/// `delay_rounds` times before actually being delivered, simulating a
/// peer whose outbound messages lag behind everyone else's.
pub fn flood_with_delay(
    slots: &mut BTreeMap<NodeId, Slot<Food>>,
    seed: Vec<Envelope<Food>>,
    delayed: &NodeId,
    delay_rounds: usize,
    max_steps: usize,
) {
    let mut queue: VecDeque<(usize, Envelope<Food>)> = seed.into_iter().map(|e| (0, e)).collect();
    let mut steps = 0;
    while let Some((wait, env)) = queue.pop_front() {
        steps += 1;
        if steps > max_steps {
            break;
        }
        if env.sender == *delayed && wait < delay_rounds {
            queue.push_back((wait + 1, env));
            continue;
        }
        let recipients: Vec<NodeId> = slots.keys().filter(|id| **id != env.sender).cloned().collect();
        for id in recipients {
            let slot = slots.get_mut(&id).unwrap();
            if let Some(reply) = slot.handle_envelope(env.clone()).unwrap() {
                queue.push_back((0, reply));
            }
        }
    }
}

pub fn all_externalized(slots: &BTreeMap<NodeId, Slot<Food>>) -> bool {
    slots.values().all(|s| s.is_externalized())
}

pub fn externalized_value(slot: &Slot<Food>) -> Food {
    match slot.externalized_message().unwrap() {
        federated_scp::scp::message::Message::Externalize { c, .. } => c.value().unwrap().clone(),
        other => panic!("expected externalize, got {other:?}"),
    }
}
