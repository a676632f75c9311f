//! `Node<V>`: the per-process dispatcher owning every pending slot and
//! the cache of externalized results. Grounded almost one-to-one on
//! Go `node.go`'s `Node`/`Handle`/`G`/`Weight`/`Neighbors`/`Priority`/
//! `Peers`, and on the single-mutex-per-aggregate discipline of
//! `local_node::HLocalNode = Arc<Mutex<LocalNode>>`.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use super::ballot_protocol::CounterBumpAction;
use super::envelope::Envelope;
use super::error::{NodeError, NodeResult, PriorityResult, SlotError};
use super::message::Message;
use super::node_id::NodeId;
use super::priority;
use super::qset::QuorumSet;
use super::slot::Slot;
use super::slot_id::SlotId;
use super::timers::{COUNTER_BUMP_TIMEOUT, ROUND_TIMEOUT_BASE};
use super::value::Value;

struct NodeState<V: Value> {
    pending: BTreeMap<SlotId, Slot<V>>,
    externalized: BTreeMap<SlotId, Message<V>>,
}

/// A single node's view of the federation: its own identity and
/// quorum set, every slot currently in progress, and a cache of
/// externalized results so a repeated or late-arriving envelope for
/// an already-decided slot gets an EXTERNALIZE reply instead of
/// silently restarting that slot.
pub struct Node<V: Value> {
    pub id: NodeId,
    pub qset: QuorumSet,
    state: Mutex<NodeState<V>>,
    handle_calls: AtomicU64,
    handle_time_nanos: AtomicU64,
    round_timeout_base: Duration,
    counter_timeout: Duration,
}

impl<V: Value> Node<V> {
    pub fn new(id: NodeId, qset: QuorumSet) -> Self {
        Node {
            id,
            qset,
            state: Mutex::new(NodeState {
                pending: BTreeMap::new(),
                externalized: BTreeMap::new(),
            }),
            handle_calls: AtomicU64::new(0),
            handle_time_nanos: AtomicU64::new(0),
            round_timeout_base: ROUND_TIMEOUT_BASE,
            counter_timeout: COUNTER_BUMP_TIMEOUT,
        }
    }

    /// Same as `new`, but with overridable timer durations. Tests
    /// that don't want to wait on real timers use this with very
    /// short durations; `Slot` itself never consults these, only the
    /// timer-spawning caller does (`round_timeout_base`/
    /// `counter_timeout` accessors below).
    pub fn with_timeouts(id: NodeId, qset: QuorumSet, round_timeout_base: Duration, counter_timeout: Duration) -> Self {
        Node {
            round_timeout_base,
            counter_timeout,
            ..Self::new(id, qset)
        }
    }

    pub fn round_timeout_base(&self) -> Duration {
        self.round_timeout_base
    }

    pub fn counter_timeout(&self) -> Duration {
        self.counter_timeout
    }

    /// The flattened, deduplicated list of peer IDs named in this
    /// node's quorum set, excluding its own ID (Go `node.go`'s
    /// `Peers`).
    pub fn peers(&self) -> BTreeSet<NodeId> {
        let mut members = self.qset.flattened_members();
        members.remove(&self.id);
        members
    }

    /// The cached EXTERNALIZE message for `slot_id`, if this node has
    /// already decided it.
    pub fn ext(&self, slot_id: SlotId) -> Option<Message<V>> {
        self.state.lock().unwrap().externalized.get(&slot_id).cloned()
    }

    pub fn handle_calls(&self) -> u64 {
        self.handle_calls.load(Ordering::Relaxed)
    }

    pub fn handle_time_nanos(&self) -> u64 {
        self.handle_time_nanos.load(Ordering::Relaxed)
    }

    /// Casts a nomination vote for `value` in `slot_id`, creating the
    /// slot if this is the first activity seen for it.
    pub fn nominate(&self, slot_id: SlotId, value: V) -> NodeResult<Option<Envelope<V>>> {
        let prev = self
            .prev_value_bytes(slot_id)
            .map_err(|e| NodeError::from(SlotError::from(e)))?;
        self.timed(|state| {
            if state.externalized.contains_key(&slot_id) {
                return Ok(None);
            }
            let slot = state
                .pending
                .entry(slot_id)
                .or_insert_with(|| Slot::new(slot_id, self.id.clone(), self.qset.clone()));
            let outbound = slot.nominate(value, &prev)?;
            Ok(self.finish_slot(state, slot_id, outbound))
        })
    }

    /// Processes one inbound envelope: replies with the cached
    /// EXTERNALIZE if the slot is already decided, otherwise feeds it
    /// to the (possibly newly-created) pending slot.
    pub fn handle(&self, env: Envelope<V>) -> NodeResult<Option<Envelope<V>>> {
        self.timed(|state| {
            let slot_id = env.slot;
            if let Some(msg) = state.externalized.get(&slot_id) {
                if !env.message.is_externalize() {
                    log::debug!("slot {slot_id} already externalized, replying in kind");
                    return Ok(Some(Envelope::new(
                        self.id.clone(),
                        slot_id,
                        self.qset.clone(),
                        msg.clone(),
                    )));
                }
                return Ok(None);
            }

            let slot = state
                .pending
                .entry(slot_id)
                .or_insert_with(|| Slot::new(slot_id, self.id.clone(), self.qset.clone()));
            let outbound = slot.handle_envelope(env)?;
            Ok(self.finish_slot(state, slot_id, outbound))
        })
    }

    /// Round-deadline timer expired for `(slot_id, round)`. Ignored if
    /// stale (the slot's nomination round has since moved on, or the
    /// slot already externalized).
    pub fn handle_round_timeout(&self, slot_id: SlotId, round: u32) -> NodeResult<Option<Envelope<V>>> {
        let prev = self
            .prev_value_bytes(slot_id)
            .map_err(|e| NodeError::from(SlotError::from(e)))?;
        self.timed(|state| {
            let Some(slot) = state.pending.get_mut(&slot_id) else {
                return Ok(None);
            };
            if slot.nomination.round != round {
                return Ok(None);
            }
            let outbound = slot.handle_round_timeout(&prev)?;
            Ok(self.finish_slot(state, slot_id, outbound))
        })
    }

    /// Counter-bump timer expired for `(slot_id, counter)`. Ignored if
    /// stale (the ballot counter has since moved past `counter`).
    pub fn handle_counter_timeout(&self, slot_id: SlotId, counter: u32) -> NodeResult<Option<Envelope<V>>> {
        self.timed(|state| {
            let Some(slot) = state.pending.get_mut(&slot_id) else {
                return Ok(None);
            };
            if slot.ballot.b.n != counter {
                return Ok(None);
            }
            let outbound = slot.handle_counter_timeout()?;
            Ok(self.finish_slot(state, slot_id, outbound))
        })
    }

    /// Moves a slot that just externalized into the `externalized`
    /// cache and drops its `Slot`; returns the outbound envelope
    /// (if any) unchanged either way.
    fn finish_slot(
        &self,
        state: &mut NodeState<V>,
        slot_id: SlotId,
        outbound: Option<Envelope<V>>,
    ) -> Option<Envelope<V>> {
        if let Some(slot) = state.pending.get(&slot_id) {
            if slot.is_externalized() {
                let msg = slot.externalized_message().unwrap().clone();
                log::info!("slot {slot_id} externalized");
                state.externalized.insert(slot_id, msg);
                state.pending.remove(&slot_id);
            }
        }
        outbound
    }

    fn timed<F>(&self, f: F) -> NodeResult<Option<Envelope<V>>>
    where
        F: FnOnce(&mut NodeState<V>) -> NodeResult<Option<Envelope<V>>>,
    {
        let start = Instant::now();
        self.handle_calls.fetch_add(1, Ordering::Relaxed);
        let mut state = self.state.lock().unwrap();
        let result = f(&mut state);
        drop(state);
        self.handle_time_nanos
            .fetch_add(start.elapsed().as_nanos() as u64, Ordering::Relaxed);
        result
    }

    fn prev_value_bytes(&self, slot: SlotId) -> PriorityResult<Vec<u8>> {
        let prev_value: Option<V> = {
            let state = self.state.lock().unwrap();
            slot.prev()
                .and_then(|p| state.externalized.get(&p))
                .and_then(|m| match m {
                    Message::Externalize { c, .. } => c.value().cloned(),
                    _ => None,
                })
        };
        priority::resolve_prev_value_bytes(slot, prev_value.as_ref())
    }

    /// The nomination round currently in flight for `slot_id`, if the
    /// slot is still pending. A host driving timers externally uses
    /// this to schedule the next round-deadline, and to tell whether
    /// a previously-armed timer is still live.
    pub fn nomination_round(&self, slot_id: SlotId) -> Option<u32> {
        let state = self.state.lock().unwrap();
        state.pending.get(&slot_id).map(|slot| slot.nomination.round)
    }

    /// Whether `slot_id`'s counter-bump timer should be (re)armed, and
    /// for which counter, if the slot is still pending.
    pub fn counter_bump_action(&self, slot_id: SlotId) -> Option<CounterBumpAction> {
        let state = self.state.lock().unwrap();
        state.pending.get(&slot_id).map(|slot| slot.counter_bump_action())
    }

    /// The ballot protocol's current counter `B.N` for `slot_id`, if
    /// the slot is still pending.
    pub fn ballot_counter(&self, slot_id: SlotId) -> Option<u32> {
        let state = self.state.lock().unwrap();
        state.pending.get(&slot_id).map(|slot| slot.ballot.b.n)
    }

    pub fn weight(&self, id: &NodeId) -> f64 {
        self.qset.weight(&self.id, id)
    }

    pub fn neighbors(&self, slot: SlotId, round: u32) -> PriorityResult<BTreeSet<NodeId>> {
        let prev = self.prev_value_bytes(slot)?;
        Ok(priority::neighbors(slot, round, &self.id, &self.qset, &prev))
    }

    pub fn priority(&self, slot: SlotId, round: u32, id: &NodeId) -> PriorityResult<[u8; 32]> {
        let prev = self.prev_value_bytes(slot)?;
        Ok(priority::priority(slot, round, id, &prev))
    }
}
