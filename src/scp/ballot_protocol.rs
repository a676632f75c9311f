//! PREPARE -> COMMIT -> EXTERNALIZE ballot protocol.

use std::collections::{BTreeMap, BTreeSet};

use super::ballot::Ballot;
use super::envelope::Envelope;
use super::federated_vote;
use super::message::Message;
use super::node_id::NodeId;
use super::qset::QuorumSet;
use super::value::Value;

/// `B` (current), `P` > `PP` (two highest accepted-prepared ballots
/// with disjoint values), `H` (highest confirmed-prepared, same value
/// as `B`), `C` (lowest ballot of the active commit range).
#[derive(Clone, Debug)]
pub struct BallotState<V: Value> {
    pub b: Ballot<V>,
    pub p: Option<Ballot<V>>,
    pub pp: Option<Ballot<V>>,
    pub h: Option<Ballot<V>>,
    pub c: Option<Ballot<V>>,
}

impl<V: Value> Default for BallotState<V> {
    fn default() -> Self {
        BallotState {
            b: Ballot::bottom(),
            p: None,
            pp: None,
            h: None,
            c: None,
        }
    }
}

/// Outcome of one round of `advance`: whether anything changed, and
/// an externalize candidate if commit was just confirmed by quorum.
pub struct BallotStepResult<V: Value> {
    pub changed: bool,
    pub externalize: Option<(V, u32, u32)>,
}

/// Result of the counter-bump timer check.
#[derive(Debug, PartialEq, Eq)]
pub enum CounterBumpAction {
    None,
    /// A v-blocking set of senders all reported counters above `B.N`;
    /// bump immediately to the smallest such counter.
    ImmediateBump(u32),
    /// A quorum (including self) has counters `>= B.N`; arm the
    /// counter-bump timer. On expiry, increment `B.N` by one.
    ArmTimer,
}

impl<V: Value> BallotState<V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets `B = (1, value)` the first time a value becomes available
    /// (nomination produced a non-empty composite), if the ballot
    /// protocol hasn't started yet.
    pub fn start_with_value(&mut self, value: V) -> bool {
        if self.b.is_bottom() {
            self.b = Ballot::new(1, value);
            true
        } else {
            false
        }
    }

    pub fn to_message(&self) -> Message<V> {
        if let Some(c) = &self.c {
            Message::Commit {
                b: self.b.clone(),
                pn: self.p.as_ref().map(|p| p.n).unwrap_or(0),
                hn: self.h.as_ref().map(|h| h.n).unwrap_or(0),
                cn: c.n,
            }
        } else {
            Message::Prepare {
                b: self.b.clone(),
                p: self.p.clone(),
                pp: self.pp.clone(),
                hn: self.h.as_ref().map(|h| h.n).unwrap_or(0),
                cn: 0,
            }
        }
    }

    /// Runs one round of the ballot protocol's five-step update
    /// against the slot's latest-per-sender envelope map.
    pub fn advance(
        &mut self,
        self_id: &NodeId,
        self_qset: &QuorumSet,
        latest: &BTreeMap<NodeId, Envelope<V>>,
    ) -> BallotStepResult<V> {
        let mut changed = false;

        // Step 1: newly accepted-prepared ballots.
        let candidates = prepare_candidates(self, latest);
        let mut newly_accepted = BTreeSet::new();
        for candidate in &candidates {
            let self_voted_or_accepted = self_votes_or_accepts_prepared(self, candidate);
            let accepted_now = federated_vote::accept(
                self_id,
                self_qset,
                self_voted_or_accepted,
                latest,
                |env| env_accepts_prepared(env, candidate),
                |env| env_votes_or_accepts_prepared(env, candidate),
            );
            if accepted_now {
                newly_accepted.insert(candidate.clone());
            }
        }
        if self.update_prepared(newly_accepted) {
            changed = true;
        }

        // Step 2: newly confirmed-prepared ballots bump H (and C, the
        // first time H is set).
        for candidate in &candidates {
            if candidate.value() != self.b.value() {
                continue;
            }
            let already_above_h = self
                .h
                .as_ref()
                .map(|h| candidate.n <= h.n)
                .unwrap_or(false);
            if already_above_h {
                continue;
            }
            let self_accepted = self_already_accepts_prepared(self, candidate);
            let confirmed_now = federated_vote::confirm(self_id, self_qset, self_accepted, latest, |env| {
                env_accepts_prepared(env, candidate)
            });
            if confirmed_now {
                let is_new_max = self.h.as_ref().map(|h| candidate > h).unwrap_or(true);
                if is_new_max {
                    self.h = Some(candidate.clone());
                    if self.c.is_none() {
                        self.c = Some(Ballot::new(1, candidate.value().unwrap().clone()));
                    }
                    changed = true;
                }
            }
        }

        // Step 3: update B if P or H outrun it.
        let p_outruns_b = self.p.as_ref().map(|p| *p > self.b).unwrap_or(false);
        let h_outruns_b_counter = self.h.as_ref().map(|h| h.n > self.b.n).unwrap_or(false);
        if p_outruns_b || (h_outruns_b_counter && self.c.is_none()) {
            let new_n = self
                .b
                .n
                .max(self.p.as_ref().map(|p| p.n).unwrap_or(0));
            let new_value = if let Some(h) = &self.h {
                h.value().unwrap().clone()
            } else if let Some(p) = &self.p {
                p.value().unwrap().clone()
            } else {
                self.b.value().unwrap().clone()
            };
            let candidate_b = Ballot::new(new_n, new_value);
            if candidate_b != self.b {
                self.b = candidate_b;
                changed = true;
            }
        }

        // Step 4/5: federated voting for commit; emit EXT if confirmed.
        if let (Some(c), Some(h)) = (self.c.clone(), self.h.clone()) {
            let value = c.value().unwrap().clone();
            let range = (c.n, h.n);

            let self_voted_committed = true; // our own C..H range is our vote
            let confirmed_committed = federated_vote::confirm(
                self_id,
                self_qset,
                self_voted_committed,
                latest,
                |env| env_already_accepted_committed(env, &value, range),
            );
            if confirmed_committed {
                return BallotStepResult {
                    changed: true,
                    externalize: Some((value, range.0, range.1)),
                };
            }
        }

        BallotStepResult {
            changed,
            externalize: None,
        }
    }

    /// Applies the counter-bump timer check and, for `ArmTimer`, does
    /// nothing yet (the caller schedules the timer); for
    /// `ImmediateBump`, bumps `B.N` right away. Returns whether `B`
    /// changed.
    pub fn apply_counter_bump(&mut self, action: &CounterBumpAction) -> bool {
        match action {
            CounterBumpAction::ImmediateBump(n) if *n > self.b.n => {
                self.b.n = *n;
                true
            }
            _ => false,
        }
    }

    /// Called on counter-bump timer expiry: increments `B.N` by one.
    pub fn bump_counter_on_timeout(&mut self) {
        self.b.n += 1;
    }

    /// Maintains the `P > PP`, `P.X != PP.X` invariant while folding in
    /// newly accepted-prepared ballots. Returns whether `P`/`PP`
    /// changed.
    fn update_prepared(&mut self, newly_accepted: BTreeSet<Ballot<V>>) -> bool {
        let mut changed = false;
        for candidate in newly_accepted {
            match &self.p {
                None => {
                    self.p = Some(candidate);
                    changed = true;
                }
                Some(p) if p.value() == candidate.value() => {
                    if candidate > *p {
                        self.p = Some(candidate);
                        changed = true;
                    }
                }
                Some(p) => {
                    // distinct value
                    if candidate > *p {
                        let old_p = self.p.replace(candidate).unwrap();
                        self.pp = Some(old_p);
                        changed = true;
                    } else if self.pp.as_ref().map(|pp| candidate > *pp).unwrap_or(true) {
                        self.pp = Some(candidate);
                        changed = true;
                    }
                }
            }
        }
        changed
    }
}

/// Counter-bump timer check: decides whether a v-blocking set of
/// higher counters forces an immediate bump, or a quorum at or above
/// the current counter arms the timer instead.
pub fn check_counter_bump<V: Value>(
    state: &BallotState<V>,
    self_id: &NodeId,
    self_qset: &QuorumSet,
    latest: &BTreeMap<NodeId, Envelope<V>>,
) -> CounterBumpAction {
    let above: BTreeSet<NodeId> = latest
        .iter()
        .filter(|(_, env)| env.message.counter() > state.b.n)
        .map(|(id, _)| id.clone())
        .collect();

    if federated_vote::is_v_blocking(self_qset, &above) {
        if let Some(min) = latest
            .iter()
            .filter(|(id, _)| above.contains(id))
            .map(|(_, env)| env.message.counter())
            .min()
        {
            return CounterBumpAction::ImmediateBump(min);
        }
    }

    let reached: bool = federated_vote::has_quorum_satisfying(
        self_id,
        self_qset,
        true,
        latest,
        |env| env.message.counter() >= state.b.n,
    );
    if reached {
        return CounterBumpAction::ArmTimer;
    }

    CounterBumpAction::None
}

fn prepare_candidates<V: Value>(
    state: &BallotState<V>,
    latest: &BTreeMap<NodeId, Envelope<V>>,
) -> BTreeSet<Ballot<V>> {
    let mut candidates = BTreeSet::new();
    if !state.b.is_bottom() {
        candidates.insert(state.b.clone());
    }
    if let Some(p) = &state.p {
        candidates.insert(p.clone());
    }
    if let Some(pp) = &state.pp {
        candidates.insert(pp.clone());
    }
    for env in latest.values() {
        match &env.message {
            Message::Prepare { b, p, pp, .. } => {
                candidates.insert(b.clone());
                if let Some(p) = p {
                    candidates.insert(p.clone());
                }
                if let Some(pp) = pp {
                    candidates.insert(pp.clone());
                }
            }
            Message::Commit { b, pn, .. } => {
                if let Some(x) = b.value() {
                    candidates.insert(Ballot::new(*pn, x.clone()));
                }
            }
            Message::Externalize { c, .. } => {
                candidates.insert(c.clone());
            }
            Message::Nominate { .. } => {}
        }
    }
    candidates
}

fn self_votes_or_accepts_prepared<V: Value>(state: &BallotState<V>, candidate: &Ballot<V>) -> bool {
    let Some(x) = candidate.value() else {
        return false;
    };
    if state.b.value() == Some(x) && candidate.n <= state.b.n {
        return true;
    }
    self_already_accepts_prepared(state, candidate)
}

fn self_already_accepts_prepared<V: Value>(state: &BallotState<V>, candidate: &Ballot<V>) -> bool {
    let Some(x) = candidate.value() else {
        return false;
    };
    if let Some(p) = &state.p {
        if p.value() == Some(x) && candidate.n <= p.n {
            return true;
        }
    }
    if let Some(pp) = &state.pp {
        if pp.value() == Some(x) && candidate.n <= pp.n {
            return true;
        }
    }
    false
}

/// `true` when `env` votes-or-accepts "prepared `candidate`".
fn env_votes_or_accepts_prepared<V: Value>(env: &Envelope<V>, candidate: &Ballot<V>) -> bool {
    let Some(x) = candidate.value() else {
        return false;
    };
    match &env.message {
        Message::Prepare { b, .. } if b.value() == Some(x) && candidate.n <= b.n => true,
        Message::Commit { b, hn, .. } if b.value() == Some(x) && candidate.n <= *hn => true,
        Message::Externalize { c, hn } if c.value() == Some(x) && candidate.n <= *hn => true,
        _ => env_accepts_prepared(env, candidate),
    }
}

/// `true` when `env` has already accepted "prepared `candidate`"
/// (the stronger, v-blocking-eligible tier).
fn env_accepts_prepared<V: Value>(env: &Envelope<V>, candidate: &Ballot<V>) -> bool {
    let Some(x) = candidate.value() else {
        return false;
    };
    match &env.message {
        Message::Prepare { p, pp, .. } => {
            p.as_ref().map_or(false, |p| p.value() == Some(x) && candidate.n <= p.n)
                || pp
                    .as_ref()
                    .map_or(false, |pp| pp.value() == Some(x) && candidate.n <= pp.n)
        }
        Message::Commit { b, pn, .. } => b.value() == Some(x) && candidate.n <= *pn,
        Message::Externalize { c, .. } => c.value() == Some(x),
        Message::Nominate { .. } => false,
    }
}

fn overlaps(a: (u32, u32), b: (u32, u32)) -> bool {
    a.0 <= b.1 && b.0 <= a.1
}

fn env_already_accepted_committed<V: Value>(env: &Envelope<V>, value: &V, range: (u32, u32)) -> bool {
    match &env.message {
        Message::Commit { b, cn, hn, .. } => b.value() == Some(value) && overlaps((*cn, *hn), range),
        Message::Externalize { c, hn } => c.value() == Some(value) && overlaps((c.n, *hn), range),
        _ => false,
    }
}
