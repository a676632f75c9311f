//! The message taxonomy: four variants, NOM < PREP < COMMIT < EXT, with
//! a total order across and within variants. Implemented as a closed
//! tagged enum rather than a class hierarchy.

use std::cmp::Ordering;
use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::ballot::Ballot;
use super::error::{EnvelopeError, EnvelopeResult};
use super::value::Value;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(bound = "V: Value")]
pub enum Message<V: Value> {
    Nominate {
        voted: BTreeSet<V>,
        accepted: BTreeSet<V>,
    },
    Prepare {
        b: Ballot<V>,
        p: Option<Ballot<V>>,
        pp: Option<Ballot<V>>,
        hn: u32,
        cn: u32,
    },
    Commit {
        b: Ballot<V>,
        pn: u32,
        hn: u32,
        cn: u32,
    },
    Externalize {
        c: Ballot<V>,
        hn: u32,
    },
}

/// Discriminant used purely to rank variants against each other:
/// NOM < PREP < COMMIT < EXT.
fn variant_rank<V: Value>(m: &Message<V>) -> u8 {
    match m {
        Message::Nominate { .. } => 0,
        Message::Prepare { .. } => 1,
        Message::Commit { .. } => 2,
        Message::Externalize { .. } => 3,
    }
}

impl<V: Value> Message<V> {
    pub fn new_prepare(
        b: Ballot<V>,
        p: Option<Ballot<V>>,
        pp: Option<Ballot<V>>,
        hn: u32,
        cn: u32,
    ) -> EnvelopeResult<Self> {
        let msg = Message::Prepare { b, p, pp, hn, cn };
        msg.validate()?;
        Ok(msg)
    }

    /// Checks the per-variant invariants against an already-constructed
    /// message. Used to reject a malformed envelope at the ingress
    /// point (`Slot::handle_envelope`) without going through
    /// `new_prepare`, since envelopes arriving from a peer are
    /// deserialized directly into the enum.
    pub fn validate(&self) -> EnvelopeResult<()> {
        if let Message::Prepare { p: Some(p), pp: Some(pp), .. } = self {
            if p.same_value(pp) || pp >= p {
                return Err(EnvelopeError::MalformedPrepare);
            }
        }
        Ok(())
    }

    /// The ballot counter this message asserts, used by the
    /// counter-bump timer: 0 for NOM and EXT.
    pub fn counter(&self) -> u32 {
        match self {
            Message::Nominate { .. } => 0,
            Message::Prepare { b, .. } => b.n,
            Message::Commit { b, .. } => b.n,
            Message::Externalize { .. } => 0,
        }
    }

    pub fn is_externalize(&self) -> bool {
        matches!(self, Message::Externalize { .. })
    }
}

impl<V: Value> PartialOrd for Message<V> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<V: Value> Ord for Message<V> {
    fn cmp(&self, other: &Self) -> Ordering {
        let rank = variant_rank(self).cmp(&variant_rank(other));
        if rank != Ordering::Equal {
            return rank;
        }
        match (self, other) {
            (
                Message::Nominate { voted: v1, accepted: a1 },
                Message::Nominate { voted: v2, accepted: a2 },
            ) => a1.len().cmp(&a2.len()).then_with(|| v1.len().cmp(&v2.len())),
            (
                Message::Prepare { b: b1, p: p1, pp: pp1, hn: hn1, .. },
                Message::Prepare { b: b2, p: p2, pp: pp2, hn: hn2, .. },
            ) => b1
                .cmp(b2)
                .then_with(|| p1.cmp(p2))
                .then_with(|| pp1.cmp(pp2))
                .then_with(|| hn1.cmp(hn2)),
            (
                Message::Commit { b: b1, pn: pn1, hn: hn1, .. },
                Message::Commit { b: b2, pn: pn2, hn: hn2, .. },
            ) => b1.cmp(b2).then_with(|| pn1.cmp(pn2)).then_with(|| hn1.cmp(hn2)),
            (Message::Externalize { hn: hn1, .. }, Message::Externalize { hn: hn2, .. }) => {
                hn1.cmp(hn2)
            }
            _ => unreachable!("variant_rank equality implies same variant"),
        }
    }
}
