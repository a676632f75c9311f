//! SHA-256-based pseudo-random priority and neighbor selection,
//! grounded directly on `node.go`'s `G`, `Weight`, `Neighbors`,
//! `Priority` and the `hmax` constant.
//!
//! `G(i, m) = SHA256(xdr(i) || prev_value_bytes || m)`. Where the Go
//! source multiplies a `float64` weight by a `big.Float` copy of
//! `2^256 - 1`, this implementation keeps the weight as an exact
//! `count / slice_count` fraction and does the scaling with exact
//! big-integer arithmetic (`mul_bytes_by_u64` / `div_bytes_by_u64`
//! below), deterministic and free of floating-point rounding, at the
//! cost of not being bit-for-bit identical to the Go reference for
//! non-trivial fractions. See DESIGN.md.

use std::collections::BTreeSet;

use sha2::{Digest, Sha256};

use super::error::{PriorityError, PriorityResult};
use super::node_id::NodeId;
use super::qset::QuorumSet;
use super::slot_id::SlotId;
use super::value::Value;

/// `2^256 - 1`, the all-ones 32-byte big-endian integer.
const HMAX: [u8; 32] = [0xff; 32];

/// 4-byte big-endian signed integer encoding ("XDR marshalling").
fn xdr_i32(v: i32) -> [u8; 4] {
    v.to_be_bytes()
}

/// Resolves the `prev_value_bytes` input to `G()`: empty for slot 1,
/// the serialized externalized value of slot `i - 1` for `i > 1`, or
/// `NoPreviousValue` if that slot hasn't externalized locally yet.
pub fn resolve_prev_value_bytes<V: Value>(
    slot: SlotId,
    prev_externalized_value: Option<&V>,
) -> PriorityResult<Vec<u8>> {
    match slot.prev() {
        None => Ok(Vec::new()),
        Some(_) => match prev_externalized_value {
            Some(v) => Ok(v.to_bytes()),
            None => Err(PriorityError::NoPreviousValue),
        },
    }
}

/// `G(i, m) = SHA256(xdr(i) || prev_value_bytes || m)`.
pub fn g_hash(slot: SlotId, prev_value_bytes: &[u8], m: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(xdr_i32(slot.get() as i32));
    hasher.update(prev_value_bytes);
    hasher.update(m);
    hasher.finalize().into()
}

/// Big-endian `bytes * k`, `bytes.len() + 8` bytes long (enough room
/// for a `u64` multiplier to carry out of the top).
fn mul_bytes_by_u64(bytes: &[u8], k: u64) -> Vec<u8> {
    let n = bytes.len();
    let mut out = vec![0u8; n + 8];
    let mut carry: u128 = 0;
    for i in 0..n {
        let b = bytes[n - 1 - i];
        let prod = b as u128 * k as u128 + carry;
        let idx = out.len() - 1 - i;
        out[idx] = (prod & 0xFF) as u8;
        carry = prod >> 8;
    }
    let mut i = n;
    while carry > 0 {
        let idx = out.len() - 1 - i;
        out[idx] = (carry & 0xFF) as u8;
        carry >>= 8;
        i += 1;
    }
    out
}

/// Big-endian `floor(bytes / div)`, same length as `bytes`.
fn div_bytes_by_u64(bytes: &[u8], div: u64) -> Vec<u8> {
    let mut out = vec![0u8; bytes.len()];
    let mut rem: u128 = 0;
    for (i, &b) in bytes.iter().enumerate() {
        let cur = (rem << 8) | b as u128;
        out[i] = (cur / div as u128) as u8;
        rem = cur % div as u128;
    }
    out
}

/// `Weight(n, p)` as an exact `(numerator, denominator)` fraction:
/// `1/1` for `p == self_id`, else `(slices containing p) / (slice
/// count)`.
fn weight_fraction(self_id: &NodeId, id: &NodeId, qset: &QuorumSet) -> (u64, u64) {
    if id == self_id {
        return (1, 1);
    }
    let total = qset.slice_count() as u64;
    if total == 0 {
        return (0, 1);
    }
    let count = qset.slices().filter(|s| s.contains(id)).count() as u64;
    (count, total)
}

/// `hw(p) = Weight(p) * 2^256`, as a 32-byte big-endian integer.
fn hw_threshold(self_id: &NodeId, id: &NodeId, qset: &QuorumSet) -> [u8; 32] {
    let (k, n) = weight_fraction(self_id, id, qset);
    let product = mul_bytes_by_u64(&HMAX, k);
    let quotient = div_bytes_by_u64(&product, n.max(1));
    let mut result = [0u8; 32];
    let start = quotient.len() - 32;
    result.copy_from_slice(&quotient[start..]);
    result
}

/// `Neighbors(i, num) = { p : G(i, 'N' || xdr(num) || p.String()) <
/// hw(p) }`, ranging over `self_id` and every peer named in `qset`.
pub fn neighbors(
    slot: SlotId,
    round: u32,
    self_id: &NodeId,
    qset: &QuorumSet,
    prev_value_bytes: &[u8],
) -> BTreeSet<NodeId> {
    let mut candidates = qset.flattened_members();
    candidates.insert(self_id.clone());

    candidates
        .into_iter()
        .filter(|p| {
            let mut m = vec![b'N'];
            m.extend_from_slice(&xdr_i32(round as i32));
            m.extend_from_slice(p.as_str().as_bytes());
            let g = g_hash(slot, prev_value_bytes, &m);
            let hw = hw_threshold(self_id, p, qset);
            g < hw
        })
        .collect()
}

/// `Priority(i, num, p) = G(i, 'P' || xdr(num) || p.String())`,
/// compared as an unsigned big-endian 256-bit integer.
pub fn priority(slot: SlotId, round: u32, p: &NodeId, prev_value_bytes: &[u8]) -> [u8; 32] {
    let mut m = vec![b'P'];
    m.extend_from_slice(&xdr_i32(round as i32));
    m.extend_from_slice(p.as_str().as_bytes());
    g_hash(slot, prev_value_bytes, &m)
}

/// The subset of `Neighbors(i, num)` with maximal `Priority(i, num,
/// ·)`: the round's leader set.
pub fn leader_set(
    slot: SlotId,
    round: u32,
    self_id: &NodeId,
    qset: &QuorumSet,
    prev_value_bytes: &[u8],
) -> BTreeSet<NodeId> {
    let nbrs = neighbors(slot, round, self_id, qset, prev_value_bytes);
    let priorities: Vec<(NodeId, [u8; 32])> = nbrs
        .into_iter()
        .map(|p| {
            let pr = priority(slot, round, &p, prev_value_bytes);
            (p, pr)
        })
        .collect();
    let Some(max) = priorities.iter().map(|(_, pr)| *pr).max() else {
        return BTreeSet::new();
    };
    priorities
        .into_iter()
        .filter(|(_, pr)| *pr == max)
        .map(|(id, _)| id)
        .collect()
}
