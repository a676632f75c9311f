//! Ballots: `(counter, value)` pairs with lexicographic order.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::value::Value;

/// `(N, X)`. `X = None` is the "bottom" sentinel ballot used before
/// any value has been prepared.
#[derive(Clone, Serialize, Deserialize)]
pub struct Ballot<V: Value> {
    pub n: u32,
    pub x: Option<V>,
}

impl<V: Value> Ballot<V> {
    pub fn new(n: u32, x: V) -> Self {
        Ballot { n, x: Some(x) }
    }

    /// The sentinel "bottom" ballot: `(0, nil)`.
    pub fn bottom() -> Self {
        Ballot { n: 0, x: None }
    }

    pub fn is_bottom(&self) -> bool {
        self.n == 0 && self.x.is_none()
    }

    pub fn value(&self) -> Option<&V> {
        self.x.as_ref()
    }

    pub fn with_counter(&self, n: u32) -> Self {
        Ballot {
            n,
            x: self.x.clone(),
        }
    }

    pub fn same_value(&self, other: &Ballot<V>) -> bool {
        self.x == other.x
    }
}

impl<V: Value> PartialEq for Ballot<V> {
    fn eq(&self, other: &Self) -> bool {
        self.n == other.n && self.x == other.x
    }
}

impl<V: Value> Eq for Ballot<V> {}

impl<V: Value> PartialOrd for Ballot<V> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<V: Value> Ord for Ballot<V> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.n.cmp(&other.n).then_with(|| self.x.cmp(&other.x))
    }
}

impl<V: Value> fmt::Debug for Ballot<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.x {
            Some(x) => write!(f, "({}, {:?})", self.n, x),
            None => write!(f, "({}, nil)", self.n),
        }
    }
}
