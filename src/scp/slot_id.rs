use std::fmt;

use serde::{Deserialize, Serialize};

/// A slot identifier: a strictly positive integer. Slots are
/// independent state machines; slot N+1 may begin before slot N
/// externalizes.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SlotId(u64);

impl SlotId {
    /// Panics if `n` is zero; slot identifiers are strictly positive.
    pub fn new(n: u64) -> Self {
        assert!(n > 0, "SlotId must be strictly positive, got 0");
        SlotId(n)
    }

    pub fn get(self) -> u64 {
        self.0
    }

    pub fn prev(self) -> Option<SlotId> {
        if self.0 > 1 {
            Some(SlotId(self.0 - 1))
        } else {
            None
        }
    }

    pub fn next(self) -> SlotId {
        SlotId(self.0 + 1)
    }

    pub fn is_even(self) -> bool {
        self.0 % 2 == 0
    }
}

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SlotId({})", self.0)
    }
}
