use serde::{Deserialize, Serialize};

/// Monotonic session counter. One session is one emitted record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Session {
    pub number: u64,
}

/// Which optional field closes a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TailKind {
    /// Key-length line followed by the key bits.
    Key,
    /// Throughput line.
    KeyRate,
}

impl Session {
    pub fn new() -> Self {
        Session { number: 0 }
    }

    pub fn next(&self) -> Self {
        Session { number: self.number + 1 }
    }

    pub fn is_even(&self) -> bool {
        self.number % 2 == 0
    }

    /// Even sessions carry a key, odd sessions a key rate.
    pub fn tail_kind(&self) -> TailKind {
        if self.is_even() {
            TailKind::Key
        } else {
            TailKind::KeyRate
        }
    }
}

impl From<u64> for Session {
    fn from(number: u64) -> Self {
        Session { number }
    }
}
