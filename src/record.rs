use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::session::{Session, TailKind};

/// Timing samples per detector per session.
pub const DETECTOR_SAMPLES: usize = 40;
/// Detector samples are drawn from `0..SAMPLE_MODULUS`.
pub const SAMPLE_MODULUS: u16 = 10_000;
/// Length of the simulated sifted key, in bits.
pub const KEY_BITS: usize = 128;

/// Upper bound (exclusive) of QBER and key rate.
pub const PERCENT_SCALE_MAX: f64 = 10.0;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum KeyBitsError {
    #[error("key must be {expected} bits long (got {actual})")]
    Length { expected: usize, actual: usize },
    #[error("key contains non-binary character {0:?}")]
    NonBinary(char),
}

/// 128 characters of `'0'` / `'1'`. A coin-flip string, not key material.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct KeyBits(String);

impl KeyBits {
    /// Caller guarantees `KEY_BITS` characters of '0' / '1'.
    pub(crate) fn from_generated(text: String) -> Self {
        debug_assert!(text.len() == KEY_BITS && text.bytes().all(|b| b == b'0' || b == b'1'));
        KeyBits(text)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Number of '1' bits.
    pub fn ones(&self) -> usize {
        self.0.bytes().filter(|b| *b == b'1').count()
    }
}

impl TryFrom<String> for KeyBits {
    type Error = KeyBitsError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        if let Some(bad) = value.chars().find(|c| *c != '0' && *c != '1') {
            return Err(KeyBitsError::NonBinary(bad));
        }
        if value.len() != KEY_BITS {
            return Err(KeyBitsError::Length {
                expected: KEY_BITS,
                actual: value.len(),
            });
        }
        Ok(KeyBits(value))
    }
}

impl From<KeyBits> for String {
    fn from(key: KeyBits) -> Self {
        key.0
    }
}

/// Field closing a record: a key on even sessions, a key rate on odd ones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tail {
    Key(KeyBits),
    /// Throughput in kbps, 2 decimal places.
    KeyRate(f64),
}

impl Tail {
    pub fn kind(&self) -> TailKind {
        match self {
            Tail::Key(_) => TailKind::Key,
            Tail::KeyRate(_) => TailKind::KeyRate,
        }
    }
}

/// Everything emitted for one session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub session: Session,
    pub spd1: Vec<u16>,
    pub decoy_state_randomness: f64,
    pub spd2: Vec<u16>,
    pub visibility: f64,
    pub qber: f64,
    pub tail: Tail,
}

impl Record {
    /// Checks the shape guarantees every emitted record holds.
    pub fn is_well_formed(&self) -> bool {
        let block_ok = |block: &[u16]| {
            block.len() == DETECTOR_SAMPLES && block.iter().all(|v| *v < SAMPLE_MODULUS)
        };
        let unit = |v: f64| (0.0..1.0).contains(&v);
        let scaled = |v: f64| (0.0..PERCENT_SCALE_MAX).contains(&v);

        block_ok(&self.spd1)
            && block_ok(&self.spd2)
            && unit(self.decoy_state_randomness)
            && unit(self.visibility)
            && scaled(self.qber)
            && self.tail.kind() == self.session.tail_kind()
            && match &self.tail {
                Tail::Key(_) => true,
                Tail::KeyRate(rate) => scaled(*rate),
            }
    }
}
