use std::collections::VecDeque;

use serde::Serialize;

use crate::record::{Record, Tail};

/// What the recorder keeps per session. Detector samples and key bits are
/// dropped; only counts and scalar metrics survive.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SessionSample {
    pub session: u64,
    pub qber: f64,
    pub visibility: f64,
    pub decoy_state_randomness: f64,
    /// Key bits emitted this session (0 on key-rate sessions).
    pub key_bits: usize,
    /// '1' bits in the emitted key.
    pub key_ones: usize,
    pub key_rate: Option<f64>,
}

impl From<&Record> for SessionSample {
    fn from(record: &Record) -> Self {
        let (key_bits, key_ones, key_rate) = match &record.tail {
            Tail::Key(key) => (key.as_str().len(), key.ones(), None),
            Tail::KeyRate(rate) => (0, 0, Some(*rate)),
        };
        Self {
            session: record.session.number,
            qber: record.qber,
            visibility: record.visibility,
            decoy_state_randomness: record.decoy_state_randomness,
            key_bits,
            key_ones,
            key_rate,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TelemetrySnapshot {
    pub sessions: u64,
    pub first_session: Option<u64>,
    pub last_session: Option<u64>,
    pub keys_emitted: u64,
    pub key_bits_emitted: u64,
    /// Share of '1' bits across emitted keys; 0.5 for a fair coin.
    pub key_ones_ratio: f64,
    pub rate_samples: u64,
    pub avg_qber: f64,
    pub max_qber: f64,
    pub avg_visibility: f64,
    pub avg_decoy_state_randomness: f64,
    pub avg_key_rate: f64,
}

pub fn compute_snapshot(samples: &VecDeque<SessionSample>) -> TelemetrySnapshot {
    let mut snap = TelemetrySnapshot::default();

    let mut qber_total = 0.0;
    let mut visibility_total = 0.0;
    let mut decoy_total = 0.0;
    let mut rate_total = 0.0;
    let mut ones_total = 0u64;

    for sample in samples {
        snap.sessions += 1;
        snap.first_session.get_or_insert(sample.session);
        snap.last_session = Some(sample.session);

        qber_total += sample.qber;
        if sample.qber > snap.max_qber {
            snap.max_qber = sample.qber;
        }
        visibility_total += sample.visibility;
        decoy_total += sample.decoy_state_randomness;

        if sample.key_bits > 0 {
            snap.keys_emitted += 1;
            snap.key_bits_emitted += sample.key_bits as u64;
            ones_total += sample.key_ones as u64;
        }
        if let Some(rate) = sample.key_rate {
            snap.rate_samples += 1;
            rate_total += rate;
        }
    }

    // Averages
    if snap.sessions > 0 {
        let n = snap.sessions as f64;
        snap.avg_qber = qber_total / n;
        snap.avg_visibility = visibility_total / n;
        snap.avg_decoy_state_randomness = decoy_total / n;
    }

    if snap.key_bits_emitted > 0 {
        snap.key_ones_ratio = ones_total as f64 / snap.key_bits_emitted as f64;
    }

    if snap.rate_samples > 0 {
        snap.avg_key_rate = rate_total / snap.rate_samples as f64;
    }

    snap
}
