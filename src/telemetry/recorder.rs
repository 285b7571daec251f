use std::collections::VecDeque;

use super::metrics::{compute_snapshot, SessionSample, TelemetrySnapshot};
use crate::record::Record;

pub const MAX_SAMPLES: usize = 10_000;

#[derive(Debug)]
pub struct TelemetryRecorder {
    buffer: VecDeque<SessionSample>,
    /// Sessions seen over the whole run, including evicted ones.
    total_sessions: u64,
}

impl TelemetryRecorder {
    pub fn new() -> Self {
        Self {
            buffer: VecDeque::with_capacity(MAX_SAMPLES),
            total_sessions: 0,
        }
    }

    pub fn record(&mut self, record: &Record) {
        if self.buffer.len() >= MAX_SAMPLES {
            self.buffer.pop_front();
        }
        self.buffer.push_back(SessionSample::from(record));
        self.total_sessions += 1;
    }

    /// Metrics over the retained window (at most `MAX_SAMPLES` sessions).
    pub fn snapshot(&self) -> TelemetrySnapshot {
        compute_snapshot(&self.buffer)
    }

    pub fn total_sessions(&self) -> u64 {
        self.total_sessions
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

impl Default for TelemetryRecorder {
    fn default() -> Self {
        Self::new()
    }
}
