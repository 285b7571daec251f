//! The emit loop: one source, one sink, one recorder.

use std::io::Write;
use std::time::Duration;

use tracing::{debug, info};

use crate::config::EmitterConfig;
use crate::error::EmitError;
use crate::record::Record;
use crate::source::TelemetrySource;
use crate::telemetry::{TelemetryRecorder, TelemetrySnapshot};
use crate::wire::{LineSink, OutputFormat};

#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub sessions: u64,
    pub lines_written: u64,
    pub snapshot: TelemetrySnapshot,
}

pub struct Emitter<W: Write> {
    source: TelemetrySource,
    sink: LineSink<W>,
    telemetry: TelemetryRecorder,
    format: OutputFormat,
    pause: Duration,
    report_every: u64,
}

impl<W: Write> Emitter<W> {
    pub fn new(source: TelemetrySource, writer: W) -> Self {
        Self {
            source,
            sink: LineSink::new(writer),
            telemetry: TelemetryRecorder::new(),
            format: OutputFormat::default(),
            pause: Duration::ZERO,
            report_every: 0,
        }
    }

    pub fn from_config(source: TelemetrySource, writer: W, config: &EmitterConfig) -> Self {
        Self::new(source, writer)
            .with_format(config.format)
            .with_pause(config.pause)
            .with_report_every(config.report_every)
    }

    pub fn with_format(mut self, format: OutputFormat) -> Self {
        self.format = format;
        self
    }

    /// Sleep between sessions. Zero disables pacing.
    pub fn with_pause(mut self, pause: Duration) -> Self {
        self.pause = pause;
        self
    }

    pub fn with_report_every(mut self, sessions: u64) -> Self {
        self.report_every = sessions;
        self
    }

    pub fn seed(&self) -> u64 {
        self.source.seed()
    }

    pub fn sink(&self) -> &LineSink<W> {
        &self.sink
    }

    pub fn telemetry(&self) -> &TelemetryRecorder {
        &self.telemetry
    }

    pub fn into_writer(self) -> W {
        self.sink.into_inner()
    }

    /// Generates one record, writes it line by line, and records telemetry.
    pub fn emit_session(&mut self) -> Result<Record, EmitError> {
        let record = self.source.next_record();
        let lines = self.sink.write_record(&record, self.format)?;
        self.telemetry.record(&record);
        debug!(session = record.session.number, lines, "session emitted");

        let total = self.telemetry.total_sessions();
        if self.report_every > 0 && total % self.report_every == 0 {
            log_snapshot(&self.telemetry.snapshot(), total);
        }
        Ok(record)
    }

    /// Emits until `limit` sessions have been written, or forever when `None`.
    pub async fn run(&mut self, limit: Option<u64>) -> Result<RunSummary, EmitError> {
        let mut emitted = 0u64;
        loop {
            if limit.is_some_and(|max| emitted >= max) {
                break;
            }
            self.emit_session()?;
            emitted += 1;

            let more = limit.map_or(true, |max| emitted < max);
            if more && !self.pause.is_zero() {
                tokio::time::sleep(self.pause).await;
            }
        }

        let summary = RunSummary {
            sessions: emitted,
            lines_written: self.sink.lines_written(),
            snapshot: self.telemetry.snapshot(),
        };
        info!(
            sessions = summary.sessions,
            lines = summary.lines_written,
            "emitter finished"
        );
        log_snapshot(&summary.snapshot, self.telemetry.total_sessions());
        Ok(summary)
    }
}

fn log_snapshot(snap: &TelemetrySnapshot, total_sessions: u64) {
    info!(
        total_sessions,
        window = snap.sessions,
        keys = snap.keys_emitted,
        key_bits = snap.key_bits_emitted,
        key_ones_ratio = snap.key_ones_ratio,
        avg_qber = snap.avg_qber,
        max_qber = snap.max_qber,
        avg_visibility = snap.avg_visibility,
        avg_key_rate = snap.avg_key_rate,
        "telemetry snapshot"
    );
}
