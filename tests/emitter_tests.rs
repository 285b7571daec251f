use std::io::{self, Write};
use std::time::{Duration, Instant};

use qkd_telemetry::record::{DETECTOR_SAMPLES, KEY_BITS};
use qkd_telemetry::{Emitter, OutputFormat, Tail, TelemetrySource};

/// Writer that only "publishes" bytes on flush, the way a pipe reader sees them.
#[derive(Default)]
struct FlushTracker {
    pending: Vec<u8>,
    published: Vec<u8>,
    flushes: usize,
    max_pending_lines: usize,
}

impl Write for FlushTracker {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.pending.extend_from_slice(buf);
        let pending_lines = self.pending.iter().filter(|b| **b == b'\n').count();
        self.max_pending_lines = self.max_pending_lines.max(pending_lines);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.published.append(&mut self.pending);
        self.flushes += 1;
        Ok(())
    }
}

fn emit_text(seed: u64, sessions: u64) -> String {
    let mut emitter = Emitter::new(TelemetrySource::new(seed), Vec::new());
    for _ in 0..sessions {
        emitter.emit_session().unwrap();
    }
    String::from_utf8(emitter.into_writer()).unwrap()
}

fn assert_decimals(value: &str, places: usize) -> f64 {
    let (whole, frac) = value.split_once('.').expect("decimal point");
    assert_eq!(frac.len(), places, "{value} should have {places} decimals");
    assert!(whole.chars().all(|c| c.is_ascii_digit()));
    value.parse().unwrap()
}

fn assert_block(lines: &[&str]) {
    assert_eq!(lines.len(), DETECTOR_SAMPLES);
    for line in lines {
        let value: u32 = line.parse().expect("integer sample");
        assert!(value <= 9_999);
    }
}

#[test]
fn test_session_zero_carries_key() {
    let text = emit_text(1, 1);
    let lines: Vec<&str> = text.lines().collect();

    assert_eq!(lines[0], "SESSION_NUMBER:0");
    assert_eq!(lines[1], "SPD1_VALUES:");
    assert_block(&lines[2..42]);

    let decoy = lines[42].strip_prefix("DECOY_STATE_RANDOMNESS_AT_SPD1:").unwrap();
    assert!(assert_decimals(decoy, 4) < 1.0);

    assert_eq!(lines[43], "SPD2_VALUES:");
    assert_block(&lines[44..84]);

    let visibility = lines[84].strip_prefix("VISIBILITY_RATIO_IS:").unwrap();
    assert!(assert_decimals(visibility, 4) < 1.0);
    let qber = lines[85].strip_prefix("SPD1_QBER_VALUE_IS:").unwrap();
    assert!(assert_decimals(qber, 2) < 10.0);

    assert_eq!(
        lines[86],
        "NUMBER_OF_RX_KEY_BITS_AFTER_PRIVACY_AMPLIFICATION_IS:128"
    );
    let key = lines[87].strip_prefix("KEY_BITS:").unwrap();
    assert_eq!(key.len(), KEY_BITS);
    assert!(key.chars().all(|c| c == '0' || c == '1'));

    assert_eq!(lines[88], "");
    assert_eq!(lines.len(), 89);
    assert!(text.ends_with("\n\n"));
}

#[test]
fn test_session_one_carries_key_rate() {
    let text = emit_text(1, 2);
    let records: Vec<&str> = text.split("\n\n").filter(|r| !r.is_empty()).collect();
    assert_eq!(records.len(), 2);

    let lines: Vec<&str> = records[1].lines().collect();
    assert_eq!(lines[0], "SESSION_NUMBER:1");
    assert_eq!(lines.len(), 87);
    let rate = lines[86].strip_prefix("KEY_RATE_PER_SECOND_IS:").unwrap();
    assert!(assert_decimals(rate, 2) < 10.0);
    assert!(!records[1].contains("KEY_BITS"));
    assert!(!records[1].contains("NUMBER_OF_RX_KEY_BITS"));
}

#[test]
fn test_parity_over_many_sessions() {
    let mut emitter = Emitter::new(TelemetrySource::new(77), io::sink());
    for n in 0..200u64 {
        let record = emitter.emit_session().unwrap();
        assert_eq!(record.session.number, n);
        assert!(record.is_well_formed());
        match record.tail {
            Tail::Key(_) => assert_eq!(n % 2, 0, "key on odd session {n}"),
            Tail::KeyRate(_) => assert_eq!(n % 2, 1, "key rate on even session {n}"),
        }
    }
}

#[test]
fn test_every_line_is_flushed() {
    let mut emitter = Emitter::new(TelemetrySource::new(3), FlushTracker::default());
    for _ in 0..4 {
        emitter.emit_session().unwrap();
    }
    let lines_written = emitter.sink().lines_written();
    let tracker = emitter.into_writer();

    assert!(tracker.pending.is_empty(), "bytes left unflushed");
    assert_eq!(tracker.max_pending_lines, 1, "more than one line buffered before a flush");
    assert_eq!(tracker.flushes as u64, lines_written);
    assert_eq!(
        String::from_utf8(tracker.published).unwrap().lines().count() as u64,
        lines_written
    );
}

#[test]
fn test_same_seed_same_stream() {
    assert_eq!(emit_text(2024, 6), emit_text(2024, 6));
    assert_ne!(emit_text(2024, 6), emit_text(2025, 6));
}

#[test]
fn test_ndjson_format_one_line_per_session() {
    let mut emitter =
        Emitter::new(TelemetrySource::new(9), Vec::new()).with_format(OutputFormat::Ndjson);
    for _ in 0..3 {
        emitter.emit_session().unwrap();
    }
    let text = String::from_utf8(emitter.into_writer()).unwrap();
    let values: Vec<serde_json::Value> = text
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert_eq!(values.len(), 3);
    assert_eq!(values[0]["session"], 0);
    assert!(values[0]["tail"]["key"].is_string());
    assert!(values[1]["tail"]["key_rate"].is_number());
}

#[tokio::test]
async fn test_bounded_run_with_pause() {
    let mut emitter = Emitter::new(TelemetrySource::new(5), Vec::new())
        .with_pause(Duration::from_millis(20));

    let started = Instant::now();
    let summary = emitter.run(Some(3)).await.unwrap();

    // Two pauses between three sessions, none after the last.
    assert!(started.elapsed() >= Duration::from_millis(40));
    assert_eq!(summary.sessions, 3);
    assert_eq!(summary.lines_written, 89 + 88 + 89);
    assert_eq!(summary.snapshot.keys_emitted, 2);
    assert_eq!(summary.snapshot.rate_samples, 1);
}

#[tokio::test]
async fn test_write_failure_ends_run() {
    struct ClosedPipe;
    impl Write for ClosedPipe {
        fn write(&mut self, _: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "reader gone"))
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    let mut emitter = Emitter::new(TelemetrySource::new(5), ClosedPipe);
    let err = emitter.run(None).await.unwrap_err();
    assert!(matches!(err, qkd_telemetry::EmitError::SinkClosed));
    assert_eq!(emitter.telemetry().total_sessions(), 0);
}
