//! Line-oriented output. Every line is flushed as soon as it is written so a
//! reader tailing the stream sees it without buffering delay.

use std::io::Write;

use clap::ValueEnum;
use serde::Deserialize;

use crate::error::EmitError;
use crate::record::{Record, Tail, KEY_BITS};

pub const SESSION_NUMBER: &str = "SESSION_NUMBER";
pub const SPD1_VALUES: &str = "SPD1_VALUES";
pub const DECOY_STATE_RANDOMNESS: &str = "DECOY_STATE_RANDOMNESS_AT_SPD1";
pub const SPD2_VALUES: &str = "SPD2_VALUES";
pub const VISIBILITY_RATIO: &str = "VISIBILITY_RATIO_IS";
pub const QBER: &str = "SPD1_QBER_VALUE_IS";
pub const KEY_LENGTH: &str = "NUMBER_OF_RX_KEY_BITS_AFTER_PRIVACY_AMPLIFICATION_IS";
pub const KEY_BITS_LABEL: &str = "KEY_BITS";
pub const KEY_RATE: &str = "KEY_RATE_PER_SECOND_IS";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OutputFormat {
    /// `LABEL:value` lines, detector blocks one sample per line.
    #[default]
    Labeled,
    /// One JSON object per record.
    Ndjson,
}

/// Renders a record in the labeled format, blank separator included.
pub fn render_labeled(record: &Record) -> Vec<String> {
    let mut lines = Vec::with_capacity(record.spd1.len() + record.spd2.len() + 10);

    lines.push(format!("{SESSION_NUMBER}:{}", record.session.number));
    lines.push(format!("{SPD1_VALUES}:"));
    lines.extend(record.spd1.iter().map(|v| v.to_string()));
    lines.push(format!(
        "{DECOY_STATE_RANDOMNESS}:{:.4}",
        record.decoy_state_randomness
    ));
    lines.push(format!("{SPD2_VALUES}:"));
    lines.extend(record.spd2.iter().map(|v| v.to_string()));
    lines.push(format!("{VISIBILITY_RATIO}:{:.4}", record.visibility));
    lines.push(format!("{QBER}:{:.2}", record.qber));
    match &record.tail {
        Tail::Key(key) => {
            lines.push(format!("{KEY_LENGTH}:{KEY_BITS}"));
            lines.push(format!("{KEY_BITS_LABEL}:{}", key.as_str()));
        }
        Tail::KeyRate(rate) => lines.push(format!("{KEY_RATE}:{rate:.2}")),
    }
    lines.push(String::new());

    lines
}

/// Wraps the output stream. Owns no buffer of its own.
pub struct LineSink<W: Write> {
    writer: W,
    lines_written: u64,
}

impl<W: Write> LineSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            lines_written: 0,
        }
    }

    pub fn write_line(&mut self, line: &str) -> Result<(), EmitError> {
        self.writer.write_all(line.as_bytes())?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        self.lines_written += 1;
        Ok(())
    }

    /// Writes one record and returns how many lines it took.
    pub fn write_record(&mut self, record: &Record, format: OutputFormat) -> Result<usize, EmitError> {
        match format {
            OutputFormat::Labeled => {
                let lines = render_labeled(record);
                for line in &lines {
                    self.write_line(line)?;
                }
                Ok(lines.len())
            }
            OutputFormat::Ndjson => {
                let json = serde_json::to_string(record)?;
                self.write_line(&json)?;
                Ok(1)
            }
        }
    }

    pub fn lines_written(&self) -> u64 {
        self.lines_written
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}
