//! Incremental decoder for the labeled format.
//!
//! Mirrors how a dashboard consumes the stream: `SESSION_NUMBER:` opens a
//! record, `SPD1_VALUES:` / `SPD2_VALUES:` switch into sample collection, the
//! remaining labels carry one value each, and a blank line closes the record.

use std::io::{self, BufRead};

use thiserror::Error;

use crate::record::{KeyBits, KeyBitsError, Record, Tail, DETECTOR_SAMPLES, KEY_BITS, SAMPLE_MODULUS};
use crate::session::Session;
use crate::wire;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("line {line}: expected {}:<n> to open a record", wire::SESSION_NUMBER)]
    OutsideRecord { line: usize },
    #[error("line {line}: session {session} was not closed by a blank line")]
    Unterminated { line: usize, session: u64 },
    #[error("line {line}: unknown label {label:?}")]
    UnknownLabel { line: usize, label: String },
    #[error("line {line}: {label} carries malformed value {value:?}")]
    Number {
        line: usize,
        label: &'static str,
        value: String,
    },
    #[error("line {line}: detector sample {value} outside 0..{max}", max = SAMPLE_MODULUS)]
    SampleOutOfRange { line: usize, value: u32 },
    #[error("session {session}: {detector} block has {actual} samples, expected {expected}", expected = DETECTOR_SAMPLES)]
    SampleCount {
        session: u64,
        detector: &'static str,
        actual: usize,
    },
    #[error("line {line}: key length must be {expected}, got {value:?}", expected = KEY_BITS)]
    KeyLength { line: usize, value: String },
    #[error("line {line}: invalid key: {source}")]
    Key {
        line: usize,
        #[source]
        source: KeyBitsError,
    },
    #[error("line {line}: {label} appears twice in session {session}")]
    DuplicateField {
        line: usize,
        session: u64,
        label: &'static str,
    },
    #[error("session {session}: missing {field}")]
    MissingField { session: u64, field: &'static str },
    #[error("session {session}: record carries both a key and a key rate")]
    ConflictingTail { session: u64 },
    #[error("failed to read telemetry stream: {0}")]
    Io(#[from] io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Detector {
    Spd1,
    Spd2,
}

impl Detector {
    fn label(self) -> &'static str {
        match self {
            Detector::Spd1 => wire::SPD1_VALUES,
            Detector::Spd2 => wire::SPD2_VALUES,
        }
    }
}

#[derive(Debug, Default)]
struct Partial {
    session: u64,
    spd1: Option<Vec<u16>>,
    spd2: Option<Vec<u16>>,
    decoy: Option<f64>,
    visibility: Option<f64>,
    qber: Option<f64>,
    key_length_seen: bool,
    key: Option<KeyBits>,
    rate: Option<f64>,
    collecting: Option<Detector>,
}

impl Partial {
    fn block_mut(&mut self, detector: Detector) -> &mut Option<Vec<u16>> {
        match detector {
            Detector::Spd1 => &mut self.spd1,
            Detector::Spd2 => &mut self.spd2,
        }
    }

    fn close_block(&mut self) -> Result<(), ParseError> {
        if let Some(detector) = self.collecting.take() {
            let actual = self.block_mut(detector).as_ref().map_or(0, Vec::len);
            if actual != DETECTOR_SAMPLES {
                return Err(ParseError::SampleCount {
                    session: self.session,
                    detector: detector.label(),
                    actual,
                });
            }
        }
        Ok(())
    }

    fn finish(mut self) -> Result<Record, ParseError> {
        self.close_block()?;
        let session = self.session;
        let missing = |field| ParseError::MissingField { session, field };

        let tail = match (self.key, self.rate) {
            (Some(_), Some(_)) => return Err(ParseError::ConflictingTail { session }),
            (Some(key), None) => {
                if !self.key_length_seen {
                    return Err(missing(wire::KEY_LENGTH));
                }
                Tail::Key(key)
            }
            (None, Some(rate)) => {
                if self.key_length_seen {
                    return Err(missing(wire::KEY_BITS_LABEL));
                }
                Tail::KeyRate(rate)
            }
            (None, None) if self.key_length_seen => return Err(missing(wire::KEY_BITS_LABEL)),
            (None, None) => return Err(missing(wire::KEY_RATE)),
        };

        Ok(Record {
            session: Session::from(session),
            spd1: self.spd1.ok_or_else(|| missing(wire::SPD1_VALUES))?,
            decoy_state_randomness: self.decoy.ok_or_else(|| missing(wire::DECOY_STATE_RANDOMNESS))?,
            spd2: self.spd2.ok_or_else(|| missing(wire::SPD2_VALUES))?,
            visibility: self.visibility.ok_or_else(|| missing(wire::VISIBILITY_RATIO))?,
            qber: self.qber.ok_or_else(|| missing(wire::QBER))?,
            tail,
        })
    }
}

/// Feed it lines, get records back at every blank separator.
#[derive(Debug, Default)]
pub struct RecordParser {
    line: usize,
    current: Option<Partial>,
}

impl RecordParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// True while a record has been opened but not yet closed.
    pub fn in_record(&self) -> bool {
        self.current.is_some()
    }

    pub fn push_line(&mut self, raw: &str) -> Result<Option<Record>, ParseError> {
        self.line += 1;
        let line_no = self.line;
        let line = raw.trim_end_matches(['\r', '\n']);

        if line.is_empty() {
            // Stray separators between records are tolerated.
            return match self.current.take() {
                Some(partial) => partial.finish().map(Some),
                None => Ok(None),
            };
        }

        let Some(partial) = self.current.as_mut() else {
            let session = parse_session(line, line_no)?;
            self.current = Some(Partial {
                session,
                ..Partial::default()
            });
            return Ok(None);
        };

        if let Some(detector) = partial.collecting {
            if line.bytes().all(|b| b.is_ascii_digit()) {
                let value: u32 = line.parse().map_err(|_| ParseError::Number {
                    line: line_no,
                    label: detector.label(),
                    value: line.to_string(),
                })?;
                if value >= u32::from(SAMPLE_MODULUS) {
                    return Err(ParseError::SampleOutOfRange { line: line_no, value });
                }
                let session = partial.session;
                let block = partial.block_mut(detector).get_or_insert_with(Vec::new);
                block.push(value as u16);
                if block.len() > DETECTOR_SAMPLES {
                    return Err(ParseError::SampleCount {
                        session,
                        detector: detector.label(),
                        actual: block.len(),
                    });
                }
                return Ok(None);
            }
        }

        partial.close_block()?;

        let (label, value) = line.split_once(':').ok_or_else(|| ParseError::UnknownLabel {
            line: line_no,
            label: line.to_string(),
        })?;
        let session = partial.session;
        let duplicate = |label| ParseError::DuplicateField {
            line: line_no,
            session,
            label,
        };

        match label {
            wire::SESSION_NUMBER => {
                return Err(ParseError::Unterminated {
                    line: line_no,
                    session,
                })
            }
            wire::SPD1_VALUES | wire::SPD2_VALUES => {
                let detector = if label == wire::SPD1_VALUES {
                    Detector::Spd1
                } else {
                    Detector::Spd2
                };
                if !value.is_empty() {
                    return Err(number_error(line_no, detector.label(), value));
                }
                let block = partial.block_mut(detector);
                if block.is_some() {
                    return Err(duplicate(detector.label()));
                }
                *block = Some(Vec::with_capacity(DETECTOR_SAMPLES));
                partial.collecting = Some(detector);
            }
            wire::DECOY_STATE_RANDOMNESS => {
                if !set_once(&mut partial.decoy, parse_float(line_no, wire::DECOY_STATE_RANDOMNESS, value)?) {
                    return Err(duplicate(wire::DECOY_STATE_RANDOMNESS));
                }
            }
            wire::VISIBILITY_RATIO => {
                if !set_once(&mut partial.visibility, parse_float(line_no, wire::VISIBILITY_RATIO, value)?) {
                    return Err(duplicate(wire::VISIBILITY_RATIO));
                }
            }
            wire::QBER => {
                if !set_once(&mut partial.qber, parse_float(line_no, wire::QBER, value)?) {
                    return Err(duplicate(wire::QBER));
                }
            }
            wire::KEY_RATE => {
                if !set_once(&mut partial.rate, parse_float(line_no, wire::KEY_RATE, value)?) {
                    return Err(duplicate(wire::KEY_RATE));
                }
            }
            wire::KEY_LENGTH => {
                if value.trim().parse::<usize>().ok() != Some(KEY_BITS) {
                    return Err(ParseError::KeyLength {
                        line: line_no,
                        value: value.to_string(),
                    });
                }
                if partial.key_length_seen {
                    return Err(duplicate(wire::KEY_LENGTH));
                }
                partial.key_length_seen = true;
            }
            wire::KEY_BITS_LABEL => {
                let key = KeyBits::try_from(value.trim().to_string())
                    .map_err(|source| ParseError::Key { line: line_no, source })?;
                if !set_once(&mut partial.key, key) {
                    return Err(duplicate(wire::KEY_BITS_LABEL));
                }
            }
            other => {
                return Err(ParseError::UnknownLabel {
                    line: line_no,
                    label: other.to_string(),
                })
            }
        }

        Ok(None)
    }

    /// Call at end of input. Fails if a record was left open.
    pub fn finish(self) -> Result<(), ParseError> {
        match self.current {
            Some(partial) => Err(ParseError::Unterminated {
                line: self.line,
                session: partial.session,
            }),
            None => Ok(()),
        }
    }
}

/// Decodes a whole stream. Every record must be closed by a blank line.
pub fn parse_stream<R: BufRead>(reader: R) -> Result<Vec<Record>, ParseError> {
    let mut parser = RecordParser::new();
    let mut records = Vec::new();
    for line in reader.lines() {
        if let Some(record) = parser.push_line(&line?)? {
            records.push(record);
        }
    }
    parser.finish()?;
    Ok(records)
}

fn parse_session(line: &str, line_no: usize) -> Result<u64, ParseError> {
    let value = line
        .strip_prefix(wire::SESSION_NUMBER)
        .and_then(|rest| rest.strip_prefix(':'))
        .ok_or(ParseError::OutsideRecord { line: line_no })?;
    value
        .trim()
        .parse()
        .map_err(|_| number_error(line_no, wire::SESSION_NUMBER, value))
}

fn parse_float(line: usize, label: &'static str, value: &str) -> Result<f64, ParseError> {
    value
        .trim()
        .parse()
        .map_err(|_| number_error(line, label, value))
}

fn number_error(line: usize, label: &'static str, value: &str) -> ParseError {
    ParseError::Number {
        line,
        label,
        value: value.to_string(),
    }
}

/// Fills an empty slot. Returns false if it was already set.
fn set_once<T>(slot: &mut Option<T>, value: T) -> bool {
    if slot.is_some() {
        return false;
    }
    *slot = Some(value);
    true
}
