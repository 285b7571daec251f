//! Session telemetry.
//!
//! Read-only side channel: the recorder observes emitted records and the
//! snapshot is only ever logged. Nothing here feeds back into generation.

pub mod metrics;
pub mod recorder;

pub use metrics::{compute_snapshot, SessionSample, TelemetrySnapshot};
pub use recorder::TelemetryRecorder;
