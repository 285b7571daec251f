pub mod config;
pub mod emitter;
pub mod error;
pub mod parse;
pub mod record;
pub mod session;
pub mod source;
pub mod telemetry;
pub mod wire;

// Re-export the pieces a consumer typically touches
pub use emitter::{Emitter, RunSummary};
pub use error::EmitError;
pub use parse::{parse_stream, ParseError, RecordParser};
pub use record::{KeyBits, Record, Tail};
pub use source::TelemetrySource;
pub use wire::OutputFormat;
