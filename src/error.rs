use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EmitError {
    /// The consumer went away (broken pipe). Ends the run without failure.
    #[error("output stream closed by consumer")]
    SinkClosed,
    #[error("failed to write telemetry: {0}")]
    Io(#[source] io::Error),
    #[error("failed to encode record as JSON: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<io::Error> for EmitError {
    fn from(err: io::Error) -> Self {
        if err.kind() == io::ErrorKind::BrokenPipe {
            EmitError::SinkClosed
        } else {
            EmitError::Io(err)
        }
    }
}
