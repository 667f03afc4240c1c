use std::path::PathBuf;
use thiserror::Error;

/// Errors surfaced by the JSON response adapter.
///
/// The supervisor itself never returns these: it records an error kind
/// plus message and publishes an event instead.
#[derive(Debug, Error)]
pub enum ExifToolError {
    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("File not found: '{path}'")]
    FileNotFound { path: PathBuf },

    #[error("ExifTool process did not start within {timeout_ms} ms ({program})")]
    StartTimeout { program: PathBuf, timeout_ms: u64 },

    #[error("ExifTool command was not accepted: {reason}")]
    CommandRejected { reason: String },

    #[error("ExifTool event stream closed before the command completed.")]
    EventStreamClosed,
}
