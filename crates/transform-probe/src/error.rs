//! Probe error types.
//!
//! Every failure a probe can hit is a [`ProbeError`]. None of them are fatal
//! to the process: the controller converts them into a status code and
//! message at the probe boundary, and the orchestrator decides what to do.

use std::path::PathBuf;

use http::StatusCode;
use thiserror::Error;

/// Result type alias for probe operations.
pub type ProbeResult<T> = Result<T, ProbeError>;

/// Errors raised by the file provisioning collaborator.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Failed to create the {role} file in {}: {source}", dir.display())]
    CreateTemp {
        /// `"source"` or `"target"`.
        role: &'static str,
        dir: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to store the source file {name}: {source}")]
    StoreSource {
        name: String,
        #[source]
        source: std::io::Error,
    },
}

/// Errors raised by a [`Transformer`](crate::transform::Transformer).
#[derive(Debug, Error)]
pub enum TransformError {
    #[error("failed to launch transform command {program}: {source}")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("transform command {program} exited with {status}: {stderr}")]
    ExitStatus {
        program: String,
        status: String,
        stderr: String,
    },

    #[error("transform failed: {0}")]
    Failed(String),
}

/// Errors that end a single probe.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("Target File \"{}\" did not exist", path.display())]
    OutputMissing { path: PathBuf },

    #[error(
        "Target File \"{}\" was the wrong size ({size}). Needed to be between {min} and {max}",
        path.display()
    )]
    OutputSizeOutOfRange {
        path: PathBuf,
        size: u64,
        min: u64,
        max: u64,
    },

    #[error(
        "Transform {elapsed_ms}ms which is more than {percent}% slower than the normal value of {normal_ms}ms"
    )]
    Degraded {
        elapsed_ms: u64,
        percent: u64,
        normal_ms: u64,
    },

    #[error("Transformer requested to die. {0}")]
    TooManyRequests(String),

    #[error("Transform failed: {0}")]
    Transform(#[from] TransformError),
}

impl ProbeError {
    /// The status code the caller should answer the probe with.
    pub fn status(&self) -> StatusCode {
        match self {
            ProbeError::TooManyRequests(_) => StatusCode::TOO_MANY_REQUESTS,
            ProbeError::Storage(_) => StatusCode::INSUFFICIENT_STORAGE,
            ProbeError::OutputMissing { .. }
            | ProbeError::OutputSizeOutOfRange { .. }
            | ProbeError::Degraded { .. }
            | ProbeError::Transform(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Whether the orchestrator should restart the process.
    pub fn requests_restart(&self) -> bool {
        matches!(self, ProbeError::TooManyRequests(_))
    }
}
