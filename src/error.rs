use std::path::PathBuf;

use crate::report::Stage;

/// Failure of a single external tool invocation.
#[derive(thiserror::Error, Debug)]
pub enum ToolError {
    #[error("failed to run `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("`{program}` exited with {status}: {stderr}")]
    Status {
        program: String,
        status: String,
        stderr: String,
    },
    #[error("`{program}` produced unusable output: {reason}")]
    Output { program: String, reason: String },
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A recoverable failure of one pipeline stage for one track.
#[derive(thiserror::Error, Debug)]
pub enum StageError {
    #[error("cover extraction failed: {0}")]
    ExtractionFailed(#[source] ToolError),
    #[error("cover crop failed: {0}")]
    CropFailed(#[source] ToolError),
    /// The batch cover could not be handed to or taken from a track.
    #[error("batch cover unavailable: {0}")]
    FallbackFailed(#[source] ToolError),
    #[error("cover injection failed: {0}")]
    InjectionFailed(#[source] ToolError),
    #[error("transcode failed: {0}")]
    TranscodeFailed(#[source] ToolError),
    #[error("verification failed for {path}: {source}")]
    VerificationFailed {
        path: PathBuf,
        #[source]
        source: ToolError,
    },
    #[error("could not move {from} into place: {source}")]
    FinalizeFailed {
        from: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl StageError {
    /// The pipeline stage this failure belongs to.
    pub fn stage(&self) -> Stage {
        match self {
            StageError::ExtractionFailed(_)
            | StageError::CropFailed(_)
            | StageError::FallbackFailed(_) => Stage::Cover,
            StageError::InjectionFailed(_) => Stage::Inject,
            StageError::TranscodeFailed(_) => Stage::Transcode,
            StageError::VerificationFailed { .. } => Stage::Verify,
            StageError::FinalizeFailed { .. } => Stage::Finalize,
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Invalid options: {0}")]
    InvalidOptions(String),
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Required tool `{tool}` is not available: {source}")]
    DependencyMissing {
        tool: String,
        #[source]
        source: ToolError,
    },
    #[error("Acquisition failed: {0}")]
    AcquisitionFailed(String),
    #[error("{0} track stage(s) failed")]
    TracksFailed(usize),
}
