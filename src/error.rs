//! Error types for layer extraction and reconciliation.

use std::process::ExitStatus;

use thiserror::Error;

/// Failures of the external-process pipeline itself.
///
/// Call sites translate these into a [`LayerError`] that says which step
/// of the extraction broke.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// An inter-stage pipe could not be set up or torn down.
    #[error("pipeline wiring failed: {0}")]
    Wire(String),

    /// A stage could not be started.
    #[error("failed to start '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// A stage exited unsuccessfully.
    #[error("'{program}' failed ({status}): {stderr}")]
    Stage {
        /// Position of the first failing stage, 0 being the most upstream.
        stage: usize,
        program: String,
        status: ExitStatus,
        /// Bytes relayed to the stage's stdin; always 0 for the first stage.
        received: u64,
        stderr: String,
    },

    /// The pipeline outlived its deadline and was killed.
    #[error("pipeline timed out after {0:?}")]
    TimedOut(std::time::Duration),
}

impl PipelineError {
    /// Captured standard error, or the error's own description when the
    /// failure happened before any stage could write to it.
    pub fn detail(&self) -> String {
        match self {
            PipelineError::Stage { stderr, .. } if !stderr.trim().is_empty() => {
                stderr.trim().to_string()
            }
            other => other.to_string(),
        }
    }
}

/// Layer extraction errors.
#[derive(Error, Debug)]
pub enum LayerError {
    /// The save/extract pipeline failed; carries captured stderr.
    #[error("could not save image: {0}")]
    ExtractionFailed(String),

    /// The export manifest is missing, unreadable, malformed or does not
    /// hold exactly one entry.
    #[error("invalid manifest: {0}")]
    InvalidManifest(String),

    /// No usable layer history could be obtained.
    #[error("could not get image's history: {0}")]
    HistoryUnavailable(String),

    /// A pipe between two stages could not be opened or closed.
    #[error("pipeline wiring failed: {0}")]
    PipelineWireError(String),

    /// Manifest and runtime history disagree on the number of layers.
    #[error("manifest lists {manifest} layers but history lists {history}")]
    LayerCountMismatch { manifest: usize, history: usize },

    /// The image reference could not be parsed.
    #[error("invalid image reference '{0}'")]
    InvalidReference(String),

    /// I/O error while preparing or removing the export tree.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl LayerError {
    /// Map a pipeline failure from the save/extract step.
    pub fn extraction(err: PipelineError) -> Self {
        match err {
            PipelineError::Wire(msg) => LayerError::PipelineWireError(msg),
            other => LayerError::ExtractionFailed(other.detail()),
        }
    }

    /// Map a pipeline failure from the history query.
    pub fn history(err: PipelineError) -> Self {
        match err {
            PipelineError::Wire(msg) => LayerError::PipelineWireError(msg),
            other => LayerError::HistoryUnavailable(other.detail()),
        }
    }
}

/// Result type alias for layer operations.
pub type Result<T> = std::result::Result<T, LayerError>;
