// src/error.rs
//
// Failure taxonomy for the pipeline. Only SourceUnavailable is fatal;
// the other variants are handled per iteration and the loop continues.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("video source unavailable: {source_id}: {reason}")]
    SourceUnavailable { source_id: String, reason: String },

    #[error("detection failed: {0}")]
    DetectionFailure(String),

    #[error("frame encoding failed: {0}")]
    EncodingFailure(String),
}
