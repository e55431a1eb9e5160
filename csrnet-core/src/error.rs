//! The closed error taxonomy surfaced by the pipeline.
//!
//! Validation and decode failures are user-renderable; inference and render
//! failures indicate something went wrong after the input was accepted and
//! propagate without retries. A missing model artifact is not represented
//! here at all: the provider recovers from it internally via the stub
//! predictor and only logs the condition.

use thiserror::Error;

use crate::upload::ValidationError;

/// The stages a pipeline run moves through, in order.
///
/// A run is linear: each stage executes at most once and any stage may
/// transition to `Failed`, reported through [`PipelineError::stage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Received,
    Validated,
    Preprocessed,
    Inferred,
    Rendered,
    Completed,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Received => "received",
            Stage::Validated => "validated",
            Stage::Preprocessed => "preprocessed",
            Stage::Inferred => "inferred",
            Stage::Rendered => "rendered",
            Stage::Completed => "completed",
        }
    }
}

/// A failed pipeline run.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The upload was rejected before any processing occurred.
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// The bytes passed MIME checks but are not a decodable image.
    #[error("could not decode the uploaded file as an image: {source}")]
    Decode {
        #[source]
        source: image::ImageError,
    },
    /// Prediction failed after a model was successfully loaded.
    #[error("inference failed: {source}")]
    Inference {
        #[source]
        source: anyhow::Error,
    },
    /// Heatmap rendering or encoding failed.
    #[error("heatmap rendering failed: {source}")]
    Render {
        #[source]
        source: anyhow::Error,
    },
}

impl PipelineError {
    /// The stage the run had reached when it failed.
    pub fn stage(&self) -> Stage {
        match self {
            PipelineError::Validation(_) => Stage::Received,
            PipelineError::Decode { .. } => Stage::Validated,
            PipelineError::Inference { .. } => Stage::Preprocessed,
            PipelineError::Render { .. } => Stage::Inferred,
        }
    }

    /// Whether the caller should ask the user to resubmit a different file.
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            PipelineError::Validation(_) | PipelineError::Decode { .. }
        )
    }
}
