//! Core crowd-density estimation pipeline.
//!
//! This crate validates uploaded images, preprocesses them into model-ready
//! tensors, runs a CSRNet-style density model with `tract-onnx` (falling
//! back to a deterministic stub when the artifact is unavailable), reduces
//! the density map to a crowd count, and renders a heatmap overlay.

/// Density maps and the count reduction.
pub mod density;
/// The typed error taxonomy surfaced to callers.
pub mod error;
/// Heatmap rendering (jet colormap, upsampling, blending, encoding).
pub mod heatmap;
/// ONNX model loading and execution.
pub mod model;
/// End-to-end orchestration of a single upload.
pub mod pipeline;
/// Image pre-processing (decoding, resizing, normalization).
pub mod preprocess;
/// Lazy model provider with stub fallback.
pub mod provider;
/// Upload candidates and server-side validation.
pub mod upload;

pub use density::DensityMap;
pub use error::{PipelineError, Stage};
pub use heatmap::{HeatmapConfig, jet_color};
pub use model::{CsrnetModel, DENSITY_STRIDE, ModelLoadError};
pub use pipeline::{CrowdPipeline, InferenceResult};
pub use preprocess::{
    CHANNEL_MEAN, CHANNEL_STD, CpuPreprocessor, InputSize, PreprocessConfig, PreprocessOutput,
    Preprocessor, decode_upload, preprocess_dynamic_image,
};
pub use provider::{ModelProvider, ModelSources, Predictor, StubPredictor};
pub use upload::{
    ALLOWED_MIME_TYPES, MAX_UPLOAD_BYTES, UploadCandidate, ValidationError, mime_for_extension,
    validate, validate_with_limit,
};

/// Returns the crate version for diagnostics.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
