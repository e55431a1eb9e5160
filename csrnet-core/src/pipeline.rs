//! End-to-end orchestration of a single upload.
//!
//! Each run moves linearly through validation, decoding, preprocessing,
//! inference, and rendering. There is no stage re-entry and no internal
//! retry: a failed run surfaces a [`PipelineError`] and the caller may
//! resubmit a fresh request.

use std::sync::Arc;

use anyhow::Context;
use log::debug;

use csrnet_utils::config::AppSettings;
use csrnet_utils::encode::{encode_rgb_png, png_to_base64};
use csrnet_utils::telemetry::timing_guard;

use crate::error::{PipelineError, Stage};
use crate::heatmap::{self, HeatmapConfig};
use crate::preprocess::{PreprocessConfig, decode_upload, preprocess_dynamic_image};
use crate::provider::{ModelProvider, ModelSources};
use crate::upload::{MAX_UPLOAD_BYTES, UploadCandidate, validate_with_limit};

/// The artifact handed back to the presentation layer after a completed run.
#[derive(Debug, Clone)]
pub struct InferenceResult {
    count: f64,
    heatmap_png: Vec<u8>,
    source_png: Vec<u8>,
    fallback: bool,
}

impl InferenceResult {
    /// The exact real-valued crowd count, the sum of the density map.
    pub fn count(&self) -> f64 {
        self.count
    }

    /// The count rounded to the nearest integer for display.
    pub fn rounded_count(&self) -> u64 {
        self.count.round().max(0.0) as u64
    }

    /// The rendered heatmap overlay as PNG bytes.
    pub fn heatmap_png(&self) -> &[u8] {
        &self.heatmap_png
    }

    /// The decoded original, re-encoded as PNG.
    pub fn source_png(&self) -> &[u8] {
        &self.source_png
    }

    /// The heatmap as a base64 string for direct embedding in a response.
    pub fn heatmap_base64(&self) -> String {
        png_to_base64(&self.heatmap_png)
    }

    /// The source image as a base64 string.
    pub fn source_base64(&self) -> String {
        png_to_base64(&self.source_png)
    }

    /// Whether the stub predictor produced this result.
    pub fn used_fallback(&self) -> bool {
        self.fallback
    }
}

/// Sequences the pipeline components and converts their failures into the
/// uniform [`PipelineError`] outcome.
#[derive(Debug)]
pub struct CrowdPipeline {
    provider: Arc<ModelProvider>,
    preprocess: PreprocessConfig,
    heatmap: HeatmapConfig,
    upload_limit: u64,
}

impl CrowdPipeline {
    pub fn new(
        provider: Arc<ModelProvider>,
        preprocess: PreprocessConfig,
        heatmap: HeatmapConfig,
    ) -> Self {
        Self {
            provider,
            preprocess,
            heatmap,
            upload_limit: MAX_UPLOAD_BYTES,
        }
    }

    /// Build a pipeline (and its provider) from application settings.
    ///
    /// The settings' upload ceiling replaces the built-in default.
    pub fn from_settings(settings: &AppSettings) -> Self {
        let preprocess: PreprocessConfig = settings.input.into();
        let provider = Arc::new(ModelProvider::new(ModelSources {
            model_path: settings.resolved_model_path(),
            input_size: preprocess.input_size,
        }));
        Self {
            upload_limit: settings.upload.max_bytes,
            ..Self::new(provider, preprocess, settings.heatmap.into())
        }
    }

    /// The shared model provider backing this pipeline.
    pub fn provider(&self) -> &Arc<ModelProvider> {
        &self.provider
    }

    /// Process one upload from raw bytes to count plus heatmap.
    pub fn run(&self, candidate: &UploadCandidate) -> Result<InferenceResult, PipelineError> {
        let _guard = timing_guard("csrnet_core::pipeline_run", log::Level::Debug);
        debug!("{}: {}", Stage::Received.as_str(), candidate.filename);

        validate_with_limit(candidate, self.upload_limit)?;
        debug!("{}: {}", Stage::Validated.as_str(), candidate.filename);

        let original =
            decode_upload(&candidate.bytes).map_err(|source| PipelineError::Decode { source })?;
        let prep = preprocess_dynamic_image(&original, &self.preprocess)
            .map_err(|source| PipelineError::Inference { source })?;
        debug!(
            "{}: {} ({}x{} -> {}x{})",
            Stage::Preprocessed.as_str(),
            candidate.filename,
            prep.original_size.0,
            prep.original_size.1,
            self.preprocess.input_size.width,
            self.preprocess.input_size.height
        );

        let map = self
            .provider
            .predict(&prep)
            .map_err(|source| PipelineError::Inference { source })?;
        let count = map.sum();
        debug!(
            "{}: {} (count {:.2})",
            Stage::Inferred.as_str(),
            candidate.filename,
            count
        );

        let heatmap_png = heatmap::render_png(&map, &original, &self.heatmap)
            .map_err(|source| PipelineError::Render { source })?;
        let source_png = encode_rgb_png(&original.to_rgb8())
            .context("failed to re-encode source image")
            .map_err(|source| PipelineError::Render { source })?;
        debug!("{}: {}", Stage::Rendered.as_str(), candidate.filename);

        debug!("{}: {}", Stage::Completed.as_str(), candidate.filename);
        Ok(InferenceResult {
            count,
            heatmap_png,
            source_png,
            fallback: self.provider.is_fallback(),
        })
    }
}
