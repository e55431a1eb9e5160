//! ONNX model loading and execution for the density estimator.

use std::path::{Path, PathBuf};

use anyhow::Result;
use log::{debug, warn};
use thiserror::Error;
use tract_onnx::prelude::{
    Framework, Graph, InferenceModelExt, IntoTensor, SimplePlan, Tensor, TypedFact, TypedOp, tvec,
};

use crate::density::DensityMap;
use crate::preprocess::InputSize;

type RunnableModel = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// Spatial downsampling factor between the model input and its density
/// output. CSRNet's dilated backbone reduces each side by 8.
pub const DENSITY_STRIDE: u32 = 8;

/// Why a model artifact could not be turned into a runnable plan.
///
/// Callers treat these as recoverable: the provider logs the error and
/// falls back to the stub predictor instead of failing requests.
#[derive(Debug, Error)]
pub enum ModelLoadError {
    #[error("model artifact not found: {path}")]
    MissingArtifact { path: PathBuf },
    #[error("input {width}x{height} is not divisible by the model stride {stride}")]
    MisalignedInput { width: u32, height: u32, stride: u32 },
    #[error("failed to prepare model graph from {path}: {source}")]
    Graph {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },
}

/// Wrapper around the runnable CSRNet ONNX plan.
///
/// Handles loading the graph, preparing it for execution, and turning raw
/// inference output into a [`DensityMap`].
#[derive(Debug)]
pub struct CsrnetModel {
    runnable: RunnableModel,
    input_size: InputSize,
}

impl CsrnetModel {
    /// Load and optimize the ONNX graph for a specific input size.
    pub fn load<P: AsRef<Path>>(model_path: P, input_size: InputSize) -> Result<Self, ModelLoadError> {
        let path = model_path.as_ref();
        if !path.exists() {
            return Err(ModelLoadError::MissingArtifact {
                path: path.to_path_buf(),
            });
        }
        if input_size.width % DENSITY_STRIDE != 0 || input_size.height % DENSITY_STRIDE != 0 {
            return Err(ModelLoadError::MisalignedInput {
                width: input_size.width,
                height: input_size.height,
                stride: DENSITY_STRIDE,
            });
        }

        let runnable = match load_runnable_model(path, true) {
            Ok(model) => {
                debug!(
                    target: "csrnet::model",
                    "model {} optimized successfully ({}x{})",
                    path.display(),
                    input_size.width,
                    input_size.height
                );
                model
            }
            Err(opt_err) => {
                warn!(
                    target: "csrnet::model",
                    "model {} failed optimized load ({opt_err}); falling back to decluttered graph",
                    path.display()
                );
                load_runnable_model(path, false).map_err(|source| ModelLoadError::Graph {
                    path: path.to_path_buf(),
                    source,
                })?
            }
        };

        Ok(Self {
            runnable,
            input_size,
        })
    }

    /// Execute the model with a preprocessed tensor and return the decoded
    /// density map.
    ///
    /// Execution is deterministic for identical input tensors; the plan is
    /// read-only and may be shared across threads.
    pub fn run(&self, input: &Tensor) -> Result<DensityMap> {
        let outputs = self
            .runnable
            .run(tvec![input.clone().into()])
            .map_err(|e| anyhow::anyhow!("model execution failed: {e}"))?;

        let output = outputs
            .into_iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("model produced no outputs"))?
            .into_tensor();

        let grid_w = (self.input_size.width / DENSITY_STRIDE) as usize;
        let grid_h = (self.input_size.height / DENSITY_STRIDE) as usize;
        let cells = output
            .as_slice::<f32>()
            .map_err(|e| anyhow::anyhow!("density output not f32: {e}"))?;
        anyhow::ensure!(
            cells.len() == grid_w * grid_h,
            "unexpected density output size: expected {}x{} cells, got {} values (shape {:?})",
            grid_w,
            grid_h,
            cells.len(),
            output.shape()
        );

        DensityMap::from_raw(grid_w, grid_h, cells.to_vec())
            .ok_or_else(|| anyhow::anyhow!("density output dimensions are inconsistent"))
    }

    pub fn input_size(&self) -> InputSize {
        self.input_size
    }
}

fn load_runnable_model(path: &Path, optimized: bool) -> Result<RunnableModel> {
    // Let the graph infer its shape from the ONNX file; the input size is
    // used for preprocessing and density-grid decoding.
    let model = tract_onnx::onnx()
        .model_for_path(path)
        .map_err(|e| anyhow::anyhow!("failed to parse ONNX graph from {}: {e}", path.display()))?;

    if optimized {
        model
            .into_optimized()
            .map_err(|e| anyhow::anyhow!("unable to optimize graph: {e}"))?
            .into_runnable()
            .map_err(|e| anyhow::anyhow!("unable to make graph runnable: {e}"))
    } else {
        model
            .into_typed()
            .map_err(|e| anyhow::anyhow!("unable to type-check graph: {e}"))?
            .into_decluttered()
            .map_err(|e| anyhow::anyhow!("unable to declutter graph: {e}"))?
            .into_runnable()
            .map_err(|e| anyhow::anyhow!("unable to make graph runnable: {e}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn loading_missing_model_reports_missing_artifact() {
        let err = CsrnetModel::load("missing.onnx", InputSize::default())
            .expect_err("missing model should fail");
        assert!(matches!(err, ModelLoadError::MissingArtifact { .. }));
    }

    #[test]
    fn misaligned_input_size_is_rejected() {
        let mut temp = NamedTempFile::new().expect("temp file");
        temp.write_all(b"placeholder").expect("write");

        let err = CsrnetModel::load(temp.path(), InputSize::new(100, 96))
            .expect_err("misaligned input should fail");
        assert!(matches!(err, ModelLoadError::MisalignedInput { .. }));
    }

    #[test]
    fn invalid_model_produces_useful_error() {
        let mut temp = NamedTempFile::new().expect("temp file");
        temp.write_all(b"not a real onnx file")
            .expect("write mock model");

        let err = CsrnetModel::load(temp.path(), InputSize::default())
            .expect_err("invalid ONNX should fail");
        let message = format!("{err}");
        assert!(
            message.contains("failed to prepare model graph"),
            "unexpected error message: {message}"
        );
    }
}
