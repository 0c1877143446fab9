//! Tier models: anything that scores a derived feature matrix.

use std::path::{Path, PathBuf};

use ndarray::ArrayView2;
use ort::session::Session;
use tracing::{debug, info};

use crate::error::{PredictError, Result};

/// Scores each row of a feature matrix.
///
/// One score per input row, in input order.
pub trait TierModel: Send {
    fn predict(&mut self, features: ArrayView2<'_, f32>) -> Result<Vec<f32>>;

    /// Name used in logs and errors.
    fn name(&self) -> String {
        "model".to_string()
    }
}

/// A tree-ensemble model exported to ONNX.
pub struct OnnxTierModel {
    session: Session,
    path: PathBuf,
}

impl std::fmt::Debug for OnnxTierModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OnnxTierModel")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl OnnxTierModel {
    pub fn load(path: &Path) -> Result<Self> {
        let session = Session::builder()?.commit_from_file(path)?;
        info!("loaded model {}", path.display());
        Ok(Self {
            session,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TierModel for OnnxTierModel {
    fn predict(&mut self, features: ArrayView2<'_, f32>) -> Result<Vec<f32>> {
        let rows = features.nrows();
        let model = self.name();
        let shape: Vec<usize> = features.shape().to_vec();
        let data: Vec<f32> = features.iter().copied().collect();

        let input = ort::value::TensorRef::from_array_view((shape.as_slice(), data.as_slice()))?;
        let outputs = self.session.run(ort::inputs![input])?;

        // First output holds the scores; a [rows, k] output keeps its last column.
        let Some((_name, output)) = outputs.iter().next() else {
            return Err(PredictError::Shape {
                model,
                expected: rows,
                got: 0,
            });
        };
        let (out_shape, values) = output.try_extract_tensor::<f32>()?;
        let dims: Vec<usize> = out_shape.iter().map(|&d| d as usize).collect();
        debug!(%model, ?dims, "inference done");

        let scores: Vec<f32> = match dims.as_slice() {
            [n, k] if *k > 0 && *n == rows => values.chunks(*k).map(|c| c[k - 1]).collect(),
            _ => values.to_vec(),
        };
        if scores.len() != rows {
            return Err(PredictError::Shape {
                model,
                expected: rows,
                got: scores.len(),
            });
        }
        Ok(scores)
    }

    fn name(&self) -> String {
        self.path.display().to_string()
    }
}
