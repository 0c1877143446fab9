//! Prediction context: one feature list and a model per tier.

use std::path::Path;

use ndarray::{Array2, ArrayView2};
use tracing::{debug, info, instrument};

use crate::error::{PredictError, Result};
use crate::features::FeatureList;
use crate::model::{OnnxTierModel, TierModel};

/// Scores for each input row, per tier.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TierScores {
    pub short: Vec<f32>,
    pub long: Vec<f32>,
    pub forever: Vec<f32>,
}

impl TierScores {
    pub fn len(&self) -> usize {
        self.short.len()
    }

    pub fn is_empty(&self) -> bool {
        self.short.is_empty()
    }
}

/// Everything needed to score clauses, loaded once.
pub struct PredictionContext {
    features: FeatureList,
    short: Box<dyn TierModel>,
    long: Box<dyn TierModel>,
    forever: Box<dyn TierModel>,
}

impl std::fmt::Debug for PredictionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PredictionContext")
            .field("features", &self.features)
            .field("short", &self.short.name())
            .field("long", &self.long.name())
            .field("forever", &self.forever.name())
            .finish()
    }
}

fn score(model: &mut dyn TierModel, features: ArrayView2<'_, f32>) -> Result<Vec<f32>> {
    let scores = model.predict(features)?;
    if scores.len() != features.nrows() {
        return Err(PredictError::Shape {
            model: model.name(),
            expected: features.nrows(),
            got: scores.len(),
        });
    }
    Ok(scores)
}

/// Load the three tier models and the feature list they were trained on.
#[instrument(skip_all, fields(features = %feature_list.display()))]
pub fn load_models(
    short: &Path,
    long: &Path,
    forever: &Path,
    feature_list: &Path,
) -> Result<PredictionContext> {
    let features = FeatureList::load(feature_list)?;
    let context = PredictionContext::from_parts(
        features,
        Box::new(OnnxTierModel::load(short)?),
        Box::new(OnnxTierModel::load(long)?),
        Box::new(OnnxTierModel::load(forever)?),
    );
    info!("prediction context ready");
    Ok(context)
}

impl PredictionContext {
    pub fn from_parts(
        features: FeatureList,
        short: Box<dyn TierModel>,
        long: Box<dyn TierModel>,
        forever: Box<dyn TierModel>,
    ) -> Self {
        Self {
            features,
            short,
            long,
            forever,
        }
    }

    pub fn features(&self) -> &FeatureList {
        &self.features
    }

    /// Derived feature matrix for `raw`, non-finite values replaced by `MISSING`.
    pub fn derive(&self, raw: ArrayView2<'_, f64>) -> Result<Array2<f32>> {
        self.features.derive(raw)
    }

    /// Score every row of `raw` with all three tier models.
    pub fn predict(&mut self, raw: ArrayView2<'_, f64>) -> Result<TierScores> {
        let derived = self.derive(raw)?;
        debug!(rows = derived.nrows(), features = derived.ncols(), "scoring");
        if derived.nrows() == 0 {
            return Ok(TierScores::default());
        }
        let view = derived.view();
        Ok(TierScores {
            short: score(self.short.as_mut(), view)?,
            long: score(self.long.as_mut(), view)?,
            forever: score(self.forever.as_mut(), view)?,
        })
    }

    /// Same as [`predict`](Self::predict) for rows held as vectors.
    pub fn predict_rows(&mut self, rows: &[Vec<f64>]) -> Result<TierScores> {
        let width = self.features.raw_width();
        if let Some(row) = rows.iter().find(|r| r.len() != width) {
            return Err(PredictError::RowWidth {
                expected: width,
                got: row.len(),
            });
        }
        let flat: Vec<f64> = rows.iter().flatten().copied().collect();
        let raw = Array2::from_shape_vec((rows.len(), width), flat).map_err(|_| {
            PredictError::RowWidth {
                expected: width,
                got: 0,
            }
        })?;
        self.predict(raw.view())
    }
}
