//! Feature lists: which derived features a model was trained on.
//!
//! A feature list file holds one expression per line over the columns of
//! [`RAW_COLUMNS`]. Blank lines and lines starting with `#` are ignored.

mod expr;

pub use expr::{BinOp, Compiled, Expr};

use std::path::Path;

use ndarray::{Array2, ArrayView2};
use tracing::{debug, info};

use crate::error::{PredictError, Result};

/// Marker for a feature value the models treat as missing.
pub const MISSING: f32 = f32::NAN;

/// Columns of a raw row handed over by the solver, in order.
pub const RAW_COLUMNS: &[&str] = &[
    "cl.glue_before_minim",
    "rdb0.last_touched",
    "rdb0.act_ranking_rel",
    "rdb0.uip1_ranking_rel",
    "rdb0.prop_ranking_rel",
    "rdb0.last_touched_diff",
    "cl.time_inside_solver",
    "rdb0.props_made",
    "rdb0_common.avg_props",
    "rdb0_common.avg_glue",
    "rdb0_common.avg_uip1_used",
    "rdb0.sum_props_made",
    "rdb0.discounted_props_made",
    "rdb0.discounted_uip1_used",
    "rdb0.sum_uip1_used",
    "rdb0.uip1_used",
    "rdb0.glue",
    "cl.glueHist_avg",
    "cl.atedecents_binIrred",
    "cl.glueHistLT_avg",
    "cl.glueHist_longterm_avg",
    "cl.num_antecedents",
    "cl.overlapHistLT_avg",
    "cl.conflSizeHist_avg",
    "cl.atedecents_binRed",
];

struct Feature {
    source: String,
    eval: Compiled,
}

/// Compiled feature expressions over a fixed raw row layout.
pub struct FeatureList {
    columns: Vec<String>,
    features: Vec<Feature>,
}

impl std::fmt::Debug for FeatureList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeatureList")
            .field("columns", &self.columns.len())
            .field("features", &self.sources().collect::<Vec<_>>())
            .finish()
    }
}

impl FeatureList {
    /// Read a feature list file, compiled against [`RAW_COLUMNS`].
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let list = Self::parse_with_columns(&text, RAW_COLUMNS).map_err(|e| match e {
            PredictError::EmptyFeatureList(_) => {
                PredictError::EmptyFeatureList(path.display().to_string())
            }
            other => other,
        })?;
        info!("loaded {} features from {}", list.len(), path.display());
        Ok(list)
    }

    pub fn parse(text: &str) -> Result<Self> {
        Self::parse_with_columns(text, RAW_COLUMNS)
    }

    /// Parse against an arbitrary raw row layout.
    pub fn parse_with_columns(text: &str, columns: &[&str]) -> Result<Self> {
        let mut features = Vec::new();
        for line in text.lines().map(str::trim) {
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let expr = Expr::parse(line)?;
            let eval = expr
                .compile(columns)
                .map_err(|column| PredictError::UnknownColumn {
                    expr: line.to_string(),
                    column,
                })?;
            debug!(feature = line, parsed = %expr, "compiled feature");
            features.push(Feature {
                source: line.to_string(),
                eval,
            });
        }
        if features.is_empty() {
            return Err(PredictError::EmptyFeatureList("<inline>".to_string()));
        }
        Ok(Self {
            columns: columns.iter().map(|c| c.to_string()).collect(),
            features,
        })
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Width a raw row must have.
    pub fn raw_width(&self) -> usize {
        self.columns.len()
    }

    /// Feature expressions as written in the list.
    pub fn sources(&self) -> impl Iterator<Item = &str> {
        self.features.iter().map(|f| f.source.as_str())
    }

    /// Derive the feature matrix, replacing every non-finite value by [`MISSING`].
    pub fn derive(&self, raw: ArrayView2<'_, f64>) -> Result<Array2<f32>> {
        let (rows, width) = raw.dim();
        if width != self.raw_width() {
            return Err(PredictError::RowWidth {
                expected: self.raw_width(),
                got: width,
            });
        }

        let mut out = Array2::from_elem((rows, self.features.len()), MISSING);
        let mut buf = vec![0.0; width];
        for (raw_row, mut out_row) in raw.outer_iter().zip(out.outer_iter_mut()) {
            for (dst, src) in buf.iter_mut().zip(raw_row.iter()) {
                *dst = *src;
            }
            for (cell, feature) in out_row.iter_mut().zip(&self.features) {
                let value = (feature.eval)(&buf) as f32;
                *cell = if value.is_finite() { value } else { MISSING };
            }
        }
        Ok(out)
    }
}
