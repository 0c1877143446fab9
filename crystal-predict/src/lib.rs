//! crystal-predict - clause usefulness scoring inside a solver
//!
//! Loads a feature list and one model per tier once, then turns raw clause
//! rows into derived features and per-tier scores. Non-finite feature values
//! become [`MISSING`] before they reach a model.

pub mod context;
pub mod error;
pub mod features;
pub mod model;

pub use context::{PredictionContext, TierScores, load_models};
pub use error::{PredictError, Result};
pub use features::{FeatureList, MISSING, RAW_COLUMNS};
pub use model::{OnnxTierModel, TierModel};
