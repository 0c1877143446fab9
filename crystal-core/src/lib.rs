//! crystal-core - training-data extraction from SAT solver instrumentation
//!
//! A solver run writes a SQLite database describing every learnt clause and
//! every snapshot taken when the clause database was reduced. This crate
//! turns such a database into balanced training sets:
//!
//! - [`store`] opens the database, validates its schema and manages indexes
//! - [`labels`] derives "used later" labels for four horizons ([`Tier`])
//! - [`percentiles`] records cut points of each label distribution
//! - [`sampler`] draws stratified, calibrated samples through [`query`]
//! - [`pipeline`] runs all of the above and writes [`dataset`] files

pub mod config;
pub mod dataset;
pub mod error;
pub mod labels;
pub mod percentiles;
pub mod pipeline;
pub mod query;
pub mod sampler;
pub mod store;
pub mod tier;

pub use config::{ExtractConfig, TierDurations};
pub use dataset::{Dataset, DatasetMeta, DatasetSnapshot, Value};
pub use error::{Error, Result};
pub use labels::{LabelMaterializer, LabelSpec};
pub use percentiles::{PercentileIndex, PercentileLookup};
pub use pipeline::{Manifest, TierOutcome, run_database};
pub use query::{DumpBucket, TrainingQuery, ValueRange};
pub use sampler::{Extraction, SampleLimit, SampleReport, StratifiedSampler};
pub use store::{ClauseStore, IndexManager};
pub use tier::Tier;
