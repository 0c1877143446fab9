//! Extraction settings.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::sampler::SampleLimit;

/// Default number of training rows per tier.
pub const DEFAULT_LIMIT: i64 = 20_000;
pub const DEFAULT_CUT1: f64 = 20.0;
pub const DEFAULT_CUT2: f64 = 50.0;
pub const DEFAULT_SHORT: u64 = 10_000;
pub const DEFAULT_LONG: u64 = 50_000;
/// Seed of the sampler's random ordering.
pub const DEFAULT_SEED: u64 = 2_097_483;

/// Window lengths, in conflicts, of the bounded tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TierDurations {
    pub short: u64,
    pub long: u64,
}

impl Default for TierDurations {
    fn default() -> Self {
        Self {
            short: DEFAULT_SHORT,
            long: DEFAULT_LONG,
        }
    }
}

/// Settings for one extraction run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractConfig {
    /// Total rows per tier; negative takes every row.
    pub limit: i64,
    /// Upper value stratum: top `cut1`% of non-zero labels.
    pub cut1: f64,
    /// Middle value stratum ends at the top `cut2`%.
    pub cut2: f64,
    pub seed: u64,
    /// Also write a CSV next to each dataset.
    pub csv: bool,
    /// Log every SQL statement.
    pub dump_sql: bool,
    pub recreate_indexes: bool,
    /// Directory for outputs; next to the input when unset.
    pub output_dir: Option<PathBuf>,
    pub durations: TierDurations,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            limit: DEFAULT_LIMIT,
            cut1: DEFAULT_CUT1,
            cut2: DEFAULT_CUT2,
            durations: TierDurations::default(),
            seed: DEFAULT_SEED,
            csv: false,
            dump_sql: false,
            recreate_indexes: true,
            output_dir: None,
        }
    }
}

impl ExtractConfig {
    pub fn sample_limit(&self) -> SampleLimit {
        SampleLimit::from(self.limit)
    }

    /// Reject settings the sampler cannot honor.
    pub fn validate(&self) -> Result<()> {
        if !(self.cut1 >= 0.0 && self.cut1 < self.cut2 && self.cut2 < 100.0) {
            return Err(Error::Config(format!(
                "cut points must satisfy 0 <= cut1 < cut2 < 100, got cut1={} cut2={}",
                self.cut1, self.cut2
            )));
        }
        if self.durations.short == 0 || self.durations.long == 0 {
            return Err(Error::Config(format!(
                "tier durations must be positive, got short={} long={}",
                self.durations.short, self.durations.long
            )));
        }
        Ok(())
    }
}
