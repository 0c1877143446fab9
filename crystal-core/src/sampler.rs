//! Stratified sampling of training rows.
//!
//! Rows are split three ways by label value and, inside each value stratum,
//! three ways by dump generation. Strata share the row budget equally and
//! generations share a stratum's budget 2:1:1, so rare high-value rows and
//! early snapshots are not drowned out by the zero-label majority.
//!
//! A first pass runs at the requested size and finds buckets that cannot
//! fill their quota. The budget is then lowered to the largest total whose
//! quotas every bucket can meet, and a second pass draws the final rows.

use rusqlite::ToSql;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::config::TierDurations;
use crate::dataset::Dataset;
use crate::error::Result;
use crate::labels::LabelSpec;
use crate::percentiles::{NO_LOWER_BOUND, PercentileIndex, PercentileLookup};
use crate::query::{DumpBucket, TrainingQuery, ValueRange};
use crate::store::{ClauseStore, Schema};
use crate::tier::Tier;

/// Relative shares of the three value strata.
pub const STRATUM_PARTS: [u64; 3] = [1, 1, 1];

/// Requested number of rows per tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SampleLimit {
    /// Every matching row, no calibration.
    All,
    Total(u64),
}

impl From<i64> for SampleLimit {
    fn from(limit: i64) -> Self {
        if limit < 0 {
            Self::All
        } else {
            Self::Total(limit as u64)
        }
    }
}

/// Split `total` in proportion to `parts` by largest remainder.
///
/// The result always sums to `total`; leftover units go to the largest
/// remainders, ties to the earlier index.
pub fn apportion(total: u64, parts: &[u64]) -> Vec<u64> {
    let sum: u64 = parts.iter().sum();
    if sum == 0 {
        return vec![0; parts.len()];
    }
    let mut shares: Vec<u64> = parts.iter().map(|p| total * p / sum).collect();
    let remainders: Vec<u64> = parts.iter().map(|p| total * p % sum).collect();

    let assigned: u64 = shares.iter().sum();
    let mut order: Vec<usize> = (0..parts.len()).collect();
    order.sort_by(|&a, &b| remainders[b].cmp(&remainders[a]));
    for &idx in order.iter().take((total - assigned) as usize) {
        shares[idx] += 1;
    }
    shares
}

/// Per-bucket quotas at `total`, stratum-major.
pub fn quotas(total: u64) -> Vec<(usize, DumpBucket, u64)> {
    let bucket_parts: Vec<u64> = DumpBucket::ALL.iter().map(DumpBucket::parts).collect();
    apportion(total, &STRATUM_PARTS)
        .into_iter()
        .enumerate()
        .flat_map(|(stratum, share)| {
            apportion(share, &bucket_parts)
                .into_iter()
                .zip(DumpBucket::ALL)
                .map(move |(quota, bucket)| (stratum, bucket, quota))
        })
        .collect()
}

/// Total at which `rows` would exactly fill the quota of `bucket` in `stratum`.
fn implied_total(stratum: usize, bucket: DumpBucket, rows: u64) -> u64 {
    let strata: u64 = STRATUM_PARTS.iter().sum();
    let buckets: u64 = DumpBucket::ALL.iter().map(DumpBucket::parts).sum();
    rows * strata * buckets / (STRATUM_PARTS[stratum] * bucket.parts())
}

/// Largest total, up to `requested`, whose quotas every bucket can meet.
pub fn calibrate(counts: &[BucketCount], requested: u64) -> u64 {
    counts
        .iter()
        .filter(|c| c.is_starved())
        .map(|c| implied_total(c.stratum, c.bucket, c.rows))
        .fold(requested, u64::min)
}

/// One value stratum, between two top-percentiles.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Stratum {
    pub index: usize,
    /// Top-percentile where the stratum starts.
    pub from_percentile: f64,
    /// Top-percentile where the stratum ends; 100 includes zero labels.
    pub to_percentile: f64,
    pub range: ValueRange,
}

/// Stratum ranges for cut points `cut1 < cut2`.
pub fn strata(lookup: &PercentileLookup, cut1: f64, cut2: f64) -> Result<[Stratum; 3]> {
    let bounds = [0.0, cut1, cut2, NO_LOWER_BOUND];
    let lower = [
        lookup.lower_bound(cut1)?,
        lookup.lower_bound(cut2)?,
        lookup.lower_bound(NO_LOWER_BOUND)?,
    ];
    if lower[0] == lower[1] {
        warn!(
            "tier {}: cut points {}% and {}% share threshold {}, middle stratum is empty",
            lookup.tier(),
            cut1,
            cut2,
            lower[0]
        );
    }
    let upper = [None, Some(lower[0]), Some(lower[1])];
    Ok(std::array::from_fn(|index| Stratum {
        index,
        from_percentile: bounds[index],
        to_percentile: bounds[index + 1],
        range: ValueRange {
            lower: lower[index],
            upper: upper[index],
        },
    }))
}

/// Rows drawn from one (stratum, bucket) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketCount {
    pub stratum: usize,
    pub bucket: DumpBucket,
    /// `None` when sampling without a limit.
    pub quota: Option<u64>,
    pub rows: u64,
}

impl BucketCount {
    pub fn is_starved(&self) -> bool {
        self.quota.is_some_and(|quota| self.rows < quota)
    }
}

/// What one extraction did.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleReport {
    pub tier: Tier,
    pub requested: SampleLimit,
    /// Total after calibration; `None` when every row was taken.
    pub calibrated: Option<u64>,
    /// Whether the discovery pass rows were kept as the result.
    pub discovery_reused: bool,
    pub strata: Vec<Stratum>,
    pub buckets: Vec<BucketCount>,
    pub rows: usize,
}

/// Sampled rows and the report describing them.
#[derive(Debug, Clone)]
pub struct Extraction {
    pub dataset: Dataset,
    pub report: SampleReport,
}

struct Pass {
    parts: Vec<Dataset>,
    counts: Vec<BucketCount>,
}

impl Pass {
    fn finish(self) -> Result<(Dataset, Vec<BucketCount>)> {
        Ok((Dataset::concat(self.parts)?, self.counts))
    }
}

/// Draws stratified samples from one store.
pub struct StratifiedSampler<'a> {
    store: &'a ClauseStore,
    query: TrainingQuery,
    durations: TierDurations,
}

impl<'a> StratifiedSampler<'a> {
    /// Validate the store's schema and seed its random ordering.
    pub fn new(store: &'a ClauseStore, seed: u64, durations: TierDurations) -> Result<Self> {
        let schema = Schema::introspect(store.conn())?;
        let query = TrainingQuery::build(&schema)?;
        store.install_random_source(seed)?;
        Ok(Self {
            store,
            query,
            durations,
        })
    }

    pub fn query(&self) -> &TrainingQuery {
        &self.query
    }

    /// Sample up to `limit` rows of `tier`, stratified at `cut1` and `cut2`.
    #[instrument(skip(self))]
    pub fn extract(
        &self,
        tier: Tier,
        limit: SampleLimit,
        cut1: f64,
        cut2: f64,
    ) -> Result<Extraction> {
        let lookup = PercentileIndex::new(self.store).get_percentiles(tier)?;
        let strata = strata(&lookup, cut1, cut2)?;
        for s in &strata {
            info!(
                "value strata perc: ({}, {}) translates to value strata {:?}",
                s.from_percentile, s.to_percentile, s.range
            );
        }

        let (dataset, counts, calibrated, discovery_reused) = match limit {
            SampleLimit::All => {
                let (dataset, counts) = self.run_pass(tier, &strata, None)?.finish()?;
                (dataset, counts, None, false)
            }
            SampleLimit::Total(requested) => {
                let discovery = self.run_pass(tier, &strata, Some(requested))?;
                let calibrated = calibrate(&discovery.counts, requested);
                info!("Setting limit to minimum of all weighted sizes: {}", calibrated);
                if calibrated == requested {
                    let (dataset, counts) = discovery.finish()?;
                    (dataset, counts, Some(calibrated), true)
                } else {
                    let commit = self.run_pass(tier, &strata, Some(calibrated))?;
                    let (dataset, counts) = commit.finish()?;
                    (dataset, counts, Some(calibrated), false)
                }
            }
        };

        info!("Queries finished for tier {}, total rows: {}", tier, dataset.len());
        let report = SampleReport {
            tier,
            requested: limit,
            calibrated,
            discovery_reused,
            strata: strata.to_vec(),
            buckets: counts,
            rows: dataset.len(),
        };
        Ok(Extraction { dataset, report })
    }

    fn run_pass(&self, tier: Tier, strata: &[Stratum; 3], total: Option<u64>) -> Result<Pass> {
        let plan: Vec<(usize, DumpBucket, Option<u64>)> = match total {
            Some(total) => quotas(total)
                .into_iter()
                .map(|(s, b, q)| (s, b, Some(q)))
                .collect(),
            None => (0..strata.len())
                .flat_map(|s| DumpBucket::ALL.into_iter().map(move |b| (s, b, None)))
                .collect(),
        };

        let observe = LabelSpec::for_tier(tier, &self.durations).observe;
        let mut parts = Vec::with_capacity(plan.len());
        let mut counts = Vec::with_capacity(plan.len());
        for (stratum, bucket, quota) in plan {
            let range = &strata[stratum].range;
            let part = self.query_bucket(tier, bucket, range, observe, quota)?;
            let count = BucketCount {
                stratum,
                bucket,
                quota,
                rows: part.len() as u64,
            };
            if count.is_starved() {
                warn!(
                    "stratum {} '{}' starved: {} rows for quota {:?}",
                    stratum, bucket, count.rows, quota
                );
            } else {
                debug!("stratum {} '{}': {} rows", stratum, bucket, count.rows);
            }
            parts.push(part);
            counts.push(count);
        }
        Ok(Pass { parts, counts })
    }

    fn query_bucket(
        &self,
        tier: Tier,
        bucket: DumpBucket,
        range: &ValueRange,
        observe: i64,
        quota: Option<u64>,
    ) -> Result<Dataset> {
        let sql = self.query.stratum_sql(tier, bucket, range, quota.is_some());
        let limit = quota.map(|q| q as i64);

        let mut params: Vec<(&str, &dyn ToSql)> = vec![
            (":observe", &observe as &dyn ToSql),
            (":lower", &range.lower as &dyn ToSql),
        ];
        if let Some(upper) = range.upper.as_ref() {
            params.push((":upper", upper as &dyn ToSql));
        }
        if let Some(limit) = limit.as_ref() {
            params.push((":limit", limit as &dyn ToSql));
        }
        self.store.query_dataset(&sql, params.as_slice())
    }
}
