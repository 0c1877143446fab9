//! One database from raw instrumentation to written datasets.

use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::config::ExtractConfig;
use crate::dataset::{DatasetMeta, DatasetSnapshot, output_stem};
use crate::error::Result;
use crate::labels::LabelMaterializer;
use crate::percentiles::PercentileIndex;
use crate::sampler::{SampleReport, StratifiedSampler};
use crate::store::{ClauseStore, IndexManager};
use crate::tier::Tier;

/// What happened to one tier.
#[derive(Debug, Clone, PartialEq)]
pub enum TierOutcome {
    Written {
        tier: Tier,
        dat: PathBuf,
        csv: Option<PathBuf>,
        manifest: PathBuf,
        rows: usize,
    },
    Skipped {
        tier: Tier,
        reason: String,
    },
}

impl TierOutcome {
    pub fn tier(&self) -> Tier {
        match self {
            Self::Written { tier, .. } | Self::Skipped { tier, .. } => *tier,
        }
    }
}

/// The `.json` file written next to each dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub source: String,
    pub generated_at: DateTime<Utc>,
    pub config: ExtractConfig,
    pub columns: Vec<String>,
    pub report: SampleReport,
}

fn with_suffix(stem: &Path, suffix: &str) -> PathBuf {
    let mut name = stem.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

/// Label, index and sample every tier of the database at `path`.
#[instrument(skip(path, config), fields(path = %path.display()))]
pub fn run_database(path: &Path, config: &ExtractConfig) -> Result<Vec<TierOutcome>> {
    config.validate()?;
    info!("Using sqlite3 DB file {}", path.display());

    let mut store = ClauseStore::open(path)?;
    store.set_dump_sql(config.dump_sql);
    prepare(&store, config)?;

    if let Some(dir) = &config.output_dir {
        std::fs::create_dir_all(dir)?;
    }
    let sampler = StratifiedSampler::new(&store, config.seed, config.durations)?;
    Tier::ALL
        .into_iter()
        .map(|tier| extract_tier(&sampler, &store, path, tier, config))
        .collect()
}

/// Recompute indexes, labels and percentiles.
pub fn prepare(store: &ClauseStore, config: &ExtractConfig) -> Result<()> {
    store.measure_size()?;

    let materializer = LabelMaterializer::new(store);
    materializer.reset_tables()?;
    let indexes = IndexManager::new(store);
    if config.recreate_indexes {
        indexes.recreate_indexes()?;
    } else {
        // resetting the label tables dropped their indexes
        indexes.ensure_indexes()?;
    }
    materializer.fill_all(&config.durations)?;

    let start = Instant::now();
    let index = PercentileIndex::new(store);
    for tier in Tier::ALL {
        index.fill_percentiles(tier, &[config.cut1, config.cut2])?;
        index.fit_labels(tier)?;
    }
    info!("percentiles filled T: {:.2?}", start.elapsed());
    Ok(())
}

fn extract_tier(
    sampler: &StratifiedSampler<'_>,
    store: &ClauseStore,
    input: &Path,
    tier: Tier,
    config: &ExtractConfig,
) -> Result<TierOutcome> {
    info!("------> Doing tier {}", tier);
    let skipped = |reason: &str| {
        warn!("-> Skipping file {} {}: {}", input.display(), tier, reason);
        TierOutcome::Skipped {
            tier,
            reason: reason.to_string(),
        }
    };

    if PercentileIndex::new(store).get_percentiles(tier)?.is_empty() {
        return Ok(skipped("no non-zero labels"));
    }
    let extraction = sampler.extract(tier, config.sample_limit(), config.cut1, config.cut2)?;
    if extraction.dataset.is_empty() {
        return Ok(skipped("no rows sampled"));
    }

    for summary in extraction.dataset.describe() {
        debug!(
            column = %summary.name,
            count = summary.count,
            mean = summary.mean,
            min = summary.min,
            max = summary.max,
            "describe"
        );
    }

    let stem = output_stem(
        input,
        config.output_dir.as_deref(),
        tier,
        config.cut1,
        config.cut2,
        config.limit,
    );
    let generated_at = Utc::now();
    let source = input.display().to_string();

    let csv = if config.csv {
        let csv = with_suffix(&stem, ".csv");
        info!("Dumping CSV data to: {}", csv.display());
        extraction.dataset.write_csv(&csv)?;
        Some(csv)
    } else {
        None
    };

    let manifest_path = with_suffix(&stem, ".json");
    let manifest = Manifest {
        source: source.clone(),
        generated_at,
        config: config.clone(),
        columns: extraction.dataset.columns().to_vec(),
        report: extraction.report,
    };
    std::fs::write(&manifest_path, serde_json::to_string_pretty(&manifest)?)?;

    let dat = with_suffix(&stem, ".dat");
    info!("Dumping data to: {}", dat.display());
    let rows = extraction.dataset.len();
    DatasetSnapshot {
        meta: DatasetMeta {
            source,
            tier,
            cut1: config.cut1,
            cut2: config.cut2,
            limit: config.limit,
            seed: config.seed,
            generated_at,
        },
        dataset: extraction.dataset,
    }
    .write(&dat)?;

    Ok(TierOutcome::Written {
        tier,
        dat,
        csv,
        manifest: manifest_path,
        rows,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::fixture;
    use tempfile::TempDir;

    const FIXTURE: &str = include_str!("../tests/fixtures/instrumentation.sql");

    fn database(dir: &TempDir, clauses: i64) -> PathBuf {
        let path = dir.path().join("run.cnf.gz.sqlite");
        let store = ClauseStore::create(&path).unwrap();
        store.execute_batch(FIXTURE).unwrap();
        fixture::populate(&store, clauses);
        path
    }

    #[test]
    fn test_with_suffix_keeps_dots() {
        let stem = Path::new("/x/a-cut1-20.0-cut2-50.0-limit-10");
        assert_eq!(
            with_suffix(stem, ".dat"),
            PathBuf::from("/x/a-cut1-20.0-cut2-50.0-limit-10.dat")
        );
    }

    #[test]
    fn test_run_database_writes_every_tier() {
        let dir = TempDir::new().unwrap();
        let path = database(&dir, 100);
        let config = ExtractConfig {
            limit: 30,
            csv: true,
            ..ExtractConfig::default()
        };

        let outcomes = run_database(&path, &config).unwrap();
        assert_eq!(outcomes.len(), 4);

        let TierOutcome::Written { dat, csv, manifest, rows, .. } = &outcomes[0] else {
            panic!("short tier skipped: {:?}", outcomes[0]);
        };
        assert_eq!(*rows, 30);
        assert_eq!(
            dat.file_name().unwrap(),
            "run-cldata-short-cut1-20.0-cut2-50.0-limit-30.dat"
        );
        assert!(csv.as_ref().unwrap().exists());

        let snapshot = DatasetSnapshot::read(dat).unwrap();
        assert_eq!(snapshot.dataset.len(), 30);
        assert_eq!(snapshot.meta.tier, Tier::Short);

        let manifest: Manifest =
            serde_json::from_str(&std::fs::read_to_string(manifest).unwrap()).unwrap();
        assert_eq!(manifest.report.rows, 30);
        assert_eq!(manifest.config.limit, 30);
    }

    #[test]
    fn test_prepare_without_recreate_keeps_percentile_indexes() {
        let dir = TempDir::new().unwrap();
        let path = database(&dir, 20);
        let store = ClauseStore::open(&path).unwrap();
        let config = ExtractConfig {
            recreate_indexes: false,
            ..ExtractConfig::default()
        };

        prepare(&store, &config).unwrap();
        prepare(&store, &config).unwrap();

        let existing = IndexManager::new(&store).existing().unwrap();
        assert!(existing.iter().any(|n| n == "used_later_percentiles_idx2"));
        assert!(existing.iter().any(|n| n == "used_later_percentiles_idx3"));
    }

    #[test]
    fn test_tier_without_labels_is_skipped() {
        let dir = TempDir::new().unwrap();
        // one clause that is never used: every label is zero
        let path = dir.path().join("empty.db");
        {
            let store = ClauseStore::create(&path).unwrap();
            store.execute_batch(FIXTURE).unwrap();
            fixture::add_globals(&store, 1);
            fixture::add_clause(&store, 1, 0, 1_000_000);
            fixture::add_usage_summary(&store, 1, 0, 0);
            fixture::add_snapshot(&store, 1, 1, 100, 1);
        }

        let outcomes = run_database(&path, &ExtractConfig::default()).unwrap();
        assert_eq!(outcomes.len(), 4);
        for outcome in &outcomes {
            assert!(matches!(outcome, TierOutcome::Skipped { .. }), "{:?}", outcome);
        }
        assert_eq!(outcomes[3].tier(), Tier::ForeverDiv);
    }

    #[test]
    fn test_output_dir_is_created() {
        let dir = TempDir::new().unwrap();
        let path = database(&dir, 20);
        let out = dir.path().join("nested").join("out");
        let config = ExtractConfig {
            limit: -1,
            output_dir: Some(out.clone()),
            ..ExtractConfig::default()
        };

        let outcomes = run_database(&path, &config).unwrap();
        let TierOutcome::Written { dat, csv, .. } = &outcomes[0] else {
            panic!("short tier skipped");
        };
        assert!(dat.starts_with(&out));
        assert!(csv.is_none());
    }
}
