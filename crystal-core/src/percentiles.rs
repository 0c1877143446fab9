//! Percentile cut points over non-zero labels.
//!
//! Zero labels are by far the most common value, so they are left out of the
//! distribution and form their own implicit bucket. The threshold of "top p%"
//! is the smallest value among the `ceil(n * p / 100)` largest non-zero labels;
//! thresholds therefore never increase as `p` grows.
//!
//! Percentile 100 is reserved for "no lower bound": it is never stored and
//! [`PercentileLookup::lower_bound`] maps it to 0, so the last stratum
//! includes every zero label.

use std::collections::BTreeMap;

use tracing::{debug, info, instrument, warn};

use crate::error::{Error, Result};
use crate::labels::{LabelMaterializer, PERCENTILES_TABLE};
use crate::store::ClauseStore;
use crate::tier::Tier;

/// Descriptor of the percentiles computed over non-zero labels.
pub const NON_ZERO_DESCR: &str = "top_non_zero";

/// The reserved "everything, including zero" percentile.
pub const NO_LOWER_BOUND: f64 = 100.0;

/// Percentiles recorded for every tier.
pub const STANDARD_PERCENTILES: &[f64] = &[
    0.0, 0.5, 1.0, 2.0, 3.0, 5.0, 10.0, 15.0, 20.0, 25.0, 30.0, 35.0, 40.0, 45.0, 50.0, 60.0,
    70.0, 80.0, 90.0, 95.0,
];

/// Offset, in a descending sort of `n` values, of the "top `pct`%" threshold.
pub fn rank_offset(n: u64, pct: f64) -> u64 {
    if n == 0 || pct <= 0.0 {
        return 0;
    }
    let top = (n as f64 * pct / 100.0).ceil() as u64;
    top.saturating_sub(1).min(n - 1)
}

fn percentile_key(descr: &str, pct: f64) -> String {
    format!("{}_{:?}_perc", descr, pct)
}

/// Computes, fits and reads percentile cut points.
pub struct PercentileIndex<'a> {
    store: &'a ClauseStore,
}

impl<'a> PercentileIndex<'a> {
    pub fn new(store: &'a ClauseStore) -> Self {
        Self { store }
    }

    /// Replace the cut points of `tier` with the standard set plus `extra`.
    ///
    /// Returns the number of cut points written; 0 when the tier has no
    /// non-zero label.
    #[instrument(skip(self))]
    pub fn fill_percentiles(&self, tier: Tier, extra: &[f64]) -> Result<usize> {
        LabelMaterializer::new(self.store).ensure_tables()?;
        let table = tier.label_table();

        let mut percentiles: Vec<f64> = STANDARD_PERCENTILES
            .iter()
            .chain(extra)
            .copied()
            .filter(|p| (0.0..NO_LOWER_BOUND).contains(p))
            .collect();
        percentiles.sort_by(f64::total_cmp);
        percentiles.dedup();

        let tx = self.store.conn().unchecked_transaction()?;
        self.store.execute(
            &format!("DELETE FROM {PERCENTILES_TABLE} WHERE type_of_dat = ?1"),
            [tier.as_str()],
        )?;

        let non_zero: i64 = self.store.conn().query_row(
            &format!("SELECT COUNT(*) FROM {table} WHERE used_later > 0"),
            [],
            |row| row.get(0),
        )?;
        if non_zero == 0 {
            tx.commit()?;
            warn!("tier {} has no non-zero labels, no percentiles recorded", tier);
            return Ok(0);
        }

        let select = format!(
            "SELECT used_later FROM {table} WHERE used_later > 0
             ORDER BY used_later DESC LIMIT 1 OFFSET ?1"
        );
        let insert = format!(
            "INSERT INTO {PERCENTILES_TABLE} (type_of_dat, percentile_descr, percentile, val)
             VALUES (?1, ?2, ?3, ?4)"
        );
        for &pct in &percentiles {
            let offset = rank_offset(non_zero as u64, pct) as i64;
            let val: f64 = self
                .store
                .conn()
                .query_row(&select, [offset], |row| row.get(0))?;
            debug!(tier = %tier, pct, val, "percentile");
            self.store.execute(
                &insert,
                rusqlite::params![tier.as_str(), NON_ZERO_DESCR, pct, val],
            )?;
        }
        tx.commit()?;

        info!(
            "{} percentiles recorded for tier {} over {} non-zero labels",
            percentiles.len(),
            tier,
            non_zero
        );
        Ok(percentiles.len())
    }

    /// Stamp every label of `tier` with the tightest top-percentile it reaches.
    ///
    /// Zero labels, and labels below every recorded threshold, get 100.
    pub fn fit_labels(&self, tier: Tier) -> Result<usize> {
        let table = tier.label_table();
        let updated = self.store.execute(
            &format!(
                "UPDATE {table} SET percentile_fit = CASE
                    WHEN used_later > 0 THEN COALESCE(
                        (SELECT min(p.percentile) FROM {PERCENTILES_TABLE} AS p
                         WHERE p.type_of_dat = ?1
                         AND p.percentile_descr = ?2
                         AND p.val <= {table}.used_later),
                        ?3)
                    ELSE ?3 END"
            ),
            rusqlite::params![tier.as_str(), NON_ZERO_DESCR, NO_LOWER_BOUND],
        )?;
        Ok(updated)
    }

    /// Cut points recorded for `tier`.
    pub fn get_percentiles(&self, tier: Tier) -> Result<PercentileLookup> {
        let mut stmt = self.store.conn().prepare(&format!(
            "SELECT percentile_descr, percentile, val FROM {PERCENTILES_TABLE}
             WHERE type_of_dat = ?1"
        ))?;
        let rows = stmt
            .query_map([tier.as_str()], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, f64>(1)?,
                    row.get::<_, f64>(2)?,
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let values = rows
            .into_iter()
            .map(|(descr, pct, val)| (percentile_key(&descr, pct), val))
            .collect();
        Ok(PercentileLookup { tier, values })
    }
}

/// Named cut points of one tier.
#[derive(Debug, Clone, PartialEq)]
pub struct PercentileLookup {
    tier: Tier,
    values: BTreeMap<String, f64>,
}

impl PercentileLookup {
    pub fn tier(&self) -> Tier {
        self.tier
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Look up by full key, e.g. `top_non_zero_20.0_perc`.
    pub fn by_key(&self, key: &str) -> Option<f64> {
        self.values.get(key).copied()
    }

    pub fn get(&self, descr: &str, pct: f64) -> Option<f64> {
        self.by_key(&percentile_key(descr, pct))
    }

    /// Threshold of the top `pct`% of non-zero labels.
    pub fn threshold(&self, pct: f64) -> Option<f64> {
        self.get(NON_ZERO_DESCR, pct)
    }

    /// Inclusive lower bound of the top `pct`%, with 100 meaning "no bound".
    pub fn lower_bound(&self, pct: f64) -> Result<f64> {
        if pct >= NO_LOWER_BOUND {
            return Ok(0.0);
        }
        self.threshold(pct).ok_or(Error::MissingPercentile {
            tier: self.tier,
            percentile: pct,
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.values.iter().map(|(k, v)| (k.as_str(), *v))
    }
}
