//! Materialized "used later" labels.
//!
//! For every reduceDB snapshot a label counts how often the clause was used in
//! a window of conflicts after the snapshot. Labels are written into one table
//! per [`Tier`] so the sampler can filter and join on them like any column.
//!
//! A snapshot only gets a label when the clause stayed in the solver long
//! enough to observe the window:
//!
//! ```text
//! conflicts + offset + observe <= cl_last_in_solver.conflicts
//! ```
//!
//! Snapshots failing this rule are left out, never imputed. A labelled
//! snapshot with no recorded use gets 0.

use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::config::TierDurations;
use crate::error::{Error, Result};
use crate::store::ClauseStore;
use crate::tier::Tier;

/// Window length standing in for "until the clause is deleted".
pub const FOREVER_WINDOW: i64 = 1_000_000_000;

/// Table of named percentile cut points, shared by all tiers.
pub const PERCENTILES_TABLE: &str = "used_later_percentiles";

/// How one tier's labels are derived.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LabelSpec {
    pub tier: Tier,
    /// Distance from the snapshot to the start of the window.
    pub offset: i64,
    /// Window length in conflicts; ignored when `forever` is set.
    pub window: i64,
    pub forever: bool,
    /// Divide the use count by the elapsed conflicts of the window.
    pub density_normalize: bool,
    /// Conflicts the clause must survive after the window start.
    pub observe: i64,
}

impl LabelSpec {
    /// Uses within `window` conflicts, observed in full.
    pub fn bounded(tier: Tier, offset: i64, window: i64) -> Self {
        Self {
            tier,
            offset,
            window,
            forever: false,
            density_normalize: false,
            observe: window,
        }
    }

    /// Uses until deletion, for clauses that lived at least `observe` conflicts.
    pub fn forever(tier: Tier, offset: i64, observe: i64) -> Self {
        Self {
            tier,
            offset,
            window: FOREVER_WINDOW,
            forever: true,
            density_normalize: false,
            observe,
        }
    }

    #[must_use]
    pub fn with_density(mut self) -> Self {
        self.density_normalize = true;
        self
    }

    /// The standard definition of `tier`.
    pub fn for_tier(tier: Tier, durations: &TierDurations) -> Self {
        let short = durations.short as i64;
        let long = durations.long as i64;
        match tier {
            Tier::Short => Self::bounded(tier, 0, short),
            Tier::Long => Self::bounded(tier, 0, long),
            Tier::Forever => Self::forever(tier, 0, short),
            Tier::ForeverDiv => Self::forever(tier, 0, short).with_density(),
        }
    }

    pub fn effective_window(&self) -> i64 {
        if self.forever {
            FOREVER_WINDOW
        } else {
            self.window
        }
    }

    fn validate(&self) -> Result<()> {
        if self.offset < 0 || self.effective_window() < 0 || self.observe < 0 {
            return Err(Error::Config(format!(
                "label window for {} must be non-negative (offset {}, window {}, observe {})",
                self.tier,
                self.offset,
                self.effective_window(),
                self.observe
            )));
        }
        Ok(())
    }

    fn insert_sql(&self) -> String {
        let count = "(SELECT COUNT(*) FROM used_clauses AS u
                WHERE u.clauseID = rdb0.clauseID
                AND u.used_at > rdb0.conflicts + :offset
                AND u.used_at < rdb0.conflicts + :offset + :window)";
        let value = if self.density_normalize {
            format!(
                "CASE WHEN min(:window, last.conflicts - (rdb0.conflicts + :offset)) > 0
                    THEN CAST({count} AS REAL) / min(:window, last.conflicts - (rdb0.conflicts + :offset))
                    ELSE 0 END"
            )
        } else {
            count.to_string()
        };
        format!(
            "INSERT OR IGNORE INTO {table} (clauseID, rdb0conflicts, \"offset\", used_later)
            SELECT DISTINCT rdb0.clauseID, rdb0.conflicts, :offset, {value}
            FROM reduceDB AS rdb0
            JOIN cl_last_in_solver AS last ON last.clauseID = rdb0.clauseID
            WHERE rdb0.conflicts + :offset + :observe <= last.conflicts",
            table = self.tier.label_table(),
        )
    }
}

/// Derives and persists labels.
pub struct LabelMaterializer<'a> {
    store: &'a ClauseStore,
}

impl<'a> LabelMaterializer<'a> {
    pub fn new(store: &'a ClauseStore) -> Self {
        Self { store }
    }

    /// Create the label tables and the percentile table if absent.
    pub fn ensure_tables(&self) -> Result<()> {
        for tier in Tier::ALL {
            self.store.execute_batch(&format!(
                "CREATE TABLE IF NOT EXISTS {} (
                    clauseID INTEGER NOT NULL,
                    rdb0conflicts INTEGER NOT NULL,
                    \"offset\" INTEGER NOT NULL,
                    used_later REAL NOT NULL,
                    percentile_fit REAL,
                    UNIQUE (clauseID, rdb0conflicts, \"offset\")
                )",
                tier.label_table()
            ))?;
        }
        self.store.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {PERCENTILES_TABLE} (
                type_of_dat TEXT NOT NULL,
                percentile_descr TEXT NOT NULL,
                percentile REAL NOT NULL,
                val REAL NOT NULL
            )"
        ))?;
        Ok(())
    }

    /// Drop and recreate the label tables, discarding every label.
    pub fn reset_tables(&self) -> Result<()> {
        for tier in Tier::ALL {
            self.store
                .execute_batch(&format!("DROP TABLE IF EXISTS {}", tier.label_table()))?;
        }
        self.store
            .execute_batch(&format!("DROP TABLE IF EXISTS {PERCENTILES_TABLE}"))?;
        self.ensure_tables()
    }

    /// Replace the labels of `spec.tier`. Returns the number of labelled snapshots.
    #[instrument(skip(self), fields(tier = %spec.tier))]
    pub fn fill_label(&self, spec: &LabelSpec) -> Result<usize> {
        spec.validate()?;
        self.ensure_tables()?;
        let start = Instant::now();

        let tx = self.store.conn().unchecked_transaction()?;
        self.store.execute(
            &format!("DELETE FROM {}", spec.tier.label_table()),
            [],
        )?;
        let written = self.store.execute(
            &spec.insert_sql(),
            rusqlite::named_params! {
                ":offset": spec.offset,
                ":window": spec.effective_window(),
                ":observe": spec.observe,
            },
        )?;
        tx.commit()?;

        info!(
            "used_later_{} filled with {} rows T: {:.2?}",
            spec.tier,
            written,
            start.elapsed()
        );
        Ok(written)
    }

    /// Fill all four tiers with their standard definitions.
    pub fn fill_all(&self, durations: &TierDurations) -> Result<Vec<(Tier, usize)>> {
        Tier::ALL
            .into_iter()
            .map(|tier| {
                let written = self.fill_label(&LabelSpec::for_tier(tier, durations))?;
                Ok((tier, written))
            })
            .collect()
    }
}
