//! Secondary indexes the extraction queries depend on.

use std::time::Instant;

use tracing::{debug, info, instrument};

use super::ClauseStore;
use crate::error::Result;

/// A named composite index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexSpec {
    pub name: &'static str,
    pub table: &'static str,
    pub columns: &'static [&'static str],
}

const fn idx(
    name: &'static str,
    table: &'static str,
    columns: &'static [&'static str],
) -> IndexSpec {
    IndexSpec {
        name,
        table,
        columns,
    }
}

/// Every index the extractor manages.
pub const INDEXES: &[IndexSpec] = &[
    idx("idxclid33", "sum_cl_use", &["clauseID", "last_confl_used"]),
    idx(
        "idxclid1",
        "clause_stats",
        &["clauseID", "conflicts", "restarts", "latest_satzilla_feature_calc"],
    ),
    idx("idxclid1-2", "clause_stats", &["clauseID"]),
    idx("idxclid1-3", "clause_stats", &["clauseID", "restarts"]),
    idx("idxclid1-4", "clause_stats", &["clauseID", "restarts", "prev_restart"]),
    idx("idxclid1-5", "clause_stats", &["clauseID", "prev_restart"]),
    idx(
        "idxclid2",
        "clause_stats",
        &[
            "clauseID",
            "prev_restart",
            "conflicts",
            "restarts",
            "latest_satzilla_feature_calc",
        ],
    ),
    idx("idxclid88", "restart_dat_for_cl", &["clauseID"]),
    idx("idxclid5", "tags", &["name"]),
    idx("idxclid6", "reduceDB", &["reduceDB_called", "clauseID", "conflicts"]),
    idx("idxclid6-9", "reduceDB", &["reduceDB_called"]),
    idx(
        "idxclid9",
        "reduceDB_common",
        &["reduceDB_called", "latest_satzilla_feature_calc"],
    ),
    idx("idxclid9-3", "reduceDB_common", &["reduceDB_called"]),
    idx("idxclid9-4", "reduceDB_common", &["latest_satzilla_feature_calc"]),
    idx("idxclid6-2", "reduceDB", &["clauseID", "dump_no"]),
    idx("idxclid6-3", "reduceDB", &["clauseID", "conflicts", "dump_no"]),
    idx("idxclid6-4", "reduceDB", &["clauseID", "conflicts"]),
    idx("idxclid7", "satzilla_features", &["latest_satzilla_feature_calc"]),
    idx("idxclidUCLS-1", "used_clauses", &["clauseID", "used_at"]),
    idx("idxclidUCLS-2", "used_clauses", &["used_at"]),
    idx("idxcl_last_in_solver-1", "cl_last_in_solver", &["clauseID", "conflicts"]),
    idx(
        "used_later_percentiles_idx3",
        "used_later_percentiles",
        &["type_of_dat", "percentile_descr", "percentile", "val"],
    ),
    idx(
        "used_later_percentiles_idx2",
        "used_later_percentiles",
        &["type_of_dat", "percentile_descr", "val"],
    ),
];

impl IndexSpec {
    fn create_sql(&self) -> String {
        let columns = self
            .columns
            .iter()
            .map(|c| format!("\"{}\"", c))
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "CREATE INDEX IF NOT EXISTS \"{}\" ON \"{}\" ({})",
            self.name, self.table, columns
        )
    }

    fn drop_sql(&self) -> String {
        format!("DROP INDEX IF EXISTS \"{}\"", self.name)
    }
}

/// Creates and drops the managed index set.
pub struct IndexManager<'a> {
    store: &'a ClauseStore,
}

impl<'a> IndexManager<'a> {
    pub fn new(store: &'a ClauseStore) -> Self {
        Self { store }
    }

    /// Create every managed index that does not exist yet.
    ///
    /// Indexes over tables or columns missing from the store are skipped.
    /// Returns the number of indexes ensured.
    #[instrument(skip(self))]
    pub fn ensure_indexes(&self) -> Result<usize> {
        let start = Instant::now();
        let mut ensured = 0;
        for spec in INDEXES {
            let columns = self.store.table_columns(spec.table)?;
            if columns.is_empty() {
                debug!(index = spec.name, table = spec.table, "table absent, skipping index");
                continue;
            }
            let missing = spec
                .columns
                .iter()
                .find(|c| !columns.iter().any(|x| x.as_str() == **c));
            if let Some(column) = missing {
                debug!(index = spec.name, column = *column, "column absent, skipping index");
                continue;
            }
            let t = Instant::now();
            self.store.execute_batch(&spec.create_sql())?;
            debug!(index = spec.name, "index ensured in {:.2?}", t.elapsed());
            ensured += 1;
        }
        info!("indexes created T: {:.2?}", start.elapsed());
        Ok(ensured)
    }

    /// Drop every managed index.
    #[instrument(skip(self))]
    pub fn drop_indexes(&self) -> Result<()> {
        for spec in INDEXES {
            self.store.execute_batch(&spec.drop_sql())?;
        }
        Ok(())
    }

    /// Drop and recreate the managed index set.
    pub fn recreate_indexes(&self) -> Result<usize> {
        info!("Recreating indexes...");
        self.drop_indexes()?;
        self.ensure_indexes()
    }

    /// Names of the managed indexes present in the store.
    pub fn existing(&self) -> Result<Vec<String>> {
        let mut stmt = self
            .store
            .conn()
            .prepare("SELECT name FROM sqlite_master WHERE type = 'index' ORDER BY name")?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(names
            .into_iter()
            .filter(|n| INDEXES.iter().any(|spec| spec.name == n.as_str()))
            .collect())
    }
}
