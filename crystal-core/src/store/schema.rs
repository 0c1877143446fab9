//! The fixed instrumentation schema the extractor relies on.
//!
//! Each [`TableSpec`] names a table written by the solver, the alias it is
//! joined under in the training query, the columns the joins and filters
//! need, and the columns left out of the training rows.

use std::collections::HashMap;

use rusqlite::Connection;

use crate::error::{Error, Result};

/// One joined instrumentation table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableSpec {
    pub name: &'static str,
    pub alias: &'static str,
    /// Columns referenced by joins or filters.
    pub required: &'static [&'static str],
    /// Columns never copied into training rows.
    pub excluded: &'static [&'static str],
}

pub const CLAUSE_STATS: TableSpec = TableSpec {
    name: "clause_stats",
    alias: "cl",
    required: &["clauseID", "conflicts", "latest_satzilla_feature_calc"],
    excluded: &[
        "simplifications",
        "restarts",
        "prev_restart",
        "antecedents_long_red_age_max",
        "antecedents_long_red_age_min",
        "clauseID",
    ],
};

pub const RESTART_DAT: TableSpec = TableSpec {
    name: "restart_dat_for_cl",
    alias: "rst_cur",
    required: &["clauseID"],
    excluded: &[
        "simplifications",
        "restarts",
        "conflicts",
        "latest_satzilla_feature_calc",
        "runtime",
        "propagations",
        "decisions",
        "flipped",
        "replaced",
        "eliminated",
        "set",
        "free",
        "numredLits",
        "numIrredLits",
        "all_props",
        "clauseID",
        "restartID",
    ],
};

pub const REDUCE_DB: TableSpec = TableSpec {
    name: "reduceDB",
    alias: "rdb0",
    required: &["clauseID", "conflicts", "reduceDB_called", "dump_no"],
    excluded: &[
        "reduceDB_called",
        "clauseID",
        "in_xor",
        "locked",
        "conflicts",
        "activity_rel",
    ],
};

pub const REDUCE_DB_COMMON: TableSpec = TableSpec {
    name: "reduceDB_common",
    alias: "rdb0_common",
    required: &["reduceDB_called"],
    excluded: &[
        "reduceDB_called",
        "simplifications",
        "restarts",
        "conflicts",
        "latest_satzilla_feature_calc",
        "runtime",
    ],
};

pub const SATZILLA_FEATURES: TableSpec = TableSpec {
    name: "satzilla_features",
    alias: "szfeat",
    required: &["latest_satzilla_feature_calc"],
    excluded: &[
        "simplifications",
        "restarts",
        "conflicts",
        "latest_satzilla_feature_calc",
        "irred_glue_distr_mean",
        "irred_glue_distr_var",
    ],
};

pub const SUM_CL_USE: TableSpec = TableSpec {
    name: "sum_cl_use",
    alias: "sum_cl_use",
    required: &["clauseID", "num_used", "last_confl_used"],
    excluded: &[],
};

pub const CL_LAST_IN_SOLVER: TableSpec = TableSpec {
    name: "cl_last_in_solver",
    alias: "cl_last_in_solver",
    required: &["clauseID", "conflicts"],
    excluded: &[],
};

pub const USED_CLAUSES: TableSpec = TableSpec {
    name: "used_clauses",
    alias: "u",
    required: &["clauseID", "used_at"],
    excluded: &[],
};

pub const TAGS: TableSpec = TableSpec {
    name: "tags",
    alias: "tags",
    required: &["name", "val"],
    excluded: &[],
};

/// Tables whose columns are copied into training rows, in output order.
pub const FRAGMENT_TABLES: [TableSpec; 6] = [
    CLAUSE_STATS,
    RESTART_DAT,
    SATZILLA_FEATURES,
    REDUCE_DB,
    REDUCE_DB_COMMON,
    SUM_CL_USE,
];

/// Tables that must exist before labels can be derived or rows sampled.
pub const REQUIRED_TABLES: [TableSpec; 9] = [
    CLAUSE_STATS,
    RESTART_DAT,
    SATZILLA_FEATURES,
    REDUCE_DB,
    REDUCE_DB_COMMON,
    SUM_CL_USE,
    CL_LAST_IN_SOLVER,
    USED_CLAUSES,
    TAGS,
];

/// Column listing of the store, read from `pragma_table_info`.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    tables: HashMap<String, Vec<String>>,
}

impl Schema {
    /// Read the columns of every table in [`REQUIRED_TABLES`].
    ///
    /// Absent tables are simply not recorded; [`Schema::validate`] reports them.
    pub fn introspect(conn: &Connection) -> Result<Self> {
        let mut tables = HashMap::new();
        let mut stmt = conn.prepare("SELECT name FROM pragma_table_info(?1) ORDER BY cid")?;
        for spec in REQUIRED_TABLES {
            let columns = stmt
                .query_map([spec.name], |row| row.get::<_, String>(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            if !columns.is_empty() {
                tables.insert(spec.name.to_string(), columns);
            }
        }
        Ok(Self { tables })
    }

    pub fn columns(&self, table: &str) -> Option<&[String]> {
        self.tables.get(table).map(Vec::as_slice)
    }

    /// Check that a table exists and carries all of its required columns.
    pub fn validate(&self, spec: &TableSpec) -> Result<&[String]> {
        let columns = self
            .columns(spec.name)
            .ok_or_else(|| Error::MissingTable(spec.name.to_string()))?;
        for required in spec.required {
            if !columns.iter().any(|c| c == required) {
                return Err(Error::MissingColumn {
                    table: spec.name.to_string(),
                    column: (*required).to_string(),
                });
            }
        }
        Ok(columns)
    }

    /// Validate every table the extractor touches.
    pub fn validate_all(&self) -> Result<()> {
        for spec in REQUIRED_TABLES {
            self.validate(&spec)?;
        }
        Ok(())
    }

    /// Columns of `spec` that are copied into training rows.
    pub fn selected_columns(&self, spec: &TableSpec) -> Result<Vec<String>> {
        let columns = self.validate(spec)?;
        Ok(columns
            .iter()
            .filter(|c| !spec.excluded.contains(&c.as_str()))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIXTURE: &str = include_str!("../../tests/fixtures/instrumentation.sql");

    fn fixture_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(FIXTURE).unwrap();
        conn
    }

    #[test]
    fn test_introspect_fixture_validates() {
        let schema = Schema::introspect(&fixture_conn()).unwrap();
        schema.validate_all().unwrap();
    }

    #[test]
    fn test_selected_columns_skip_excluded() {
        let schema = Schema::introspect(&fixture_conn()).unwrap();
        let cols = schema.selected_columns(&REDUCE_DB).unwrap();
        assert!(cols.contains(&"dump_no".to_string()));
        assert!(cols.contains(&"glue".to_string()));
        assert!(!cols.contains(&"clauseID".to_string()));
        assert!(!cols.contains(&"activity_rel".to_string()));
    }

    #[test]
    fn test_missing_table_is_reported() {
        let conn = fixture_conn();
        conn.execute_batch("DROP TABLE tags").unwrap();
        let schema = Schema::introspect(&conn).unwrap();
        let err = schema.validate_all().unwrap_err();
        assert!(matches!(err, Error::MissingTable(ref t) if t == "tags"));
    }

    #[test]
    fn test_missing_required_column_is_reported() {
        let conn = fixture_conn();
        conn.execute_batch(
            "DROP TABLE cl_last_in_solver;
             CREATE TABLE cl_last_in_solver (clauseID INTEGER);",
        )
        .unwrap();
        let schema = Schema::introspect(&conn).unwrap();
        let err = schema.validate(&CL_LAST_IN_SOLVER).unwrap_err();
        assert_eq!(
            err.to_string(),
            "column conflicts not found in table cl_last_in_solver"
        );
    }
}
