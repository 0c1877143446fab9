//! Access to a solver instrumentation database.

mod indexes;
pub mod schema;

pub use indexes::{INDEXES, IndexManager, IndexSpec};
pub use schema::{Schema, TableSpec};

use std::path::Path;

use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use rusqlite::functions::FunctionFlags;
use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags, Params};
use tracing::{debug, info};

use crate::dataset::{Dataset, Value};
use crate::error::{Error, Result};

/// Name of the seeded random function registered on the connection.
pub const RANDOM_FN: &str = "crystal_random";

/// Row counts of the two largest instrumentation tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableCounts {
    pub reduce_db: u64,
    pub clause_stats: u64,
}

/// SQLite-backed instrumentation store.
pub struct ClauseStore {
    conn: Connection,
    dump_sql: bool,
}

impl ClauseStore {
    /// Open an existing database file. A missing file is never created.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(Error::Config(format!(
                "database file {} does not exist",
                path.display()
            )));
        }
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_URI
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        let conn = Connection::open_with_flags(path, flags)?;
        Ok(Self {
            conn,
            dump_sql: false,
        })
    }

    /// Open a database file, creating it when missing.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path)?;
        Ok(Self {
            conn,
            dump_sql: false,
        })
    }

    /// Open in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(Self {
            conn,
            dump_sql: false,
        })
    }

    /// Log every statement before it runs.
    pub fn set_dump_sql(&mut self, dump_sql: bool) {
        self.dump_sql = dump_sql;
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    pub(crate) fn trace_sql(&self, sql: &str) {
        if self.dump_sql {
            info!(target: "crystal::sql", "{}", sql.trim());
        }
    }

    /// Execute a batch of statements.
    pub fn execute_batch(&self, sql: &str) -> Result<()> {
        self.trace_sql(sql);
        self.conn.execute_batch(sql)?;
        Ok(())
    }

    /// Execute a single statement, returning the number of changed rows.
    pub fn execute<P: Params>(&self, sql: &str, params: P) -> Result<usize> {
        self.trace_sql(sql);
        Ok(self.conn.execute(sql, params)?)
    }

    pub fn table_exists(&self, table: &str) -> Result<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
            [table],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Column names of `table`, empty when the table is absent.
    pub fn table_columns(&self, table: &str) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT name FROM pragma_table_info(?1) ORDER BY cid")?;
        let columns = stmt
            .query_map([table], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(columns)
    }

    pub fn count_rows(&self, table: &str) -> Result<u64> {
        let sql = format!("SELECT COUNT(*) FROM \"{}\"", table);
        self.trace_sql(&sql);
        let count: i64 = self.conn.query_row(&sql, [], |row| row.get(0))?;
        Ok(count as u64)
    }

    /// Report the size of the store.
    pub fn measure_size(&self) -> Result<TableCounts> {
        let counts = TableCounts {
            reduce_db: self.count_rows(schema::REDUCE_DB.name)?,
            clause_stats: self.count_rows(schema::CLAUSE_STATS.name)?,
        };
        info!("We have {} lines of RDB", counts.reduce_db);
        info!("We have {} lines of clause_stats", counts.clause_stats);
        Ok(counts)
    }

    /// Register [`RANDOM_FN`] backed by a `StdRng` seeded with `seed`.
    ///
    /// The generator lives as long as the connection, so consecutive queries
    /// draw from one stream. Re-registering restarts the stream.
    pub fn install_random_source(&self, seed: u64) -> Result<()> {
        let mut rng = StdRng::seed_from_u64(seed);
        self.conn.create_scalar_function(
            RANDOM_FN,
            0,
            FunctionFlags::SQLITE_UTF8,
            move |_ctx| Ok(rng.next_u64() as i64),
        )?;
        debug!(seed, "installed seeded random source");
        Ok(())
    }

    /// Run a query and collect every row into a [`Dataset`].
    pub fn query_dataset<P: Params>(&self, sql: &str, params: P) -> Result<Dataset> {
        self.trace_sql(sql);
        let mut stmt = self.conn.prepare(sql)?;
        let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        let width = columns.len();

        let mut dataset = Dataset::new(columns);
        let mut rows = stmt.query(params)?;
        while let Some(row) = rows.next()? {
            let mut values = Vec::with_capacity(width);
            for idx in 0..width {
                values.push(match row.get_ref(idx)? {
                    ValueRef::Null => Value::Null,
                    ValueRef::Integer(i) => Value::Integer(i),
                    ValueRef::Real(f) => Value::Real(f),
                    ValueRef::Text(t) => Value::Text(String::from_utf8_lossy(t).into_owned()),
                    ValueRef::Blob(b) => Value::Text(String::from_utf8_lossy(b).into_owned()),
                });
            }
            dataset.push_row(values)?;
        }
        Ok(dataset)
    }
}

#[cfg(test)]
pub(crate) mod fixture {
    //! Synthetic stores for unit tests.

    use super::ClauseStore;

    const FIXTURE: &str = include_str!("../../tests/fixtures/instrumentation.sql");

    pub fn store() -> ClauseStore {
        let store = ClauseStore::open_in_memory().unwrap();
        store.execute_batch(FIXTURE).unwrap();
        store
    }

    /// A clause created at `created` that left the solver at `last`.
    pub fn add_clause(store: &ClauseStore, id: i64, created: i64, last: i64) {
        let conn = store.conn();
        conn.execute(
            "INSERT INTO clause_stats (clauseID, conflicts, latest_satzilla_feature_calc,
                glue_before_minim, glue, size, num_antecedents, glueHist_avg)
             VALUES (?1, ?2, 1, 4, 3, 7, 2, 3.5)",
            rusqlite::params![id, created],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO restart_dat_for_cl (clauseID, restartID, branch_depth_hist, trail_depth_hist)
             VALUES (?1, 1, 10.0, 20.0)",
            [id],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO cl_last_in_solver (clauseID, conflicts) VALUES (?1, ?2)",
            [id, last],
        )
        .unwrap();
    }

    pub fn add_snapshot(store: &ClauseStore, id: i64, reduce_called: i64, at: i64, dump_no: i64) {
        store
            .conn()
            .execute(
                "INSERT INTO reduceDB (reduceDB_called, clauseID, conflicts, dump_no, glue, act_ranking_rel)
                 VALUES (?1, ?2, ?3, ?4, 3, 0.5)",
                [reduce_called, id, at, dump_no],
            )
            .unwrap();
    }

    pub fn add_use(store: &ClauseStore, id: i64, at: i64) {
        store
            .conn()
            .execute(
                "INSERT INTO used_clauses (clauseID, used_at) VALUES (?1, ?2)",
                [id, at],
            )
            .unwrap();
    }

    /// Per-store rows every training row joins against.
    pub fn add_globals(store: &ClauseStore, reductions: i64) {
        let conn = store.conn();
        conn.execute(
            "INSERT INTO satzilla_features (latest_satzilla_feature_calc, numVars, numClauses, var_cl_ratio)
             VALUES (1, 100, 420, 4.2)",
            [],
        )
        .unwrap();
        for called in 1..=reductions {
            conn.execute(
                "INSERT INTO reduceDB_common (reduceDB_called, avg_props, avg_glue, avg_uip1_used)
                 VALUES (?1, 1.5, 4.0, 0.25)",
                [called],
            )
            .unwrap();
        }
        conn.execute(
            "INSERT INTO tags (name, val) VALUES ('filename', 'synthetic.cnf')",
            [],
        )
        .unwrap();
    }

    pub fn add_usage_summary(store: &ClauseStore, id: i64, num_used: i64, last_used: i64) {
        store
            .conn()
            .execute(
                "INSERT INTO sum_cl_use (clauseID, num_used, last_confl_used) VALUES (?1, ?2, ?3)",
                [id, num_used, last_used],
            )
            .unwrap();
    }

    /// `clauses` clauses with snapshots in generations 1..=3, 20k conflicts
    /// apart. Clause `i` is used `i % 10` times right after each snapshot, so
    /// every generation sees the same short-window label distribution.
    pub fn populate(store: &ClauseStore, clauses: i64) {
        add_globals(store, 3);
        for id in 1..=clauses {
            add_clause(store, id, 0, 1_000_000);
            add_usage_summary(store, id, 3 * (id % 10), 70_000);
            for generation in 1..=3 {
                let at = generation * 20_000;
                add_snapshot(store, id, generation, at, generation);
                for k in 1..=(id % 10) {
                    add_use(store, id, at + k);
                }
            }
        }
    }
}
