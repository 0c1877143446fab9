//! Synthetic instrumentation databases for integration tests.

#![allow(dead_code)]

use std::path::{Path, PathBuf};

use crystal_core::ClauseStore;
use rusqlite::params;
use tempfile::TempDir;

const SCHEMA: &str = include_str!("../fixtures/instrumentation.sql");

/// A database file in its own temporary directory.
pub struct SyntheticDb {
    dir: TempDir,
    path: PathBuf,
}

impl SyntheticDb {
    /// `clauses` clauses, each snapshotted in dump generations 1, 2 and 3.
    ///
    /// Clause `i` is used `i % 10` times right after each snapshot. With 100
    /// clauses the short-window labels are 0..=9, thirty rows of each.
    pub fn new(clauses: i64) -> Self {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("synthetic.cnf.gz.sqlite");
        let store = ClauseStore::create(&path).unwrap();
        let conn = store.conn();
        conn.execute_batch(SCHEMA).unwrap();

        conn.execute(
            "INSERT INTO satzilla_features (latest_satzilla_feature_calc, numVars, numClauses, var_cl_ratio)
             VALUES (1, 500, 2100, 4.2)",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO tags (name, val) VALUES ('filename', 'synthetic.cnf')",
            [],
        )
        .unwrap();

        let tx = conn.unchecked_transaction().unwrap();
        for generation in 1..=3i64 {
            tx.execute(
                "INSERT INTO reduceDB_common (reduceDB_called, avg_props, avg_glue, avg_uip1_used)
                 VALUES (?1, ?2, 5.0, 0.3)",
                params![generation, generation as f64 * 1.5],
            )
            .unwrap();
        }
        for id in 1..=clauses {
            let uses = id % 10;
            tx.execute(
                "INSERT INTO clause_stats (clauseID, conflicts, latest_satzilla_feature_calc,
                    glue_before_minim, glue, size, num_antecedents, glueHist_avg)
                 VALUES (?1, 0, 1, ?2, ?2, ?3, 2, 4.5)",
                params![id, 2 + id % 7, 3 + id % 11],
            )
            .unwrap();
            tx.execute(
                "INSERT INTO restart_dat_for_cl (clauseID, restartID, branch_depth_hist, trail_depth_hist)
                 VALUES (?1, 1, 12.0, 40.0)",
                [id],
            )
            .unwrap();
            tx.execute(
                "INSERT INTO cl_last_in_solver (clauseID, conflicts) VALUES (?1, 1000000)",
                [id],
            )
            .unwrap();
            tx.execute(
                "INSERT INTO sum_cl_use (clauseID, num_used, last_confl_used) VALUES (?1, ?2, 70000)",
                [id, 3 * uses],
            )
            .unwrap();
            for generation in 1..=3i64 {
                let at = generation * 20_000;
                tx.execute(
                    "INSERT INTO reduceDB (reduceDB_called, clauseID, conflicts, dump_no, glue, act_ranking_rel)
                     VALUES (?1, ?2, ?3, ?1, 3, 0.5)",
                    [generation, id, at],
                )
                .unwrap();
                for k in 1..=uses {
                    tx.execute(
                        "INSERT INTO used_clauses (clauseID, used_at) VALUES (?1, ?2)",
                        [id, at + k],
                    )
                    .unwrap();
                }
            }
        }
        tx.commit().unwrap();

        Self { dir, path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn dir(&self) -> &Path {
        self.dir.path()
    }

    pub fn open(&self) -> ClauseStore {
        ClauseStore::open(&self.path).unwrap()
    }
}
