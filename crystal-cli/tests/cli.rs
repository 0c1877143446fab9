//! Runs the `crystal` binary.

use std::fmt::Write;
use std::path::{Path, PathBuf};
use std::process::Command;

use crystal_core::ClauseStore;
use tempfile::TempDir;

const SCHEMA: &str = include_str!("../../crystal-core/tests/fixtures/instrumentation.sql");

fn crystal() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_crystal"));
    // keep the caller's project config out of the run
    cmd.env("CRYSTAL_PROJECT_CONFIG_DIR", env!("CARGO_TARGET_TMPDIR"));
    cmd
}

/// A small instrumentation database: `clauses` clauses snapshotted in three
/// dump generations, clause `i` used `i % 10` times after each snapshot.
fn synthetic_db(dir: &Path, clauses: i64) -> PathBuf {
    let path = dir.join("tiny.cnf.gz.sqlite");
    let mut sql = String::from(SCHEMA);
    sql.push_str(
        "INSERT INTO satzilla_features (latest_satzilla_feature_calc, numVars, numClauses, var_cl_ratio)
         VALUES (1, 100, 420, 4.2);
         INSERT INTO tags (name, val) VALUES ('filename', 'tiny.cnf');\n",
    );
    for generation in 1..=3i64 {
        writeln!(
            sql,
            "INSERT INTO reduceDB_common (reduceDB_called, avg_props, avg_glue, avg_uip1_used)
             VALUES ({generation}, 1.5, 4.0, 0.25);"
        )
        .unwrap();
    }
    for id in 1..=clauses {
        let uses = id % 10;
        writeln!(
            sql,
            "INSERT INTO clause_stats (clauseID, conflicts, latest_satzilla_feature_calc,
                glue_before_minim, glue, size, num_antecedents, glueHist_avg)
             VALUES ({id}, 0, 1, 4, 3, 7, 2, 3.5);
             INSERT INTO restart_dat_for_cl (clauseID, restartID, branch_depth_hist, trail_depth_hist)
             VALUES ({id}, 1, 10.0, 20.0);
             INSERT INTO cl_last_in_solver (clauseID, conflicts) VALUES ({id}, 1000000);
             INSERT INTO sum_cl_use (clauseID, num_used, last_confl_used) VALUES ({id}, {}, 70000);",
            3 * uses
        )
        .unwrap();
        for generation in 1..=3i64 {
            let at = generation * 20_000;
            writeln!(
                sql,
                "INSERT INTO reduceDB (reduceDB_called, clauseID, conflicts, dump_no, glue, act_ranking_rel)
                 VALUES ({generation}, {id}, {at}, {generation}, 3, 0.5);"
            )
            .unwrap();
            for k in 1..=uses {
                writeln!(
                    sql,
                    "INSERT INTO used_clauses (clauseID, used_at) VALUES ({id}, {});",
                    at + k
                )
                .unwrap();
            }
        }
    }
    ClauseStore::create(&path).unwrap().execute_batch(&sql).unwrap();
    path
}

#[test]
fn help_lists_flags() {
    let output = crystal().arg("--help").output().expect("run crystal --help");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    for flag in ["--sql", "--csv", "--limit", "--cut1", "--cut2", "--noind", "--seed"] {
        assert!(stdout.contains(flag), "missing {flag}");
    }
}

#[test]
fn requires_exactly_one_file() {
    for args in [vec![], vec!["a.sqlite", "b.sqlite"]] {
        let output = crystal().args(&args).output().expect("run crystal");

        assert!(!output.status.success());
        let stderr = String::from_utf8_lossy(&output.stderr);
        assert!(stderr.contains("You must give exactly one file"), "{stderr}");
    }
}

#[test]
fn rejects_inverted_cut_points() {
    let output = crystal()
        .args(["--cut1", "60", "--cut2", "50", "missing.sqlite"])
        .output()
        .expect("run crystal");

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("cut1"), "{stderr}");
}

#[test]
fn missing_database_is_reported_and_not_created() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("typo.cnf.gz.sqlite");

    let output = crystal().arg(&path).output().expect("run crystal");

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("does not exist"), "{stderr}");
    assert!(!path.exists());
}

#[test]
fn extracts_every_row_into_out_dir() {
    let dir = TempDir::new().unwrap();
    let db = synthetic_db(dir.path(), 30);
    let out = dir.path().join("out");

    let output = crystal()
        .arg("--limit")
        .arg("-1")
        .arg("--csv")
        .arg("--out-dir")
        .arg(&out)
        .arg(&db)
        .output()
        .expect("run crystal");

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(output.status.success(), "{stderr}");
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("short"), "{stdout}");

    let stem = "tiny-cldata-short-cut1-20.0-cut2-50.0-limit--1";
    assert!(out.join(format!("{stem}.dat")).is_file());
    assert!(out.join(format!("{stem}.csv")).is_file());
    assert!(out.join(format!("{stem}.json")).is_file());
}
