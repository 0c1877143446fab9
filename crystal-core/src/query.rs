//! Composition of the training-row query.
//!
//! One training row is a reduceDB snapshot joined with the clause's static
//! statistics, its restart context, the problem's global features, the
//! per-reduction summary, the usage summary, and the four tiers' labels.
//! Column lists come from the store itself so that new instrumentation
//! columns flow through without code changes.

use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::store::RANDOM_FN;
use crate::store::schema::{self, FRAGMENT_TABLES, Schema, TableSpec};
use crate::tier::Tier;

/// Reduction-pass generation of a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DumpBucket {
    /// `dump_no = 1`
    First,
    /// `dump_no = 2`
    Second,
    /// `dump_no > 2`
    Later,
}

impl DumpBucket {
    pub const ALL: [DumpBucket; 3] = [DumpBucket::First, DumpBucket::Second, DumpBucket::Later];

    /// Relative share of the bucket inside a stratum.
    pub fn parts(&self) -> u64 {
        match self {
            Self::First => 2,
            Self::Second | Self::Later => 1,
        }
    }

    fn condition(&self) -> &'static str {
        match self {
            Self::First => "rdb0.dump_no = 1",
            Self::Second => "rdb0.dump_no = 2",
            Self::Later => "rdb0.dump_no > 2",
        }
    }
}

impl std::fmt::Display for DumpBucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.condition())
    }
}

/// Label values `lower <= v < upper`; no upper bound when `upper` is `None`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValueRange {
    pub lower: f64,
    pub upper: Option<f64>,
}

impl ValueRange {
    pub fn contains(&self, value: f64) -> bool {
        value >= self.lower && self.upper.is_none_or(|upper| value < upper)
    }
}

/// Columns of one joined table, rendered as `alias."col" AS "alias.col"`.
#[derive(Debug, Clone, PartialEq)]
pub struct Fragment {
    alias: &'static str,
    columns: Vec<String>,
}

impl Fragment {
    /// Select every non-excluded column of `spec`.
    pub fn new(schema: &Schema, spec: &TableSpec) -> Result<Self> {
        Ok(Self {
            alias: spec.alias,
            columns: schema.selected_columns(spec)?,
        })
    }

    /// Names the fragment's columns take in the result.
    pub fn output_columns(&self) -> impl Iterator<Item = String> + '_ {
        self.columns
            .iter()
            .map(move |c| format!("{}.{}", self.alias, c))
    }

    /// Select-list text, each column preceded by a comma.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for column in &self.columns {
            let _ = write!(
                out,
                "\n    , {alias}.\"{column}\" AS \"{alias}.{column}\"",
                alias = self.alias,
                column = column.replace('"', "\"\""),
            );
        }
        out
    }
}

/// The joined training query, validated against one store's schema.
///
/// Bound parameters: `:observe` in the base query; `:lower`, `:upper` and
/// `:limit` in the stratum queries.
#[derive(Debug, Clone)]
pub struct TrainingQuery {
    fragments: Vec<Fragment>,
    base: String,
}

impl TrainingQuery {
    pub fn build(schema: &Schema) -> Result<Self> {
        schema.validate_all()?;
        let fragments = FRAGMENT_TABLES
            .iter()
            .map(|spec| Fragment::new(schema, spec))
            .collect::<Result<Vec<_>>>()?;

        let mut select = String::from("SELECT\n    tags.val AS \"fname\"");
        for fragment in &fragments {
            select.push_str(&fragment.render());
        }
        select.push_str(
            "\n    , (rdb0.conflicts - cl.conflicts) AS \"cl.time_inside_solver\"\
             \n    , sum_cl_use.last_confl_used - cl.conflicts AS \"x.a_lifetime\"",
        );
        for tier in Tier::ALL {
            let _ = write!(
                select,
                "\n    , {table}.used_later AS \"{label}\"\
                 \n    , {table}.percentile_fit AS \"{perc}\"",
                table = tier.label_table(),
                label = tier.label_column(),
                perc = tier.percentile_column(),
            );
        }
        select.push_str("\n    , sum_cl_use.num_used AS \"x.sum_cl_use\"");

        let mut from = format!(
            "\nFROM {rdb} AS rdb0\
             \nJOIN {common} AS rdb0_common ON rdb0_common.reduceDB_called = rdb0.reduceDB_called\
             \nJOIN {cl} AS cl ON cl.clauseID = rdb0.clauseID\
             \nJOIN {rst} AS rst_cur ON rst_cur.clauseID = rdb0.clauseID\
             \nJOIN {sum} AS sum_cl_use ON sum_cl_use.clauseID = rdb0.clauseID\
             \nJOIN {sz} AS szfeat ON szfeat.latest_satzilla_feature_calc = cl.latest_satzilla_feature_calc",
            rdb = schema::REDUCE_DB.name,
            common = schema::REDUCE_DB_COMMON.name,
            cl = schema::CLAUSE_STATS.name,
            rst = schema::RESTART_DAT.name,
            sum = schema::SUM_CL_USE.name,
            sz = schema::SATZILLA_FEATURES.name,
        );
        for tier in Tier::ALL {
            let _ = write!(
                from,
                "\nJOIN {t} ON {t}.clauseID = rdb0.clauseID\
                 \n    AND {t}.rdb0conflicts = rdb0.conflicts\
                 \n    AND {t}.\"offset\" = 0",
                t = tier.label_table(),
            );
        }
        let _ = write!(
            from,
            "\nJOIN {last} AS cl_last_in_solver ON cl_last_in_solver.clauseID = rdb0.clauseID\
             \n, {tags} AS tags\
             \nWHERE cl.clauseID != 0\
             \n    AND tags.name = 'filename'\
             \n    AND rdb0.conflicts + :observe <= cl_last_in_solver.conflicts",
            last = schema::CL_LAST_IN_SOLVER.name,
            tags = schema::TAGS.name,
        );

        Ok(Self {
            fragments,
            base: select + &from,
        })
    }

    /// The unfiltered join.
    pub fn base_sql(&self) -> &str {
        &self.base
    }

    /// Output columns, in order.
    pub fn columns(&self) -> Vec<String> {
        let mut columns = vec!["fname".to_string()];
        for fragment in &self.fragments {
            columns.extend(fragment.output_columns());
        }
        columns.push("cl.time_inside_solver".into());
        columns.push("x.a_lifetime".into());
        for tier in Tier::ALL {
            columns.push(tier.label_column().into());
            columns.push(tier.percentile_column().into());
        }
        columns.push("x.sum_cl_use".into());
        columns
    }

    /// Rows of one dump bucket whose `tier` label falls in `range`, randomly
    /// ordered, optionally limited.
    pub fn stratum_sql(
        &self,
        tier: Tier,
        bucket: DumpBucket,
        range: &ValueRange,
        limited: bool,
    ) -> String {
        let label = tier.label_column();
        let mut sql = format!(
            "SELECT * FROM (\n{base}\n    AND {bucket}\n)\nWHERE \"{label}\" >= :lower",
            base = self.base,
            bucket = bucket.condition(),
        );
        if range.upper.is_some() {
            let _ = write!(sql, " AND \"{label}\" < :upper");
        }
        let _ = write!(sql, "\nORDER BY {RANDOM_FN}()");
        if limited {
            sql.push_str("\nLIMIT :limit");
        }
        sql
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::labels::LabelMaterializer;
    use crate::store::fixture;

    #[test]
    fn test_bucket_parts() {
        let parts: Vec<u64> = DumpBucket::ALL.iter().map(DumpBucket::parts).collect();
        assert_eq!(parts, vec![2, 1, 1]);
        assert_eq!(DumpBucket::Later.to_string(), "rdb0.dump_no > 2");
    }

    #[test]
    fn test_value_range_is_half_open() {
        let range = ValueRange {
            lower: 2.0,
            upper: Some(5.0),
        };
        assert!(range.contains(2.0));
        assert!(range.contains(4.9));
        assert!(!range.contains(5.0));

        let open = ValueRange {
            lower: 5.0,
            upper: None,
        };
        assert!(open.contains(1e12));
        assert!(!open.contains(4.0));
    }

    #[test]
    fn test_fragment_render() {
        let store = fixture::store();
        let schema = Schema::introspect(store.conn()).unwrap();
        let fragment = Fragment::new(&schema, &schema::SUM_CL_USE).unwrap();
        assert_eq!(
            fragment.render(),
            "\n    , sum_cl_use.\"clauseID\" AS \"sum_cl_use.clauseID\"\
             \n    , sum_cl_use.\"num_used\" AS \"sum_cl_use.num_used\"\
             \n    , sum_cl_use.\"last_confl_used\" AS \"sum_cl_use.last_confl_used\""
        );
    }

    #[test]
    fn test_build_fails_on_missing_table() {
        let store = fixture::store();
        store.execute_batch("DROP TABLE sum_cl_use").unwrap();
        let schema = Schema::introspect(store.conn()).unwrap();
        let err = TrainingQuery::build(&schema).unwrap_err();
        assert!(matches!(err, Error::MissingTable(ref t) if t == "sum_cl_use"));
    }

    #[test]
    fn test_columns_match_result_set() {
        let store = fixture::store();
        LabelMaterializer::new(&store).ensure_tables().unwrap();
        store.install_random_source(1).unwrap();
        let schema = Schema::introspect(store.conn()).unwrap();
        let query = TrainingQuery::build(&schema).unwrap();

        let range = ValueRange {
            lower: 0.0,
            upper: Some(1.0),
        };
        let sql = query.stratum_sql(Tier::Short, DumpBucket::First, &range, true);
        let dataset = store
            .query_dataset(
                &sql,
                rusqlite::named_params! {
                    ":observe": 10,
                    ":lower": 0.0,
                    ":upper": 1.0,
                    ":limit": 10,
                },
            )
            .unwrap();

        assert!(dataset.is_empty());
        assert_eq!(dataset.columns(), query.columns().as_slice());
        assert!(dataset.column_index("rdb0.dump_no").is_some());
        assert!(dataset.column_index("rst_cur.set").is_none());
        assert!(dataset.column_index("cl.clauseID").is_none());
    }

    #[test]
    fn test_stratum_sql_binds_values() {
        let store = fixture::store();
        let schema = Schema::introspect(store.conn()).unwrap();
        let query = TrainingQuery::build(&schema).unwrap();
        let range = ValueRange {
            lower: 3.0,
            upper: None,
        };

        let sql = query.stratum_sql(Tier::Long, DumpBucket::Second, &range, false);
        assert!(sql.contains("\"x.used_later_long\" >= :lower"));
        assert!(!sql.contains(":upper"));
        assert!(!sql.contains("LIMIT"));
        assert!(sql.contains("rdb0.dump_no = 2"));
        assert!(sql.contains("ORDER BY crystal_random()"));
    }
}
