//! Tabular training data and its on-disk forms.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::tier::Tier;

/// A single cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
}

impl Value {
    /// Numeric view of the cell, if it has one.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Integer(i) => Some(*i as f64),
            Self::Real(f) => Some(*f),
            Self::Null | Self::Text(_) => None,
        }
    }

    fn write_csv(&self, out: &mut impl Write) -> std::io::Result<()> {
        match self {
            Self::Null => Ok(()),
            Self::Integer(i) => write!(out, "{}", i),
            Self::Real(f) => write!(out, "{}", f),
            Self::Text(s) => write_csv_field(out, s),
        }
    }
}

fn write_csv_field(out: &mut impl Write, s: &str) -> std::io::Result<()> {
    if s.contains([',', '"', '\n', '\r']) {
        write!(out, "\"{}\"", s.replace('"', "\"\""))
    } else {
        write!(out, "{}", s)
    }
}

/// Row-major table with named columns.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

impl Dataset {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Append a row holding one value per column.
    pub fn push_row(&mut self, row: Vec<Value>) -> Result<()> {
        if row.len() != self.columns.len() {
            return Err(Error::RowWidth {
                expected: self.columns.len(),
                got: row.len(),
            });
        }
        self.rows.push(row);
        Ok(())
    }

    /// Values of one column, top to bottom.
    pub fn column(&self, name: &str) -> Option<impl Iterator<Item = &Value>> {
        let idx = self.column_index(name)?;
        Some(self.rows.iter().map(move |row| &row[idx]))
    }

    /// Append all rows of `other`, which must have the same columns.
    pub fn append(&mut self, mut other: Dataset) -> Result<()> {
        if self.columns.is_empty() && self.rows.is_empty() {
            *self = other;
            return Ok(());
        }
        if other.columns != self.columns {
            return Err(Error::Config(format!(
                "cannot concatenate datasets with {} and {} columns",
                self.columns.len(),
                other.columns.len()
            )));
        }
        self.rows.append(&mut other.rows);
        Ok(())
    }

    /// Concatenate datasets sharing one column layout.
    pub fn concat(parts: impl IntoIterator<Item = Dataset>) -> Result<Self> {
        let mut out = Dataset::default();
        for part in parts {
            out.append(part)?;
        }
        Ok(out)
    }

    /// Count, mean, min and max of every numeric column.
    pub fn describe(&self) -> Vec<ColumnSummary> {
        self.columns
            .iter()
            .enumerate()
            .filter_map(|(idx, name)| {
                let values: Vec<f64> = self.rows.iter().filter_map(|r| r[idx].as_f64()).collect();
                if values.is_empty() {
                    return None;
                }
                let count = values.len();
                let mean = values.iter().sum::<f64>() / count as f64;
                let min = values.iter().copied().fold(f64::INFINITY, f64::min);
                let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
                Some(ColumnSummary {
                    name: name.clone(),
                    count,
                    mean,
                    min,
                    max,
                })
            })
            .collect()
    }

    /// Write as CSV with columns in alphabetical order.
    pub fn write_csv(&self, path: &Path) -> Result<()> {
        let mut order: Vec<usize> = (0..self.columns.len()).collect();
        order.sort_by(|&a, &b| self.columns[a].cmp(&self.columns[b]));

        let mut out = BufWriter::new(File::create(path)?);
        for (n, &idx) in order.iter().enumerate() {
            if n > 0 {
                out.write_all(b",")?;
            }
            write_csv_field(&mut out, &self.columns[idx])?;
        }
        out.write_all(b"\n")?;
        for row in &self.rows {
            for (n, &idx) in order.iter().enumerate() {
                if n > 0 {
                    out.write_all(b",")?;
                }
                row[idx].write_csv(&mut out)?;
            }
            out.write_all(b"\n")?;
        }
        out.flush()?;
        Ok(())
    }
}

/// Summary statistics of one numeric column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSummary {
    pub name: String,
    pub count: usize,
    pub mean: f64,
    pub min: f64,
    pub max: f64,
}

/// Provenance stored alongside a dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetMeta {
    pub source: String,
    pub tier: Tier,
    pub cut1: f64,
    pub cut2: f64,
    pub limit: i64,
    pub seed: u64,
    pub generated_at: DateTime<Utc>,
}

/// The `.dat` file contents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetSnapshot {
    pub meta: DatasetMeta,
    pub dataset: Dataset,
}

impl DatasetSnapshot {
    pub fn write(&self, path: &Path) -> Result<()> {
        let mut out = BufWriter::new(File::create(path)?);
        bincode::serialize_into(&mut out, self)?;
        out.flush()?;
        Ok(())
    }

    pub fn read(path: &Path) -> Result<Self> {
        let input = BufReader::new(File::open(path)?);
        Ok(bincode::deserialize_from(input)?)
    }
}

const INPUT_SUFFIXES: [&str; 3] = [".cnf.gz.sqlite", ".sqlitedb", ".db"];

/// Output path stem for one (input, tier) extraction, without extension.
///
/// Known database suffixes are stripped from the input name. When
/// `output_dir` is given the stem is placed there instead of next to the input.
pub fn output_stem(
    input: &Path,
    output_dir: Option<&Path>,
    tier: Tier,
    cut1: f64,
    cut2: f64,
    limit: i64,
) -> PathBuf {
    let name = input
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let clean = INPUT_SUFFIXES
        .iter()
        .find_map(|suffix| name.strip_suffix(suffix))
        .unwrap_or(&name);
    let stem = format!(
        "{}-cldata-{}-cut1-{:?}-cut2-{:?}-limit-{}",
        clean, tier, cut1, cut2, limit
    );
    match output_dir {
        Some(dir) => dir.join(stem),
        None => input.with_file_name(stem),
    }
}
