//! Error types for crystal-core

use thiserror::Error;

use crate::tier::Tier;

/// Result type for extraction operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while preparing or sampling an instrumentation store.
#[derive(Debug, Error)]
pub enum Error {
    /// Error reported by SQLite.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Dataset snapshot could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// A table the extraction query joins is absent from the store.
    #[error("table not found: {0}")]
    MissingTable(String),

    /// A join or filter column is absent from a table.
    #[error("column {column} not found in table {table}")]
    MissingColumn { table: String, column: String },

    /// No cut point was recorded for the requested percentile.
    #[error("no {percentile}% cut point recorded for tier {tier}")]
    MissingPercentile { tier: Tier, percentile: f64 },

    /// A row does not have one value per dataset column.
    #[error("row has {got} values, dataset has {expected} columns")]
    RowWidth { expected: usize, got: usize },

    /// Invalid extraction settings.
    #[error("configuration error: {0}")]
    Config(String),
}
