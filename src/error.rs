//! Error types shared by the boundary loader and the range engine.

use std::path::PathBuf;

/// Failures that abort a load or a query.
///
/// Per-record parse problems are not represented here; see [`RecordError`].
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The boundary or record source could not be opened at all.
    #[error("source unavailable: {path}")]
    SourceUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("invalid config: {0}")]
    Config(String),

    /// A query argument that makes the computation meaningless (negative radius, NaN, ...).
    #[error("invalid query: {0}")]
    InvalidQuery(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Why a single source record was skipped.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RecordError {
    #[error("expected at least {expected} fields, found {found}")]
    TooFewFields { expected: usize, found: usize },

    #[error("field `{field}` is not a valid number: {value:?}")]
    BadNumber { field: &'static str, value: String },

    #[error("unknown region level {0}")]
    UnknownLevel(i64),

    #[error("bad timestamp {0:?}")]
    BadTimestamp(String),
}
