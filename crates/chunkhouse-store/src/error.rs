//! Store error types.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// A chunk was submitted without a `__name__` label.
    #[error("chunk has no metric name label")]
    MissingMetricName,

    /// A query had no matcher on `__name__`.
    #[error("query has no metric name matcher")]
    MissingMetricNameMatcher,

    /// The `__name__` matcher must be an equality match; it is part of
    /// the hash key and cannot be range-scanned.
    #[error("metric name matcher must be an equality match")]
    NonEqualityMetricNameMatcher,

    #[error(transparent)]
    Core(#[from] chunkhouse_core::Error),

    #[error("index store error: {0}")]
    Index(#[from] chunkhouse_index::IndexError),

    #[error("blob store error: {0}")]
    Blob(#[from] object_store::Error),

    #[error("invalid endpoint configuration: {0}")]
    Config(String),

    /// The dispatcher was stopped; submitting further work is a
    /// programming error.
    #[error("store is stopped")]
    Stopped,
}
