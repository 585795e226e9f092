//! Core error types.
//!
//! All fallible operations in this crate return `Result<T>` which is
//! aliased to `Result<T, Error>`, allowing clean propagation with `?`.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid chunk id: {0}")]
    InvalidChunkId(String),

    #[error("invalid matcher pattern: {0}")]
    InvalidMatcher(#[from] regex::Error),

    #[error("chunk decode error: {0}")]
    Decode(#[from] serde_json::Error),
}
