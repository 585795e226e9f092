//! Index row and request types.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Hash key attribute name.
pub const HASH_KEY: &str = "h";
/// Range key attribute name.
pub const RANGE_KEY: &str = "r";
/// Optional inline chunk metadata attribute name.
pub const METADATA_KEY: &str = "c";

/// Upper bound on entries per batch write, imposed by the store.
pub const MAX_BATCH_SIZE: usize = 25;

/// One row to be written into the index.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexEntry {
    /// `<tenant>:<hourBucket>:<metricName>`
    pub hash_key: String,
    /// Order-preserving encoding of `(label, value, chunkID)`.
    pub range_key: Bytes,
    /// Optional inline JSON copy of the chunk metadata.
    pub metadata: Option<Bytes>,
}

/// One row returned from a query page.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexRow {
    pub range_key: Bytes,
    pub metadata: Option<Bytes>,
}

/// A single-partition query: hash-key equality, optionally narrowed by an
/// inclusive `BETWEEN` on the range key.
#[derive(Debug, Clone)]
pub struct QueryInput {
    pub table: String,
    pub hash_key: String,
    pub range: Option<RangeBounds>,
}

/// Inclusive range-key bounds. Upper bounds are produced from
/// [`crate::keys::successor`] with an empty chunk-ID field, which sorts
/// before every real row of the successor value, so the scan behaves as
/// a half-open interval in practice.
#[derive(Debug, Clone)]
pub struct RangeBounds {
    pub low: Bytes,
    pub high: Bytes,
}

/// Provisioned read/write capacity for a newly created index table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisionedCapacity {
    pub read_units: i64,
    pub write_units: i64,
}

impl Default for ProvisionedCapacity {
    fn default() -> Self {
        Self {
            read_units: 10,
            write_units: 5,
        }
    }
}
