//! Timestamps and hour buckets.
//!
//! All instants in chunkhouse are milliseconds since the Unix epoch. The
//! index shards its hash keys by hour: one shard per tenant per metric
//! per hour. This bounds hash-key cardinality and keeps every row group
//! (and therefore every range scan) roughly uniform and small.

/// Milliseconds since the Unix epoch.
pub type Timestamp = i64;

const SECONDS_PER_HOUR: i64 = 3600;

/// The hour bucket containing `t`.
pub fn hour_bucket(t: Timestamp) -> i64 {
    t / 1000 / SECONDS_PER_HOUR
}

/// Every hour bucket touched by the interval `[from, through]`, inclusive
/// on both ends.
pub fn hour_buckets(from: Timestamp, through: Timestamp) -> Vec<i64> {
    (hour_bucket(from)..=hour_bucket(through)).collect()
}
