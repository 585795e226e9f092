//! Chunkhouse Core Data Model
//!
//! This crate defines the fundamental types shared by every other
//! chunkhouse crate:
//!
//! 1. **Chunk**: an immutable, opaque block of encoded metric samples with
//!    an ID, a time range, and a label set
//! 2. **Labels / matchers**: the metric label map and the predicates used
//!    to select chunks by label value
//! 3. **Hour buckets**: the time sharding scheme for index hash keys
//! 4. **Chunk sets**: ID-ordered merge, dedup, and intersection used by
//!    the query planner
//!
//! ## Where This Sits
//!
//! ```text
//! ┌──────────────────┐
//! │ chunkhouse-store │  write path / query planner
//! └───────┬──────────┘
//!         │ Chunk, LabelMatcher, hour_buckets, chunkset
//!         ▼
//! ┌──────────────────┐
//! │ chunkhouse-core  │ ◄── You are here
//! └──────────────────┘
//! ```
//!
//! The crate has no I/O and no async code: everything here is a plain
//! data structure or a pure function, which keeps it trivially testable.

pub mod chunk;
pub mod chunkset;
pub mod error;
pub mod labels;
pub mod time;

pub use chunk::{parse_chunk_id, Chunk};
pub use error::{Error, Result};
pub use labels::{LabelMatcher, Labels, MatchType, METRIC_NAME};
pub use time::{hour_bucket, hour_buckets, Timestamp};
