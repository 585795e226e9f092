//! Chunkhouse Chunk Store
//!
//! The storage layer proper: a multi-tenant store for immutable chunks of
//! encoded metric samples, backed by two remote services.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────┐
//! │    Caller    │
//! └──┬────────┬──┘
//!    │ put    │ get
//!    ▼        ▼
//! ┌─────────────────────────────┐
//! │         ChunkStore          │ ◄── You are here
//! │  write path │ query planner │
//! └──┬───────┬──┴──┬─────────┬──┘
//!    │ bodies│     │ index   │ bodies
//!    ▼       │     ▼         ▼
//! ┌───────┐  │  ┌──────────┐ ┌────────────┐
//! │ Blob  │  │  │Dispatcher│ │ ChunkCache │
//! │ store │  │  │(50 wkrs, │ │ (LRU, opt) │
//! │ (S3)  │  │  │ backoff) │ └────────────┘
//! └───────┘  │  └────┬─────┘
//!            │       ▼
//!            │  ┌──────────┐
//!            └─►│ Index KV │
//!               │(DynamoDB)│
//!               └──────────┘
//! ```
//!
//! ## Write Path
//!
//! `put` writes chunk bodies to the blob store first (one concurrent put
//! per chunk), then explodes every chunk into index entries — one per
//! hour bucket per non-`__name__` label — and writes them in batches of
//! at most 25 through the dispatcher. Bodies-first ordering means an
//! index entry never points at a missing body.
//!
//! ## Read Path
//!
//! `get` plans one sub-query per hour bucket of the requested range, and
//! within each bucket one range scan per label matcher; the resulting
//! ID-sorted chunk sets are intersected, unioned across buckets,
//! time-filtered, looked up in the cache, and the misses hydrated from
//! the blob store. Results come back sorted by chunk ID.
//!
//! ## Throttling
//!
//! Both services meter capacity. The SDK-level retry is disabled and the
//! [`dispatcher::Dispatcher`] owns the policy instead: throttled requests
//! back off exponentially (100 ms doubling to 1 s) and retry until they
//! resolve, while at most 50 index requests are in flight at once.

pub mod cache;
pub mod config;
pub mod dispatcher;
pub mod error;
mod fanout;
mod query;
pub mod store;
mod writer;

pub use cache::{CacheStats, ChunkCache};
pub use config::{CacheConfig, StoreConfig};
pub use dispatcher::{Dispatcher, NUM_INDEX_WORKERS};
pub use error::{Error, Result};
pub use store::{ChunkStore, StoreOptions};
