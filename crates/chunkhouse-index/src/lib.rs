//! Chunkhouse Index Clients
//!
//! The inverted label index lives in a wide-column key-value store with a
//! two-part primary key: a string **hash key** selecting a partition and
//! a binary **range key** ordering rows within it. This crate owns
//! everything that touches that store:
//!
//! 1. **Key codec** ([`keys`]): the `(tenant, hour, metric)` hash key and
//!    the order-preserving `(label, value, chunkID)` range-key encoding
//!    that makes `BETWEEN` scans answer prefix queries
//! 2. **Capability traits**: [`IndexClient`], [`IndexRequest`], and
//!    [`QueryPages`] — the only surface the rest of chunkhouse depends on
//! 3. **Backends**: [`DynamoIndexClient`] against DynamoDB, and
//!    [`MemoryIndexClient`], an in-memory fake for tests
//!
//! ## Request Objects
//!
//! Writes and queries are *built* by the client but *executed* by the
//! caller, through [`IndexRequest::send`]. This is what lets the store's
//! dispatcher own the retry/backoff policy: a throttled request can be
//! re-sent as many times as needed without the client knowing. Paged
//! queries extend the same idea with a cursor ([`QueryPages`]) the
//! planner advances one page at a time.

use async_trait::async_trait;

pub mod dynamo;
pub mod error;
pub mod keys;
pub mod memory;
pub mod types;

pub use dynamo::DynamoIndexClient;
pub use error::{IndexError, Result, THROTTLED_ERROR_CODE};
pub use memory::MemoryIndexClient;
pub use types::{
    IndexEntry, IndexRow, ProvisionedCapacity, QueryInput, RangeBounds, MAX_BATCH_SIZE,
};

/// A remote index operation that can be (re-)executed.
#[async_trait]
pub trait IndexRequest: Send {
    /// Remote operation name, used as the latency-metric label.
    fn operation_name(&self) -> &'static str;

    /// Execute the request. Retrying after a [`IndexError::Throttled`]
    /// failure re-runs the same operation; implementations must not
    /// advance their state on a failed send.
    async fn send(&mut self) -> Result<()>;
}

#[async_trait]
impl<T: IndexRequest + ?Sized> IndexRequest for Box<T> {
    fn operation_name(&self) -> &'static str {
        (**self).operation_name()
    }

    async fn send(&mut self) -> Result<()> {
        (**self).send().await
    }
}

/// A stateful cursor over the pages of one logical query.
///
/// Usage: `send` the cursor (through the dispatcher), read [`page`],
/// then [`advance`] and re-send until `advance` returns `false`.
///
/// [`page`]: QueryPages::page
/// [`advance`]: QueryPages::advance
pub trait QueryPages: IndexRequest {
    /// Rows of the most recently sent page.
    fn page(&self) -> &[types::IndexRow];

    /// Whether the store reported more pages after the current one.
    fn has_next_page(&self) -> bool;

    /// Position the cursor on the next page. Returns `false` (leaving the
    /// cursor unchanged) when the current page was the last.
    fn advance(&mut self) -> bool;
}

/// Capability facade over the wide-column KV holding the index.
#[async_trait]
pub trait IndexClient: Send + Sync {
    /// Names of existing tables; used as the lifecycle probe before
    /// creating the index table.
    async fn list_tables(&self) -> Result<Vec<String>>;

    /// Create an index table with the hash-then-range schema.
    async fn create_table(&self, name: &str, capacity: ProvisionedCapacity) -> Result<()>;

    /// Build a batch-write request for up to [`MAX_BATCH_SIZE`] entries.
    /// The batch is applied atomically by the underlying store.
    fn batch_put(&self, table: &str, entries: Vec<IndexEntry>) -> Box<dyn IndexRequest>;

    /// Build a paged query cursor. Nothing is fetched until the first
    /// `send`.
    fn query(&self, input: QueryInput) -> Box<dyn QueryPages>;
}
