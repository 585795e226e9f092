//! The chunk store facade.
//!
//! [`ChunkStore`] ties the pieces together: the index client, the blob
//! store, the optional body cache, and the request dispatcher. The write
//! path lives in `writer.rs`, the query planner in `query.rs`; this
//! module owns construction, table lifecycle, and shutdown.
//!
//! Every operation takes the tenant explicitly. Tenant isolation is
//! structural: the tenant prefixes every index hash key and every blob
//! key, so no request can address another tenant's rows or bodies.

use std::sync::Arc;

use object_store::ObjectStore;

use chunkhouse_index::{DynamoIndexClient, IndexClient, ProvisionedCapacity};

use crate::cache::ChunkCache;
use crate::config::{self, StoreConfig};
use crate::dispatcher::{Dispatcher, NUM_INDEX_WORKERS};
use crate::error::Result;

/// Tuning knobs shared by both constructors.
#[derive(Debug, Clone, Copy, Default)]
pub struct StoreOptions {
    /// Write a JSON copy of chunk metadata into every index entry.
    pub inline_metadata: bool,
    /// Provisioned capacity used when creating the index table.
    pub capacity: ProvisionedCapacity,
}

pub struct ChunkStore {
    pub(crate) index: Arc<dyn IndexClient>,
    pub(crate) blob: Arc<dyn ObjectStore>,
    pub(crate) cache: Option<ChunkCache>,
    pub(crate) table_name: String,
    pub(crate) capacity: ProvisionedCapacity,
    pub(crate) inline_metadata: bool,
    pub(crate) dispatcher: Dispatcher,
}

impl ChunkStore {
    /// Build a store against real remote services from endpoint URLs.
    /// Must be called within a tokio runtime (the dispatcher spawns its
    /// worker pool here).
    pub fn new(config: StoreConfig) -> Result<Self> {
        chunkhouse_observability::init();

        let blob_endpoint = config::parse_endpoint(&config.blob_url)?;
        let index_endpoint = config::parse_endpoint(&config.index_url)?;
        let blob = config::blob_client(&blob_endpoint)?;
        let index: Arc<dyn IndexClient> =
            Arc::new(DynamoIndexClient::new(config::dynamo_client(&index_endpoint)));
        let cache = config.cache.map(|c| ChunkCache::new(c.max_size_bytes));

        Ok(Self::with_clients(
            index,
            blob,
            cache,
            index_endpoint.resource,
            StoreOptions {
                inline_metadata: config.inline_metadata,
                capacity: config.capacity,
            },
        ))
    }

    /// Build a store from injected clients; used by tests to run against
    /// in-memory fakes.
    pub fn with_clients(
        index: Arc<dyn IndexClient>,
        blob: Arc<dyn ObjectStore>,
        cache: Option<ChunkCache>,
        table_name: impl Into<String>,
        options: StoreOptions,
    ) -> Self {
        Self {
            index,
            blob,
            cache,
            table_name: table_name.into(),
            capacity: options.capacity,
            inline_metadata: options.inline_metadata,
            dispatcher: Dispatcher::new(NUM_INDEX_WORKERS),
        }
    }

    /// Create the index table if it does not already exist.
    pub async fn create_tables(&self) -> Result<()> {
        let tables = self.index.list_tables().await?;
        if tables.iter().any(|name| name == &self.table_name) {
            return Ok(());
        }
        tracing::info!(table = %self.table_name, "creating index table");
        self.index.create_table(&self.table_name, self.capacity).await?;
        Ok(())
    }

    /// Drain in-flight index requests and shut the dispatcher down.
    /// Idempotent; operations submitted afterwards fail with
    /// [`crate::Error::Stopped`].
    pub async fn stop(&self) {
        self.dispatcher.stop().await;
    }

    /// Blob key for a chunk body.
    pub(crate) fn chunk_key(tenant: &str, chunk_id: &str) -> String {
        format!("{tenant}/{chunk_id}")
    }
}
