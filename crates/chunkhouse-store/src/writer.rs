//! Write path.
//!
//! Chunk bodies go to the blob store first, fanned out one put per
//! chunk; only when every body is durable does the index update start.
//! A reader that finds an index entry can therefore always load the
//! body — the failure mode of independent writes is a dead, invisible
//! body, never a dangling pointer.
//!
//! The index update explodes each chunk into one entry per touched hour
//! bucket per non-`__name__` label, then writes the entries serially in
//! batches of at most [`MAX_BATCH_SIZE`] through the dispatcher, which
//! absorbs throttling.

use futures::future::join_all;
use object_store::path::Path;

use chunkhouse_core::{hour_buckets, Chunk, METRIC_NAME};
use chunkhouse_index::{keys, IndexEntry, MAX_BATCH_SIZE};
use chunkhouse_observability::metrics::{BLOB_REQUEST_DURATION, INDEX_ENTRIES_PER_CHUNK};
use chunkhouse_observability::time_request;

use crate::error::{Error, Result};
use crate::fanout;
use crate::store::ChunkStore;

impl ChunkStore {
    /// Store `chunks` for `tenant`: bodies to the blob store, then index
    /// entries. There is no atomicity across chunks; callers must not
    /// assume all-or-nothing behaviour.
    pub async fn put(&self, tenant: &str, chunks: &[Chunk]) -> Result<()> {
        self.put_chunk_bodies(tenant, chunks).await?;
        self.update_index(tenant, chunks).await
    }

    async fn put_chunk_bodies(&self, tenant: &str, chunks: &[Chunk]) -> Result<()> {
        let results = join_all(
            chunks
                .iter()
                .map(|chunk| self.put_chunk_body(tenant, chunk)),
        )
        .await;
        let (_, last_err) = fanout::collect(results);
        match last_err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn put_chunk_body(&self, tenant: &str, chunk: &Chunk) -> Result<()> {
        let body = chunk.encode()?;
        let path = Path::from(Self::chunk_key(tenant, &chunk.id));
        time_request("Put", &BLOB_REQUEST_DURATION, async {
            self.blob.put(&path, body).await
        })
        .await?;

        if let Some(cache) = &self.cache {
            if let Err(err) = cache.store_chunk(tenant, chunk).await {
                tracing::warn!(
                    chunk_id = %chunk.id,
                    error = %err,
                    "could not store chunk in cache"
                );
            }
        }
        Ok(())
    }

    async fn update_index(&self, tenant: &str, chunks: &[Chunk]) -> Result<()> {
        let entries = self.index_entries(tenant, chunks)?;
        for batch in entries.chunks(MAX_BATCH_SIZE) {
            let request = self.index.batch_put(&self.table_name, batch.to_vec());
            self.dispatcher.submit(request).await?;
        }
        Ok(())
    }

    /// One entry per hour bucket per non-name label of each chunk.
    fn index_entries(&self, tenant: &str, chunks: &[Chunk]) -> Result<Vec<IndexEntry>> {
        let mut entries = Vec::new();
        for chunk in chunks {
            let metric_name = chunk.metric_name().ok_or(Error::MissingMetricName)?;
            let metadata = if self.inline_metadata {
                Some(chunk.encode_metadata()?)
            } else {
                None
            };

            let mut per_chunk = 0usize;
            for hour in hour_buckets(chunk.from, chunk.through) {
                let hash_key = keys::hash_key(tenant, hour, metric_name);
                for (label, value) in &chunk.metric {
                    if label == METRIC_NAME {
                        continue;
                    }
                    per_chunk += 1;
                    entries.push(IndexEntry {
                        hash_key: hash_key.clone(),
                        range_key: keys::encode_range(label, value, &chunk.id),
                        metadata: metadata.clone(),
                    });
                }
            }
            INDEX_ENTRIES_PER_CHUNK.observe(per_chunk as f64);
        }
        Ok(entries)
    }
}
