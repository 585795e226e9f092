//! Chunk Body Cache
//!
//! An in-memory LRU cache over encoded chunk bodies, consulted by the
//! query planner before the blob store. Blob gets cost tens to hundreds
//! of milliseconds and real money; repeated queries over the same range
//! hit the same chunks, so a modest cache absorbs most body fetches.
//!
//! The cache is strictly best-effort: the store works identically (just
//! slower) without one, and cache errors never fail a request — callers
//! log and continue. Bodies are keyed `"<tenant>/<chunkID>"`, the same
//! namespace as the blob store, so tenants can never observe each
//! other's entries.
//!
//! Eviction is by least-recently-used body under a byte budget: before
//! inserting, bodies are popped from the cold end until the newcomer
//! fits.

use std::num::NonZeroUsize;

use bytes::Bytes;
use lru::LruCache;
use tokio::sync::Mutex;

use chunkhouse_core::Chunk;
use chunkhouse_observability::metrics::{CACHE_HITS_TOTAL, CACHE_MISSES_TOTAL};

use crate::error::Result;

/// Upper bound on tracked entries, independent of the byte budget.
const MAX_TRACKED_CHUNKS: usize = 10_000;

pub struct ChunkCache {
    max_size_bytes: u64,
    state: Mutex<CacheState>,
}

struct CacheState {
    current_size: u64,
    bodies: LruCache<String, Bytes>,
}

impl ChunkCache {
    pub fn new(max_size_bytes: u64) -> Self {
        let capacity = NonZeroUsize::new(MAX_TRACKED_CHUNKS).expect("capacity is non-zero");
        Self {
            max_size_bytes,
            state: Mutex::new(CacheState {
                current_size: 0,
                bodies: LruCache::new(capacity),
            }),
        }
    }

    /// Partition `chunks` into cache hits (bodies attached) and misses.
    /// A cached body that no longer decodes is dropped and counted as a
    /// miss; the cache never fabricates chunks.
    pub async fn fetch(&self, tenant: &str, chunks: Vec<Chunk>) -> (Vec<Chunk>, Vec<Chunk>) {
        let mut hits = Vec::new();
        let mut misses = Vec::new();
        let mut state = self.state.lock().await;
        for chunk in chunks {
            let key = cache_key(tenant, &chunk.id);
            let cached = state.bodies.get(&key).cloned();
            match cached {
                Some(body) => match Chunk::decode(&body) {
                    Ok(mut hit) => {
                        hit.metadata_in_index = chunk.metadata_in_index;
                        CACHE_HITS_TOTAL.inc();
                        hits.push(hit);
                    }
                    Err(err) => {
                        tracing::warn!(
                            chunk_id = %chunk.id,
                            error = %err,
                            "dropping undecodable cached chunk body"
                        );
                        if let Some(bad) = state.bodies.pop(&key) {
                            state.current_size = state.current_size.saturating_sub(bad.len() as u64);
                        }
                        CACHE_MISSES_TOTAL.inc();
                        misses.push(chunk);
                    }
                },
                None => {
                    CACHE_MISSES_TOTAL.inc();
                    misses.push(chunk);
                }
            }
        }
        (hits, misses)
    }

    /// Store encoded bodies for every chunk, evicting LRU entries to make
    /// room.
    pub async fn store(&self, tenant: &str, chunks: &[Chunk]) -> Result<()> {
        for chunk in chunks {
            self.store_chunk(tenant, chunk).await?;
        }
        Ok(())
    }

    /// Single-chunk variant of [`ChunkCache::store`].
    pub async fn store_chunk(&self, tenant: &str, chunk: &Chunk) -> Result<()> {
        let body = chunk.encode()?;
        let size = body.len() as u64;
        let mut state = self.state.lock().await;

        while state.current_size + size > self.max_size_bytes {
            match state.bodies.pop_lru() {
                Some((_, evicted)) => {
                    state.current_size = state.current_size.saturating_sub(evicted.len() as u64);
                }
                None => {
                    tracing::warn!(
                        chunk_id = %chunk.id,
                        size,
                        max_size = self.max_size_bytes,
                        "chunk body larger than the whole cache budget"
                    );
                    break;
                }
            }
        }

        if let Some(previous) = state.bodies.put(cache_key(tenant, &chunk.id), body) {
            state.current_size = state.current_size.saturating_sub(previous.len() as u64);
        }
        state.current_size += size;
        Ok(())
    }

    pub async fn stats(&self) -> CacheStats {
        let state = self.state.lock().await;
        CacheStats {
            current_size: state.current_size,
            max_size: self.max_size_bytes,
            entry_count: state.bodies.len(),
        }
    }
}

fn cache_key(tenant: &str, chunk_id: &str) -> String {
    format!("{tenant}/{chunk_id}")
}

#[derive(Debug, Clone)]
pub struct CacheStats {
    pub current_size: u64,
    pub max_size: u64,
    pub entry_count: usize,
}
