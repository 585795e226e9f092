//! Query planner and executor.
//!
//! A query `(tenant, from, through, matchers)` decomposes as:
//!
//! ```text
//! get
//!  ├─ one sub-query per hour bucket of [from, through]
//!  │   ├─ no residual matchers: metric-name-only scan, dedup by ID
//!  │   └─ else: one range scan per matcher ─► n-way intersect
//!  ├─ union bucket results, dedup by ID
//!  ├─ time-filter by the range parsed out of each chunk ID
//!  ├─ cache probe ─► hits / misses
//!  ├─ hydrate misses from the blob store (parallel), warm the cache
//!  └─ sort by chunk ID
//! ```
//!
//! Equality matchers narrow their scan to exactly the matched value via
//! the order-preserving range encoding; every other matcher type scans
//! all values of its label name and filters client-side. Either way the
//! scan result is post-filtered — the index may return supersets.
//!
//! Fan-outs are never cancelled on sibling failure: all branches drain
//! and the last observed error surfaces.

use bytes::Bytes;
use futures::future::join_all;
use object_store::path::Path;

use chunkhouse_core::{
    chunkset, hour_buckets, parse_chunk_id, Chunk, LabelMatcher, Labels, MatchType, Timestamp,
    METRIC_NAME,
};
use chunkhouse_index::{keys, IndexRow, QueryInput, RangeBounds};
use chunkhouse_observability::metrics::{
    BLOB_REQUEST_DURATION, QUERY_CHUNKS, QUERY_DROPPED_MATCHES, QUERY_INDEX_LOOKUPS,
    QUERY_PAGES_PER_REQUEST,
};
use chunkhouse_observability::time_request;

use crate::error::{Error, Result};
use crate::fanout;
use crate::store::ChunkStore;

impl ChunkStore {
    /// Fetch every chunk of `tenant` overlapping `[from, through]` whose
    /// metric satisfies all of `matchers`, bodies loaded, sorted by
    /// chunk ID. `matchers` must include an equality matcher on
    /// `__name__`.
    pub async fn get(
        &self,
        tenant: &str,
        from: Timestamp,
        through: Timestamp,
        matchers: &[LabelMatcher],
    ) -> Result<Vec<Chunk>> {
        let chunks = self.lookup_chunks(tenant, from, through, matchers).await?;

        // Hour-bucket sharding means a scan can return chunks from the
        // same bucket that do not overlap the queried range.
        let mut filtered = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            let (chunk_from, chunk_through) = parse_chunk_id(&chunk.id)?;
            if chunk_through < from || through < chunk_from {
                continue;
            }
            filtered.push(chunk);
        }
        QUERY_CHUNKS.observe(filtered.len() as f64);

        let (from_cache, missing) = match &self.cache {
            Some(cache) => cache.fetch(tenant, filtered).await,
            None => (Vec::new(), filtered),
        };

        let fetched = self.fetch_chunk_bodies(tenant, missing).await?;
        if let Some(cache) = &self.cache {
            if let Err(err) = cache.store(tenant, &fetched).await {
                tracing::warn!(error = %err, "could not store fetched chunks in cache");
            }
        }

        let mut all = from_cache;
        all.extend(fetched);
        all.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(all)
    }

    async fn lookup_chunks(
        &self,
        tenant: &str,
        from: Timestamp,
        through: Timestamp,
        matchers: &[LabelMatcher],
    ) -> Result<Vec<Chunk>> {
        let (metric_name, matchers) = extract_metric_name(matchers)?;

        let buckets = hour_buckets(from, through);
        let results = join_all(
            buckets
                .into_iter()
                .map(|hour| self.lookup_bucket(tenant, hour, &metric_name, &matchers)),
        )
        .await;
        let (bucket_sets, last_err) = fanout::collect(results);

        let mut lookups = 0u64;
        let mut chunks = Vec::new();
        for (set, set_lookups) in bucket_sets {
            lookups += set_lookups;
            chunks.extend(set);
        }
        QUERY_INDEX_LOOKUPS.observe(lookups as f64);

        if let Some(err) = last_err {
            return Err(err);
        }
        Ok(chunkset::dedup_by_id(chunks))
    }

    /// One bucket's worth of the query; returns the matching chunk set
    /// and the number of index lookups it issued.
    async fn lookup_bucket(
        &self,
        tenant: &str,
        hour: i64,
        metric_name: &str,
        matchers: &[&LabelMatcher],
    ) -> Result<(Vec<Chunk>, u64)> {
        if matchers.is_empty() {
            let chunks = self.lookup_metric_name(tenant, hour, metric_name).await?;
            return Ok((chunks, 1));
        }

        let results = join_all(
            matchers
                .iter()
                .map(|matcher| self.lookup_matcher(tenant, hour, metric_name, matcher)),
        )
        .await;
        let (sets, last_err) = fanout::collect(results);
        if let Some(err) = last_err {
            return Err(err);
        }
        Ok((chunkset::intersect(sets), matchers.len() as u64))
    }

    /// Hash-key-only scan: every index entry for the metric in this
    /// bucket. A chunk appears once per label, so dedup by ID.
    async fn lookup_metric_name(
        &self,
        tenant: &str,
        hour: i64,
        metric_name: &str,
    ) -> Result<Vec<Chunk>> {
        let input = QueryInput {
            table: self.table_name.clone(),
            hash_key: keys::hash_key(tenant, hour, metric_name),
            range: None,
        };
        let mut chunks = Vec::new();
        self.query_pages(input, None, &mut chunks).await?;
        Ok(chunkset::dedup_by_id(chunks))
    }

    async fn lookup_matcher(
        &self,
        tenant: &str,
        hour: i64,
        metric_name: &str,
        matcher: &LabelMatcher,
    ) -> Result<Vec<Chunk>> {
        let range = match matcher.match_type {
            // all rows whose stored (label, value) equals the matcher
            MatchType::Equal => RangeBounds {
                low: keys::encode_range(&matcher.name, &matcher.value, ""),
                high: keys::encode_range(&matcher.name, &keys::successor(&matcher.value), ""),
            },
            // every value of this label; filtered client-side below
            _ => RangeBounds {
                low: keys::encode_range(&matcher.name, "", ""),
                high: keys::encode_range(&keys::successor(&matcher.name), "", ""),
            },
        };
        let input = QueryInput {
            table: self.table_name.clone(),
            hash_key: keys::hash_key(tenant, hour, metric_name),
            range: Some(range),
        };

        let mut chunks = Vec::new();
        self.query_pages(input, Some(matcher), &mut chunks).await?;
        chunks.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(chunks)
    }

    /// Drive one paged query through the dispatcher, accumulating parsed
    /// rows into `chunks` until the cursor is exhausted or a page fails
    /// to process.
    async fn query_pages(
        &self,
        input: QueryInput,
        matcher: Option<&LabelMatcher>,
        chunks: &mut Vec<Chunk>,
    ) -> Result<()> {
        let mut pages = 0u64;
        let mut dropped = 0u64;
        let mut cursor = self.index.query(input);
        let outcome = loop {
            cursor = match self.dispatcher.submit(cursor).await {
                Ok(cursor) => cursor,
                Err(err) => break Err(err),
            };
            pages += 1;
            match process_page(cursor.page(), matcher, chunks) {
                Ok(page_dropped) => dropped += page_dropped,
                Err(err) => break Err(err),
            }
            if !cursor.advance() {
                break Ok(());
            }
        };
        QUERY_PAGES_PER_REQUEST.observe(pages as f64);
        QUERY_DROPPED_MATCHES.observe(dropped as f64);
        outcome
    }

    async fn fetch_chunk_bodies(&self, tenant: &str, chunks: Vec<Chunk>) -> Result<Vec<Chunk>> {
        let results = join_all(
            chunks
                .into_iter()
                .map(|chunk| self.fetch_chunk_body(tenant, chunk)),
        )
        .await;
        let (fetched, last_err) = fanout::collect(results);
        match last_err {
            Some(err) => Err(err),
            None => Ok(fetched),
        }
    }

    /// Authoritative body load from the blob store.
    async fn fetch_chunk_body(&self, tenant: &str, chunk: Chunk) -> Result<Chunk> {
        let path = Path::from(Self::chunk_key(tenant, &chunk.id));
        let body = time_request("Get", &BLOB_REQUEST_DURATION, async {
            self.blob.get(&path).await?.bytes().await
        })
        .await?;
        let mut fetched = Chunk::decode(&body)?;
        fetched.metadata_in_index = chunk.metadata_in_index;
        Ok(fetched)
    }
}

/// Pull the mandatory `__name__` equality matcher out of the matcher
/// list; the rest are the residual matchers applied inside each bucket.
fn extract_metric_name(matchers: &[LabelMatcher]) -> Result<(String, Vec<&LabelMatcher>)> {
    let mut metric_name = None;
    let mut residual = Vec::with_capacity(matchers.len());
    for matcher in matchers {
        if matcher.name != METRIC_NAME {
            residual.push(matcher);
            continue;
        }
        if matcher.match_type != MatchType::Equal {
            return Err(Error::NonEqualityMetricNameMatcher);
        }
        metric_name = Some(matcher.value.clone());
    }
    match metric_name {
        Some(name) => Ok((name, residual)),
        None => Err(Error::MissingMetricNameMatcher),
    }
}

/// Turn one page of index rows into chunk stubs, applying the
/// client-side matcher filter. Returns how many rows were dropped.
fn process_page(
    rows: &[IndexRow],
    matcher: Option<&LabelMatcher>,
    chunks: &mut Vec<Chunk>,
) -> Result<u64> {
    let mut dropped = 0;
    for row in rows {
        let (label, value, chunk_id) = keys::decode_range(&row.range_key)?;
        let chunk = match &row.metadata {
            Some(raw) => Chunk::decode_metadata(raw)?,
            None => Chunk {
                id: chunk_id,
                from: 0,
                through: 0,
                metric: Labels::new(),
                data: Bytes::new(),
                metadata_in_index: false,
            },
        };
        if let Some(matcher) = matcher {
            if label != matcher.name || !matcher.matches(&value) {
                tracing::debug!(label = %label, value = %value, "dropping non-matching index row");
                dropped += 1;
                continue;
            }
        }
        chunks.push(chunk);
    }
    Ok(dropped)
}
