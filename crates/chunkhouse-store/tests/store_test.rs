//! End-to-end store scenarios against the in-memory fakes.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use object_store::memory::InMemory;
use object_store::path::Path;
use object_store::ObjectStore;
use tokio::time::Instant;

use chunkhouse_core::{Chunk, LabelMatcher, Labels, MatchType, METRIC_NAME};
use chunkhouse_index::{IndexClient, IndexError, MemoryIndexClient};
use chunkhouse_store::{ChunkCache, ChunkStore, Error, StoreOptions};

const TABLE: &str = "chunk_index";
const HOUR_MS: i64 = 3_600_000;

fn labels(pairs: &[(&str, &str)]) -> Labels {
    pairs
        .iter()
        .map(|(name, value)| (name.to_string(), value.to_string()))
        .collect()
}

fn chunk(fingerprint: u64, from: i64, through: i64, pairs: &[(&str, &str)]) -> Chunk {
    Chunk::new(
        fingerprint,
        from,
        through,
        labels(pairs),
        Bytes::from(format!("body-{fingerprint}")),
    )
}

fn eq(name: &str, value: &str) -> LabelMatcher {
    LabelMatcher::new(MatchType::Equal, name, value).expect("valid matcher")
}

fn re(name: &str, pattern: &str) -> LabelMatcher {
    LabelMatcher::new(MatchType::RegexMatch, name, pattern).expect("valid matcher")
}

struct Fixture {
    store: ChunkStore,
    index: MemoryIndexClient,
    blob: Arc<InMemory>,
}

async fn fixture() -> Fixture {
    fixture_with(MemoryIndexClient::new(), None, StoreOptions::default()).await
}

async fn fixture_with(
    index: MemoryIndexClient,
    cache: Option<ChunkCache>,
    options: StoreOptions,
) -> Fixture {
    let blob = Arc::new(InMemory::new());
    let store = ChunkStore::with_clients(
        Arc::new(index.clone()),
        Arc::clone(&blob) as Arc<dyn ObjectStore>,
        cache,
        TABLE,
        options,
    );
    store.create_tables().await.expect("create tables");
    Fixture { store, index, blob }
}

fn ids(chunks: &[Chunk]) -> Vec<&str> {
    chunks.iter().map(|c| c.id.as_str()).collect()
}

#[tokio::test]
async fn simple_write_then_read() {
    let f = fixture().await;
    let written = chunk(1, 1, 10, &[(METRIC_NAME, "m"), ("job", "a")]);
    f.store.put("u1", &[written.clone()]).await.unwrap();

    let found = f.store.get("u1", 0, 20, &[eq(METRIC_NAME, "m")]).await.unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].id, written.id);
    assert_eq!(found[0].metric, written.metric);
    assert_eq!(found[0].data, written.data);

    // disjoint range finds nothing
    let none = f.store.get("u1", 11, 20, &[eq(METRIC_NAME, "m")]).await.unwrap();
    assert!(none.is_empty());
}

#[tokio::test]
async fn create_tables_is_idempotent() {
    let f = fixture().await;
    // a second call sees the table and does not try to recreate it
    f.store.create_tables().await.unwrap();
    assert_eq!(f.index.list_tables().await.unwrap(), vec![TABLE]);
}

#[tokio::test]
async fn equality_matcher_selects_one_series() {
    let f = fixture().await;
    let chunks = [
        chunk(1, 0, 10, &[(METRIC_NAME, "m"), ("job", "a")]),
        chunk(2, 0, 10, &[(METRIC_NAME, "m"), ("job", "b")]),
        chunk(3, 0, 10, &[(METRIC_NAME, "m"), ("job", "c")]),
    ];
    f.store.put("u1", &chunks).await.unwrap();

    let found = f
        .store
        .get("u1", 0, 20, &[eq(METRIC_NAME, "m"), eq("job", "b")])
        .await
        .unwrap();
    assert_eq!(ids(&found), vec!["2:0:10"]);
}

#[tokio::test]
async fn regex_matcher_filters_scanned_values() {
    let f = fixture().await;
    let chunks = [
        chunk(1, 0, 10, &[(METRIC_NAME, "m"), ("job", "a")]),
        chunk(2, 0, 10, &[(METRIC_NAME, "m"), ("job", "b")]),
        chunk(3, 0, 10, &[(METRIC_NAME, "m"), ("job", "c")]),
    ];
    f.store.put("u1", &chunks).await.unwrap();

    let found = f
        .store
        .get("u1", 0, 20, &[eq(METRIC_NAME, "m"), re("job", "a|c")])
        .await
        .unwrap();
    assert_eq!(ids(&found), vec!["1:0:10", "3:0:10"]);
}

#[tokio::test]
async fn not_equal_matcher_scans_and_filters() {
    let f = fixture().await;
    let chunks = [
        chunk(1, 0, 10, &[(METRIC_NAME, "m"), ("job", "a")]),
        chunk(2, 0, 10, &[(METRIC_NAME, "m"), ("job", "b")]),
    ];
    f.store.put("u1", &chunks).await.unwrap();

    let found = f
        .store
        .get(
            "u1",
            0,
            20,
            &[
                eq(METRIC_NAME, "m"),
                LabelMatcher::new(MatchType::NotEqual, "job", "a").unwrap(),
            ],
        )
        .await
        .unwrap();
    assert_eq!(ids(&found), vec!["2:0:10"]);
}

#[tokio::test]
async fn matcher_intersection() {
    let f = fixture().await;
    let chunks = [
        chunk(1, 0, 10, &[(METRIC_NAME, "m"), ("l1", "a"), ("l2", "b")]),
        chunk(2, 0, 10, &[(METRIC_NAME, "m"), ("l1", "a"), ("l2", "c")]),
        chunk(3, 0, 10, &[(METRIC_NAME, "m"), ("l1", "b"), ("l2", "c")]),
    ];
    f.store.put("u1", &chunks).await.unwrap();

    let found = f
        .store
        .get(
            "u1",
            0,
            20,
            &[eq(METRIC_NAME, "m"), eq("l1", "a"), eq("l2", "b")],
        )
        .await
        .unwrap();
    assert_eq!(ids(&found), vec!["1:0:10"]);
}

#[tokio::test]
async fn tenants_are_isolated() {
    let f = fixture().await;
    let shared = chunk(1, 0, 10, &[(METRIC_NAME, "m"), ("job", "a")]);
    f.store.put("u1", &[shared.clone()]).await.unwrap();
    f.store.put("u2", &[shared.clone()]).await.unwrap();

    let u1 = f.store.get("u1", 0, 20, &[eq(METRIC_NAME, "m")]).await.unwrap();
    assert_eq!(u1.len(), 1);

    // an unknown tenant sees nothing, matchers or not
    let u3 = f
        .store
        .get("u3", 0, 20, &[eq(METRIC_NAME, "m"), eq("job", "a")])
        .await
        .unwrap();
    assert!(u3.is_empty());

    // hash keys and blob keys both carry the tenant prefix
    let hash_keys = f.index.hash_keys(TABLE);
    assert!(hash_keys.iter().all(|k| k.starts_with("u1:") || k.starts_with("u2:")));
    assert!(f.blob.head(&Path::from("u1/1:0:10")).await.is_ok());
    assert!(f.blob.head(&Path::from("u2/1:0:10")).await.is_ok());
}

#[tokio::test]
async fn chunk_spanning_buckets_returned_once() {
    let f = fixture().await;
    // 3590s..3610s straddles the first hour boundary
    let spanning = chunk(
        1,
        3_590_000,
        3_610_000,
        &[(METRIC_NAME, "m"), ("job", "a")],
    );
    f.store.put("u1", &[spanning.clone()]).await.unwrap();

    // one entry per bucket per non-name label
    assert_eq!(f.index.row_count(TABLE), 2);

    let by_name = f
        .store
        .get("u1", 0, 2 * HOUR_MS, &[eq(METRIC_NAME, "m")])
        .await
        .unwrap();
    assert_eq!(ids(&by_name), vec![spanning.id.as_str()]);

    let by_matcher = f
        .store
        .get("u1", 0, 2 * HOUR_MS, &[eq(METRIC_NAME, "m"), eq("job", "a")])
        .await
        .unwrap();
    assert_eq!(ids(&by_matcher), vec![spanning.id.as_str()]);
}

#[tokio::test]
async fn metric_name_scan_dedups_multi_label_chunks() {
    let f = fixture().await;
    let multi = chunk(
        1,
        0,
        10,
        &[(METRIC_NAME, "m"), ("a", "1"), ("b", "2"), ("c", "3")],
    );
    f.store.put("u1", &[multi.clone()]).await.unwrap();
    assert_eq!(f.index.row_count(TABLE), 3);

    let found = f.store.get("u1", 0, 20, &[eq(METRIC_NAME, "m")]).await.unwrap();
    assert_eq!(found.len(), 1);
}

#[tokio::test]
async fn batches_never_exceed_the_cap() {
    let f = fixture().await;
    // 7 chunks x 4 labels = 28 entries -> batches of 25 and 3
    let chunks: Vec<Chunk> = (0..7)
        .map(|i| {
            chunk(
                i,
                0,
                10,
                &[
                    (METRIC_NAME, "m"),
                    ("a", "1"),
                    ("b", "2"),
                    ("c", "3"),
                    ("d", "4"),
                ],
            )
        })
        .collect();
    f.store.put("u1", &chunks).await.unwrap();

    let sizes = f.index.batch_sizes();
    assert_eq!(sizes, vec![25, 3]);
    assert_eq!(f.index.row_count(TABLE), 28);
}

#[tokio::test(start_paused = true)]
async fn throttled_batch_writes_retry_with_backoff() {
    let f = fixture().await;
    f.index.inject_failure(IndexError::Throttled);
    f.index.inject_failure(IndexError::Throttled);
    f.index.inject_failure(IndexError::Throttled);

    let start = Instant::now();
    f.store
        .put("u1", &[chunk(1, 1, 10, &[(METRIC_NAME, "m"), ("job", "a")])])
        .await
        .unwrap();
    // 100ms + 200ms + 400ms of backoff before the write lands
    assert_eq!(start.elapsed(), Duration::from_millis(700));

    let found = f.store.get("u1", 0, 20, &[eq(METRIC_NAME, "m")]).await.unwrap();
    assert_eq!(found.len(), 1);
}

#[tokio::test]
async fn non_throttling_index_errors_surface() {
    let f = fixture().await;
    f.index.inject_failure(IndexError::Remote {
        operation: "BatchWriteItem",
        code: "ValidationException".to_string(),
        message: "bad".to_string(),
    });

    let err = f
        .store
        .put("u1", &[chunk(1, 1, 10, &[(METRIC_NAME, "m"), ("job", "a")])])
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Index(IndexError::Remote { .. })));
}

#[tokio::test]
async fn time_filter_drops_non_overlapping_chunks() {
    let f = fixture().await;
    let chunks = [
        chunk(1, 0, 5, &[(METRIC_NAME, "m"), ("job", "a")]),
        chunk(2, 10, 20, &[(METRIC_NAME, "m"), ("job", "a")]),
    ];
    f.store.put("u1", &chunks).await.unwrap();

    let none = f.store.get("u1", 6, 9, &[eq(METRIC_NAME, "m")]).await.unwrap();
    assert!(none.is_empty());

    let both = f.store.get("u1", 5, 10, &[eq(METRIC_NAME, "m")]).await.unwrap();
    assert_eq!(both.len(), 2);
}

#[tokio::test]
async fn reads_are_deterministic() {
    let f = fixture().await;
    let chunks: Vec<Chunk> = (0..6)
        .map(|i| chunk(i, 0, 10, &[(METRIC_NAME, "m"), ("job", "a")]))
        .collect();
    f.store.put("u1", &chunks).await.unwrap();

    let first = f.store.get("u1", 0, 20, &[eq(METRIC_NAME, "m")]).await.unwrap();
    let second = f.store.get("u1", 0, 20, &[eq(METRIC_NAME, "m")]).await.unwrap();
    assert_eq!(first, second);

    let sorted: Vec<&str> = {
        let mut v = ids(&first);
        v.sort();
        v
    };
    assert_eq!(ids(&first), sorted);
}

#[tokio::test]
async fn planner_consumes_every_page() {
    // page size 2 forces the cursor through three pages
    let f = fixture_with(
        MemoryIndexClient::with_page_size(2),
        None,
        StoreOptions::default(),
    )
    .await;
    let chunks: Vec<Chunk> = (0..5)
        .map(|i| chunk(i, 0, 10, &[(METRIC_NAME, "m"), ("job", "a")]))
        .collect();
    f.store.put("u1", &chunks).await.unwrap();

    let found = f
        .store
        .get("u1", 0, 20, &[eq(METRIC_NAME, "m"), eq("job", "a")])
        .await
        .unwrap();
    assert_eq!(found.len(), 5);
}

#[tokio::test]
async fn bad_queries_fail_fast() {
    let f = fixture().await;

    let err = f.store.get("u1", 0, 20, &[eq("job", "a")]).await.unwrap_err();
    assert!(matches!(err, Error::MissingMetricNameMatcher));

    let err = f
        .store
        .get("u1", 0, 20, &[re(METRIC_NAME, "m.*")])
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NonEqualityMetricNameMatcher));
}

#[tokio::test]
async fn chunks_without_a_metric_name_are_rejected() {
    let f = fixture().await;
    let nameless = chunk(1, 0, 10, &[("job", "a")]);
    let err = f.store.put("u1", &[nameless]).await.unwrap_err();
    assert!(matches!(err, Error::MissingMetricName));
    // nothing was indexed
    assert_eq!(f.index.row_count(TABLE), 0);
}

#[tokio::test]
async fn cache_serves_bodies_when_the_blob_store_loses_them() {
    let f = fixture_with(
        MemoryIndexClient::new(),
        Some(ChunkCache::new(1 << 20)),
        StoreOptions::default(),
    )
    .await;
    let written = chunk(1, 1, 10, &[(METRIC_NAME, "m"), ("job", "a")]);
    f.store.put("u1", &[written.clone()]).await.unwrap();

    // drop the authoritative body; the warm cache still has it
    f.blob.delete(&Path::from("u1/1:1:10")).await.unwrap();

    let found = f.store.get("u1", 0, 20, &[eq(METRIC_NAME, "m")]).await.unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].data, written.data);
}

#[tokio::test]
async fn cache_misses_fall_through_and_warm_the_cache() {
    let index = MemoryIndexClient::new();
    let blob = Arc::new(InMemory::new());

    // writer has no cache; reader has an empty one
    let writer = ChunkStore::with_clients(
        Arc::new(index.clone()),
        Arc::clone(&blob) as Arc<dyn ObjectStore>,
        None,
        TABLE,
        StoreOptions::default(),
    );
    writer.create_tables().await.unwrap();
    let written = chunk(1, 1, 10, &[(METRIC_NAME, "m"), ("job", "a")]);
    writer.put("u1", &[written.clone()]).await.unwrap();

    let reader = ChunkStore::with_clients(
        Arc::new(index.clone()),
        Arc::clone(&blob) as Arc<dyn ObjectStore>,
        Some(ChunkCache::new(1 << 20)),
        TABLE,
        StoreOptions::default(),
    );
    let first = reader.get("u1", 0, 20, &[eq(METRIC_NAME, "m")]).await.unwrap();
    assert_eq!(first.len(), 1);

    // second read survives losing the blob: the miss warmed the cache
    blob.delete(&Path::from("u1/1:1:10")).await.unwrap();
    let second = reader.get("u1", 0, 20, &[eq(METRIC_NAME, "m")]).await.unwrap();
    assert_eq!(second, first);
}

#[tokio::test]
async fn missing_bodies_fail_the_read_without_a_cache() {
    let f = fixture().await;
    let written = chunk(1, 1, 10, &[(METRIC_NAME, "m"), ("job", "a")]);
    f.store.put("u1", &[written]).await.unwrap();
    f.blob.delete(&Path::from("u1/1:1:10")).await.unwrap();

    let err = f.store.get("u1", 0, 20, &[eq(METRIC_NAME, "m")]).await.unwrap_err();
    assert!(matches!(err, Error::Blob(_)));
}

#[tokio::test]
async fn inline_metadata_round_trips_through_the_index() {
    let f = fixture_with(
        MemoryIndexClient::new(),
        None,
        StoreOptions {
            inline_metadata: true,
            ..Default::default()
        },
    )
    .await;
    let written = chunk(1, 1, 10, &[(METRIC_NAME, "m"), ("job", "a")]);
    f.store.put("u1", &[written.clone()]).await.unwrap();

    let found = f.store.get("u1", 0, 20, &[eq(METRIC_NAME, "m")]).await.unwrap();
    assert_eq!(found.len(), 1);
    assert!(found[0].metadata_in_index);
    assert_eq!(found[0].metric, written.metric);
    assert_eq!(found[0].data, written.data);
}

#[tokio::test]
async fn plain_entries_do_not_claim_inline_metadata() {
    let f = fixture().await;
    f.store
        .put("u1", &[chunk(1, 1, 10, &[(METRIC_NAME, "m"), ("job", "a")])])
        .await
        .unwrap();
    let found = f.store.get("u1", 0, 20, &[eq(METRIC_NAME, "m")]).await.unwrap();
    assert!(!found[0].metadata_in_index);
}

#[tokio::test(start_paused = true)]
async fn concurrent_page_queries_stay_under_the_worker_cap() {
    let f = fixture_with(
        MemoryIndexClient::with_latency(100, Duration::from_millis(10)),
        None,
        StoreOptions::default(),
    )
    .await;
    f.store
        .put(
            "u1",
            &[chunk(1, 0, 100 * HOUR_MS, &[(METRIC_NAME, "m"), ("job", "a")])],
        )
        .await
        .unwrap();

    // one sub-query per bucket, two orders of magnitude more than workers
    let found = f
        .store
        .get("u1", 0, 100 * HOUR_MS, &[eq(METRIC_NAME, "m"), eq("job", "a")])
        .await
        .unwrap();
    assert_eq!(found.len(), 1);
    assert!(f.index.max_in_flight() <= chunkhouse_store::NUM_INDEX_WORKERS);
}

#[tokio::test]
async fn stop_drains_and_rejects_further_work() {
    let f = fixture().await;
    f.store
        .put("u1", &[chunk(1, 1, 10, &[(METRIC_NAME, "m"), ("job", "a")])])
        .await
        .unwrap();

    f.store.stop().await;
    f.store.stop().await; // idempotent

    let err = f
        .store
        .put("u1", &[chunk(2, 1, 10, &[(METRIC_NAME, "m"), ("job", "a")])])
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Stopped));

    let err = f.store.get("u1", 0, 20, &[eq(METRIC_NAME, "m")]).await.unwrap_err();
    assert!(matches!(err, Error::Stopped));
}
