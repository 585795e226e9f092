use lazy_static::lazy_static;
use prometheus::{
    exponential_buckets, CounterVec, Histogram, HistogramOpts, HistogramVec, IntCounter,
    IntCounterVec, Opts, Registry,
};
use std::sync::Once;

static INIT: Once = Once::new();

lazy_static! {
    /// Global Prometheus metrics registry
    pub static ref REGISTRY: Registry = Registry::new();

    // ============================================================================
    // Index Store Metrics
    // ============================================================================

    /// Index store request latency.
    ///
    /// Wide-column KV latency ranges from sub-millisecond to seconds when
    /// throttled, so use 8 buckets from 128µs to multiple seconds.
    pub static ref INDEX_REQUEST_DURATION: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            "chunkhouse_index_request_duration_seconds",
            "Time spent doing index store requests"
        )
        .buckets(exponential_buckets(0.000128, 4.0, 8).expect("valid buckets")),
        &["operation", "status_code"]
    ).expect("metric can be created");

    /// Capacity units consumed by the index store, by operation
    pub static ref INDEX_CONSUMED_CAPACITY: CounterVec = CounterVec::new(
        Opts::new(
            "chunkhouse_index_consumed_capacity_total",
            "Index store capacity units consumed, by operation"
        ),
        &["operation"]
    ).expect("metric can be created");

    /// Index store failures, by remote error code (or "other")
    pub static ref INDEX_FAILURES: IntCounterVec = IntCounterVec::new(
        Opts::new(
            "chunkhouse_index_failures_total",
            "Total index store request failures, by error reason"
        ),
        &["error"]
    ).expect("metric can be created");

    /// Index entries written per chunk
    pub static ref INDEX_ENTRIES_PER_CHUNK: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "chunkhouse_index_entries_per_chunk",
            "Number of index entries written per chunk"
        )
        .buckets(exponential_buckets(1.0, 2.0, 5).expect("valid buckets"))
    ).expect("metric can be created");

    // ============================================================================
    // Blob Store Metrics
    // ============================================================================

    /// Blob store request latency
    pub static ref BLOB_REQUEST_DURATION: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            "chunkhouse_blob_request_duration_seconds",
            "Time spent doing blob store requests"
        )
        .buckets(vec![0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.0]),
        &["operation", "status_code"]
    ).expect("metric can be created");

    // ============================================================================
    // Query Shape Metrics
    // ============================================================================

    /// Chunks loaded per query, after time filtering
    pub static ref QUERY_CHUNKS: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "chunkhouse_query_chunks",
            "Number of chunks loaded per query"
        )
        .buckets(exponential_buckets(1.0, 4.0, 5).expect("valid buckets"))
    ).expect("metric can be created");

    /// Index lookups issued per query
    pub static ref QUERY_INDEX_LOOKUPS: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "chunkhouse_query_index_lookups",
            "Number of index lookups per query"
        )
        .buckets(exponential_buckets(1.0, 4.0, 5).expect("valid buckets"))
    ).expect("metric can be created");

    /// Pages consumed per paged index request
    pub static ref QUERY_PAGES_PER_REQUEST: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "chunkhouse_query_pages_per_request",
            "Number of pages per paged index request"
        )
        .buckets(exponential_buckets(1.0, 2.0, 5).expect("valid buckets"))
    ).expect("metric can be created");

    /// Index rows fetched but dropped for not matching, per request
    pub static ref QUERY_DROPPED_MATCHES: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "chunkhouse_query_dropped_matches",
            "Index rows fetched but dropped for not matching, per request"
        )
        .buckets(exponential_buckets(1.0, 2.0, 5).expect("valid buckets"))
    ).expect("metric can be created");

    // ============================================================================
    // Chunk Cache Metrics
    // ============================================================================

    /// Chunk cache hits
    pub static ref CACHE_HITS_TOTAL: IntCounter = IntCounter::new(
        "chunkhouse_cache_hits_total",
        "Total chunk cache hits"
    ).expect("metric can be created");

    /// Chunk cache misses
    pub static ref CACHE_MISSES_TOTAL: IntCounter = IntCounter::new(
        "chunkhouse_cache_misses_total",
        "Total chunk cache misses"
    ).expect("metric can be created");
}

/// Register every metric with [`struct@REGISTRY`]. Safe to call more than
/// once; registration happens exactly once.
pub fn init() {
    INIT.call_once(|| {
        REGISTRY
            .register(Box::new(INDEX_REQUEST_DURATION.clone()))
            .expect("index_request_duration can be registered");
        REGISTRY
            .register(Box::new(INDEX_CONSUMED_CAPACITY.clone()))
            .expect("index_consumed_capacity can be registered");
        REGISTRY
            .register(Box::new(INDEX_FAILURES.clone()))
            .expect("index_failures can be registered");
        REGISTRY
            .register(Box::new(INDEX_ENTRIES_PER_CHUNK.clone()))
            .expect("index_entries_per_chunk can be registered");
        REGISTRY
            .register(Box::new(BLOB_REQUEST_DURATION.clone()))
            .expect("blob_request_duration can be registered");
        REGISTRY
            .register(Box::new(QUERY_CHUNKS.clone()))
            .expect("query_chunks can be registered");
        REGISTRY
            .register(Box::new(QUERY_INDEX_LOOKUPS.clone()))
            .expect("query_index_lookups can be registered");
        REGISTRY
            .register(Box::new(QUERY_PAGES_PER_REQUEST.clone()))
            .expect("query_pages_per_request can be registered");
        REGISTRY
            .register(Box::new(QUERY_DROPPED_MATCHES.clone()))
            .expect("query_dropped_matches can be registered");
        REGISTRY
            .register(Box::new(CACHE_HITS_TOTAL.clone()))
            .expect("cache_hits can be registered");
        REGISTRY
            .register(Box::new(CACHE_MISSES_TOTAL.clone()))
            .expect("cache_misses can be registered");
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_registration() {
        init();
        init(); // second call is a no-op
    }

    #[test]
    fn test_failure_counter() {
        INDEX_FAILURES.with_label_values(&["TestReason"]).inc();
        assert_eq!(INDEX_FAILURES.with_label_values(&["TestReason"]).get(), 1);
    }

    #[test]
    fn test_consumed_capacity_counter() {
        INDEX_CONSUMED_CAPACITY
            .with_label_values(&["TestOp"])
            .inc_by(2.5);
        assert!((INDEX_CONSUMED_CAPACITY.with_label_values(&["TestOp"]).get() - 2.5).abs() < 1e-9);
    }

    #[test]
    fn test_query_shape_histograms() {
        let before = QUERY_CHUNKS.get_sample_count();
        QUERY_CHUNKS.observe(3.0);
        assert_eq!(QUERY_CHUNKS.get_sample_count(), before + 1);
    }
}
