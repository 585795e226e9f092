//! Chunkhouse Observability
//!
//! Prometheus metrics for the chunk store: request latency histograms for
//! both remote services, consumed-capacity and failure counters for the
//! index store, and per-query shape histograms (entries per chunk, chunks
//! per query, lookups, pages, dropped matches).
//!
//! Metric exposition is the embedding application's concern; this crate
//! only owns the registry. Call [`init`] once at startup, then hand
//! `REGISTRY.gather()` to whatever exporter the application runs.

pub mod instrument;
pub mod metrics;

pub use instrument::time_request;
pub use metrics::{init, REGISTRY};
