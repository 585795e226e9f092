//! In-memory index client.
//!
//! A faithful stand-in for the wide-column KV, used by tests: rows live
//! in a `BTreeMap` keyed `(hash, range)` so range scans come out in the
//! same order the real store returns them, queries paginate at a
//! configurable page size, and failures can be injected to exercise the
//! dispatcher's backoff path.
//!
//! Test hooks beyond the [`IndexClient`] contract:
//!
//! - [`MemoryIndexClient::inject_failure`] queues errors returned by
//!   subsequent sends, one each;
//! - [`MemoryIndexClient::batch_sizes`] records the size of every
//!   observed batch write;
//! - [`MemoryIndexClient::max_in_flight`] reports the high-water mark of
//!   concurrently executing sends (give the client some latency so
//!   overlap is observable).

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;

use crate::error::{IndexError, Result};
use crate::types::{IndexEntry, IndexRow, ProvisionedCapacity, QueryInput, MAX_BATCH_SIZE};
use crate::{IndexClient, IndexRequest, QueryPages};

const DEFAULT_PAGE_SIZE: usize = 100;

type Table = BTreeMap<(String, Bytes), Option<Bytes>>;

#[derive(Clone)]
pub struct MemoryIndexClient {
    inner: Arc<Inner>,
}

struct Inner {
    tables: Mutex<HashMap<String, Table>>,
    failures: Mutex<VecDeque<IndexError>>,
    batch_sizes: Mutex<Vec<usize>>,
    page_size: usize,
    latency: Duration,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl Default for MemoryIndexClient {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryIndexClient {
    pub fn new() -> Self {
        Self::with_page_size(DEFAULT_PAGE_SIZE)
    }

    pub fn with_page_size(page_size: usize) -> Self {
        Self::with_latency(page_size, Duration::ZERO)
    }

    /// A client whose every send takes `latency`, making concurrent
    /// operations overlap observably.
    pub fn with_latency(page_size: usize, latency: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                tables: Mutex::new(HashMap::new()),
                failures: Mutex::new(VecDeque::new()),
                batch_sizes: Mutex::new(Vec::new()),
                page_size,
                latency,
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
            }),
        }
    }

    /// Queue an error; each subsequent send (query page or batch write)
    /// pops and returns one until the queue is empty.
    pub fn inject_failure(&self, error: IndexError) {
        self.inner.failures.lock().push_back(error);
    }

    /// Sizes of every batch write observed, in order.
    pub fn batch_sizes(&self) -> Vec<usize> {
        self.inner.batch_sizes.lock().clone()
    }

    /// High-water mark of concurrently executing sends.
    pub fn max_in_flight(&self) -> usize {
        self.inner.max_in_flight.load(Ordering::SeqCst)
    }

    /// Number of rows stored in `table`.
    pub fn row_count(&self, table: &str) -> usize {
        self.inner
            .tables
            .lock()
            .get(table)
            .map(|t| t.len())
            .unwrap_or(0)
    }

    /// Distinct hash keys present in `table`, sorted.
    pub fn hash_keys(&self, table: &str) -> Vec<String> {
        let tables = self.inner.tables.lock();
        let mut keys: Vec<String> = tables
            .get(table)
            .map(|t| t.keys().map(|(hash, _)| hash.clone()).collect())
            .unwrap_or_default();
        keys.sort();
        keys.dedup();
        keys
    }
}

impl Inner {
    /// Failure injection and in-flight accounting shared by every send.
    async fn begin(&self) -> Result<()> {
        if let Some(error) = self.failures.lock().pop_front() {
            return Err(error);
        }
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        Ok(())
    }

    fn finish(&self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl IndexClient for MemoryIndexClient {
    async fn list_tables(&self) -> Result<Vec<String>> {
        let mut names: Vec<String> = self.inner.tables.lock().keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    async fn create_table(&self, name: &str, _capacity: ProvisionedCapacity) -> Result<()> {
        let mut tables = self.inner.tables.lock();
        if tables.contains_key(name) {
            return Err(IndexError::Remote {
                operation: "CreateTable",
                code: "ResourceInUseException".to_string(),
                message: format!("table already exists: {name}"),
            });
        }
        tables.insert(name.to_string(), Table::new());
        Ok(())
    }

    fn batch_put(&self, table: &str, entries: Vec<IndexEntry>) -> Box<dyn IndexRequest> {
        Box::new(MemoryBatchPut {
            inner: Arc::clone(&self.inner),
            table: table.to_string(),
            entries,
        })
    }

    fn query(&self, input: QueryInput) -> Box<dyn QueryPages> {
        Box::new(MemoryQueryPages {
            inner: Arc::clone(&self.inner),
            input,
            start_after: None,
            page: Vec::new(),
            more_pages: false,
        })
    }
}

struct MemoryBatchPut {
    inner: Arc<Inner>,
    table: String,
    entries: Vec<IndexEntry>,
}

impl MemoryBatchPut {
    fn apply(&self) -> Result<()> {
        self.inner.batch_sizes.lock().push(self.entries.len());
        if self.entries.len() > MAX_BATCH_SIZE {
            return Err(IndexError::InvalidRequest(format!(
                "batch of {} exceeds the {MAX_BATCH_SIZE} item limit",
                self.entries.len()
            )));
        }
        let mut tables = self.inner.tables.lock();
        let table = tables
            .get_mut(&self.table)
            .ok_or_else(|| IndexError::TableNotFound(self.table.clone()))?;
        for entry in &self.entries {
            table.insert(
                (entry.hash_key.clone(), entry.range_key.clone()),
                entry.metadata.clone(),
            );
        }
        Ok(())
    }
}

#[async_trait]
impl IndexRequest for MemoryBatchPut {
    fn operation_name(&self) -> &'static str {
        "BatchWriteItem"
    }

    async fn send(&mut self) -> Result<()> {
        self.inner.begin().await?;
        let result = self.apply();
        self.inner.finish();
        result
    }
}

struct MemoryQueryPages {
    inner: Arc<Inner>,
    input: QueryInput,
    /// Exclusive lower bound: the last range key of the previous page.
    start_after: Option<Bytes>,
    page: Vec<IndexRow>,
    more_pages: bool,
}

impl MemoryQueryPages {
    fn fetch_page(&mut self) -> Result<()> {
        let tables = self.inner.tables.lock();
        let table = tables
            .get(&self.input.table)
            .ok_or_else(|| IndexError::TableNotFound(self.input.table.clone()))?;

        let mut rows = Vec::new();
        let mut more = false;
        for ((hash, range_key), metadata) in table.iter() {
            if hash != &self.input.hash_key {
                continue;
            }
            if let Some(bounds) = &self.input.range {
                if range_key < &bounds.low || range_key > &bounds.high {
                    continue;
                }
            }
            if let Some(start) = &self.start_after {
                if range_key <= start {
                    continue;
                }
            }
            if rows.len() == self.inner.page_size {
                more = true;
                break;
            }
            rows.push(IndexRow {
                range_key: range_key.clone(),
                metadata: metadata.clone(),
            });
        }

        self.page = rows;
        self.more_pages = more;
        Ok(())
    }
}

#[async_trait]
impl IndexRequest for MemoryQueryPages {
    fn operation_name(&self) -> &'static str {
        "Query"
    }

    async fn send(&mut self) -> Result<()> {
        self.inner.begin().await?;
        let result = self.fetch_page();
        self.inner.finish();
        result
    }
}

impl QueryPages for MemoryQueryPages {
    fn page(&self) -> &[IndexRow] {
        &self.page
    }

    fn has_next_page(&self) -> bool {
        self.more_pages
    }

    fn advance(&mut self) -> bool {
        if !self.more_pages {
            return false;
        }
        self.start_after = self.page.last().map(|row| row.range_key.clone());
        self.page.clear();
        self.more_pages = false;
        true
    }
}
