//! Bounded-concurrency executor for index store requests.
//!
//! The index store meters capacity, so the store must cap how many
//! requests it has in flight and absorb throttling without surfacing it.
//! The dispatcher does both with one mechanism: a fixed pool of worker
//! tasks consuming jobs from a rendezvous-sized channel.
//!
//! ## Contract
//!
//! - [`Dispatcher::submit`] blocks the caller until a worker has driven
//!   the request to a final outcome, then hands the request object back
//!   so paged cursors can be advanced and re-submitted.
//! - Workers time every send into the index latency histogram by
//!   operation name and count failures by error reason.
//! - On a throttling error the worker sleeps and re-sends the same
//!   request: 100 ms initially, doubling per retry, capped at 1 s, never
//!   reset within a request, and with no retry budget. Any other error
//!   is returned immediately.
//! - [`Dispatcher::stop`] closes the channel and waits for every worker
//!   to drain; requests already submitted complete normally. Submitting
//!   after `stop` fails with [`Error::Stopped`].

use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;

use chunkhouse_index::{IndexError, IndexRequest};
use chunkhouse_observability::metrics::{INDEX_FAILURES, INDEX_REQUEST_DURATION};
use chunkhouse_observability::time_request;

use crate::error::{Error, Result};

/// Number of concurrently executing index store requests.
pub const NUM_INDEX_WORKERS: usize = 50;

const MIN_BACKOFF: Duration = Duration::from_millis(100);
const MAX_BACKOFF: Duration = Duration::from_secs(1);

type Job = Box<dyn FnOnce() -> BoxFuture<'static, ()> + Send>;

pub struct Dispatcher {
    jobs: Mutex<Option<mpsc::Sender<Job>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl Dispatcher {
    /// Spawn `workers` worker tasks. Must be called within a tokio
    /// runtime.
    pub fn new(workers: usize) -> Self {
        let (jobs, receiver) = mpsc::channel::<Job>(1);
        let receiver = Arc::new(Mutex::new(receiver));
        let handles = (0..workers)
            .map(|_| {
                let receiver = Arc::clone(&receiver);
                tokio::spawn(async move {
                    loop {
                        let job = { receiver.lock().await.recv().await };
                        match job {
                            Some(job) => job().await,
                            None => return,
                        }
                    }
                })
            })
            .collect();
        Self {
            jobs: Mutex::new(Some(jobs)),
            workers: Mutex::new(handles),
        }
    }

    /// Execute `request` on the worker pool and block until its final
    /// outcome. On success the request is handed back to the caller; on
    /// a non-throttling error it is dropped with the error.
    pub async fn submit<R>(&self, request: R) -> Result<R>
    where
        R: IndexRequest + 'static,
    {
        let sender = match &*self.jobs.lock().await {
            Some(sender) => sender.clone(),
            None => return Err(Error::Stopped),
        };

        let (reply, outcome) = oneshot::channel();
        let job: Job = Box::new(move || -> BoxFuture<'static, ()> {
            Box::pin(run_with_backoff(request, reply))
        });
        if sender.send(job).await.is_err() {
            return Err(Error::Stopped);
        }
        match outcome.await {
            Ok(Ok(request)) => Ok(request),
            Ok(Err(err)) => Err(Error::Index(err)),
            // the worker went away without replying
            Err(_) => Err(Error::Stopped),
        }
    }

    /// Close the submission channel and wait for all workers to exit.
    /// Idempotent; in-flight requests complete before workers stop.
    pub async fn stop(&self) {
        self.jobs.lock().await.take();
        let workers = std::mem::take(&mut *self.workers.lock().await);
        for worker in workers {
            let _ = worker.await;
        }
    }
}

async fn run_with_backoff<R: IndexRequest>(
    mut request: R,
    reply: oneshot::Sender<std::result::Result<R, IndexError>>,
) {
    let mut backoff = MIN_BACKOFF;
    loop {
        let operation = request.operation_name();
        let result = time_request(operation, &INDEX_REQUEST_DURATION, request.send()).await;
        match result {
            Ok(()) => {
                let _ = reply.send(Ok(request));
                return;
            }
            Err(err) => {
                INDEX_FAILURES.with_label_values(&[err.reason()]).inc();
                if !err.is_throttled() {
                    let _ = reply.send(Err(err));
                    return;
                }
                tokio::time::sleep(backoff).await;
                backoff = (backoff * 2).min(MAX_BACKOFF);
            }
        }
    }
}
