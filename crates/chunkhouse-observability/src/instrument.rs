//! Request timing helper.

use std::future::Future;
use std::time::Instant;

use prometheus::HistogramVec;

/// Run a remote request future, recording its wall-clock duration into
/// `histogram` labelled with the operation name and an HTTP-style status
/// code (`200` on success, `500` on failure).
pub async fn time_request<T, E, F>(
    operation: &str,
    histogram: &HistogramVec,
    request: F,
) -> Result<T, E>
where
    F: Future<Output = Result<T, E>>,
{
    let start = Instant::now();
    let result = request.await;
    let status_code = if result.is_ok() { "200" } else { "500" };
    histogram
        .with_label_values(&[operation, status_code])
        .observe(start.elapsed().as_secs_f64());
    result
}
