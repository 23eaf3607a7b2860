use std::future::Future;
use std::time::Duration;
use storybench_common::{MetricsDelta, MetricsSnapshot, RequestMetrics, Result};

use crate::metrics::MetricsClient;

/// Pause between a response arriving and the second scrape.
///
/// The server exports telemetry asynchronously, so a scrape taken the instant
/// a response returns may not include it yet. The pause narrows that race but
/// cannot close it; a too-short value shows up as `no_activity` windows and
/// any value adds noise to wall-clock figures around the request.
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_millis(100);

/// A request's output together with the telemetry window that brackets it.
#[derive(Debug, Clone)]
pub struct Measurement<T> {
    pub output: T,
    pub before: MetricsSnapshot,
    pub after: MetricsSnapshot,
    pub delta: MetricsDelta,
}

impl<T> Measurement<T> {
    pub fn metrics(&self) -> RequestMetrics {
        RequestMetrics::from_delta(&self.delta)
    }
}

/// Scrape, run `request`, wait `grace`, scrape again and reconcile the pair.
///
/// Scrape failures, boundary mismatches and request errors all propagate; the
/// caller decides whether the run survives them.
pub async fn measure<T, F, Fut>(metrics: &MetricsClient, grace: Duration, request: F) -> Result<Measurement<T>>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let before = metrics.snapshot().await?;
    let output = request().await?;
    if !grace.is_zero() {
        tokio::time::sleep(grace).await;
    }
    let after = metrics.snapshot().await?;
    let delta = after.delta(&before)?;

    Ok(Measurement { output, before, after, delta })
}
