//! Snapshot extractor: one scrape of the telemetry endpoint per call.

use std::time::{Duration, Instant};
use storybench_common::{BenchError, MetricNames, MetricsSnapshot, Result};
use tracing::debug;

use crate::server_root;

pub const DEFAULT_SCRAPE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct MetricsClientConfig {
    /// Full URL of the exposition endpoint.
    pub url: String,
    pub timeout: Duration,
    pub names: MetricNames,
}

impl MetricsClientConfig {
    pub fn new(url: &str) -> Self {
        Self {
            url: url.to_string(),
            timeout: DEFAULT_SCRAPE_TIMEOUT,
            names: MetricNames::default(),
        }
    }

    /// Telemetry endpoint of the server behind an inference base URL.
    pub fn for_server(base_url: &str) -> Self {
        Self::new(&metrics_url_for(base_url))
    }
}

/// `http://h:8000/v1` → `http://h:8000/metrics`.
pub fn metrics_url_for(base_url: &str) -> String {
    format!("{}/metrics", server_root(base_url))
}

pub struct MetricsClient {
    pub config: MetricsClientConfig,
    http_client: reqwest::Client,
}

impl MetricsClient {
    pub fn new(config: MetricsClientConfig) -> Self {
        Self {
            config,
            http_client: reqwest::Client::new(),
        }
    }

    /// Raw exposition body. Any transport failure, timeout or non-2xx status
    /// is reported as [`BenchError::MetricsUnavailable`]; there is no retry.
    pub async fn fetch(&self) -> Result<String> {
        let url = &self.config.url;
        let response = self
            .http_client
            .get(url)
            .timeout(self.config.timeout)
            .send()
            .await
            .map_err(|e| BenchError::MetricsUnavailable(format!("{url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(BenchError::MetricsUnavailable(format!("{url} returned status {status}")));
        }

        response
            .text()
            .await
            .map_err(|e| BenchError::MetricsUnavailable(format!("{url}: failed to read body: {e}")))
    }

    pub async fn snapshot(&self) -> Result<MetricsSnapshot> {
        let started = Instant::now();
        let body = self.fetch().await?;
        let snapshot = MetricsSnapshot::from_exposition(&body, &self.config.names)?;
        debug!(
            url = %self.config.url,
            elapsed_ms = started.elapsed().as_secs_f64() * 1000.0,
            request_count = snapshot.request_count,
            "scraped telemetry"
        );
        Ok(snapshot)
    }
}
