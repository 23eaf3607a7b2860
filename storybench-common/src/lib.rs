use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

pub mod api;
pub mod delta;
pub mod exposition;
pub mod record;
pub mod snapshot;

pub use delta::{percentile, Bucket, MetricsDelta, WindowStatus};
pub use exposition::{ExpositionError, Sample};
pub use record::{ExperimentParams, RequestMetrics, RunMetrics, RunResults, TurnRecord};
pub use snapshot::MetricsSnapshot;

/// The three latency histograms a snapshot tracks bucket series for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistogramKind {
    Ttft,
    Tpot,
    Decode,
}

impl fmt::Display for HistogramKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HistogramKind::Ttft => "ttft",
            HistogramKind::Tpot => "tpot",
            HistogramKind::Decode => "decode",
        };
        f.write_str(name)
    }
}

/// Error types for measurement and inference operations
#[derive(Debug, Error, Clone, PartialEq, Serialize, Deserialize)]
pub enum BenchError {
    /// Scrape failed: network error, timeout, non-2xx status or an unparseable body.
    #[error("Metrics unavailable: {0}")]
    MetricsUnavailable(String),

    /// The server changed its histogram layout between two scrapes.
    #[error("Bucket boundaries differ for {histogram} histogram: later {later:?}, earlier {earlier:?}")]
    BucketBoundaryMismatch {
        histogram: HistogramKind,
        later: Vec<f64>,
        earlier: Vec<f64>,
    },

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("HTTP {0}: {1}")]
    HttpError(u16, String),

    #[error("Invalid completion response: {0}")]
    InvalidResponse(String),

    #[error("Server not ready: {0}")]
    ServerNotReady(String),
}

impl From<ExpositionError> for BenchError {
    fn from(e: ExpositionError) -> Self {
        BenchError::MetricsUnavailable(e.to_string())
    }
}

/// Result type for measurement operations
pub type Result<T> = std::result::Result<T, BenchError>;

/// Telemetry family names the snapshot extractor reads.
///
/// Histogram entries name the family (no `_sum`/`_bucket` suffix). The request
/// counter is read from `<request_success>_total`, falling back to
/// `<e2e_latency>_count` when the counter is absent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricNames {
    pub ttft: String,
    pub tpot: String,
    pub decode: String,
    pub prefill: String,
    pub request_success: String,
    pub e2e_latency: String,
}

impl Default for MetricNames {
    /// Family names exported by vLLM's OpenAI-compatible server.
    fn default() -> Self {
        Self {
            ttft: "vllm:time_to_first_token_seconds".to_string(),
            tpot: "vllm:request_time_per_output_token_seconds".to_string(),
            decode: "vllm:request_decode_time_seconds".to_string(),
            prefill: "vllm:request_prefill_time_seconds".to_string(),
            request_success: "vllm:request_success".to_string(),
            e2e_latency: "vllm:e2e_request_latency_seconds".to_string(),
        }
    }
}

impl MetricNames {
    pub fn histogram(&self, kind: HistogramKind) -> &str {
        match kind {
            HistogramKind::Ttft => &self.ttft,
            HistogramKind::Tpot => &self.tpot,
            HistogramKind::Decode => &self.decode,
        }
    }
}

/// JSON error envelope returned by OpenAI-compatible servers
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub message: String,
}
