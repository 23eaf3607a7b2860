use tracing::{debug, warn};

use crate::delta::{self, Bucket};
use crate::exposition::{self, ExpositionError, Sample};
use crate::{HistogramKind, MetricNames};

/// Point-in-time capture of the server's cumulative latency telemetry.
///
/// Every field is cumulative since server start. A family missing from the
/// scrape reads as `0.0` (scalars) or an empty series (histograms).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricsSnapshot {
    /// Completed requests, server-wide.
    pub request_count: f64,
    /// Cumulative seconds.
    pub ttft_sum: f64,
    pub tpot_sum: f64,
    pub decode_sum: f64,
    pub prefill_sum: f64,
    /// Cumulative histograms, ascending by boundary.
    pub ttft_buckets: Vec<Bucket>,
    pub tpot_buckets: Vec<Bucket>,
    pub decode_buckets: Vec<Bucket>,
}

impl MetricsSnapshot {
    /// Parse an exposition body and extract the families named in `names`.
    pub fn from_exposition(text: &str, names: &MetricNames) -> Result<Self, ExpositionError> {
        let samples = exposition::parse(text)?;
        Ok(Self::from_samples(&samples, names))
    }

    pub fn from_samples(samples: &[Sample], names: &MetricNames) -> Self {
        let request_count = match request_count(samples, names) {
            Some(count) => count,
            None => {
                warn!(
                    counter = %names.request_success,
                    fallback = %names.e2e_latency,
                    "request count family missing from telemetry; snapshot will read as no activity"
                );
                0.0
            }
        };

        Self {
            request_count,
            ttft_sum: family_sum(samples, &names.ttft).unwrap_or(0.0),
            tpot_sum: family_sum(samples, &names.tpot).unwrap_or(0.0),
            decode_sum: family_sum(samples, &names.decode).unwrap_or(0.0),
            prefill_sum: family_sum(samples, &names.prefill).unwrap_or(0.0),
            ttft_buckets: histogram_buckets(samples, &names.ttft),
            tpot_buckets: histogram_buckets(samples, &names.tpot),
            decode_buckets: histogram_buckets(samples, &names.decode),
        }
    }

    pub fn buckets(&self, kind: HistogramKind) -> &[Bucket] {
        match kind {
            HistogramKind::Ttft => &self.ttft_buckets,
            HistogramKind::Tpot => &self.tpot_buckets,
            HistogramKind::Decode => &self.decode_buckets,
        }
    }
}

/// Sum every sample named exactly `name` across label sets; `None` if there is none.
pub fn sum_samples(samples: &[Sample], name: &str) -> Option<f64> {
    samples
        .iter()
        .filter(|s| s.name == name)
        .map(|s| s.value)
        .fold(None, |acc, v| Some(acc.unwrap_or(0.0) + v))
}

/// `<family>_sum` across all label sets.
pub fn family_sum(samples: &[Sample], family: &str) -> Option<f64> {
    sum_samples(samples, &format!("{family}_sum"))
}

/// Completed-request count: the success counter across all `finished_reason`
/// values, else the end-to-end latency histogram's `_count`.
pub fn request_count(samples: &[Sample], names: &MetricNames) -> Option<f64> {
    sum_samples(samples, &format!("{}_total", names.request_success))
        .or_else(|| sum_samples(samples, &format!("{}_count", names.e2e_latency)))
}

/// Cumulative `(le, count)` pairs of `<family>_bucket`, ascending by boundary.
///
/// Samples whose `le` label is missing or unparseable are dropped individually.
/// Series that differ only in other labels are merged by summing their counts
/// at each boundary.
pub fn histogram_buckets(samples: &[Sample], family: &str) -> Vec<Bucket> {
    let name = format!("{family}_bucket");
    let buckets: Vec<Bucket> = samples
        .iter()
        .filter(|s| s.name == name)
        .filter_map(|s| {
            let le = s.label("le")?;
            match exposition::parse_value(le) {
                Some(boundary) if !boundary.is_nan() => Some((boundary, s.value)),
                _ => {
                    debug!(family, le, "dropping bucket with malformed boundary");
                    None
                }
            }
        })
        .collect();

    delta::normalize(&buckets)
}
