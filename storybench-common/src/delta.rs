use serde::{Deserialize, Serialize};

use crate::snapshot::MetricsSnapshot;
use crate::{BenchError, HistogramKind, Result};

/// `(boundary, count)`: observations at or below `boundary`. In a snapshot the
/// count is cumulative since server start; in a delta it is the increase
/// between two scrapes, which is still cumulative across boundaries.
pub type Bucket = (f64, f64);

/// How trustworthy a measurement window is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowStatus {
    /// Exactly one request completed between the scrapes.
    Observed,
    /// A request count other than one; derived values are window averages.
    Overlapped,
    /// Telemetry did not move. The request finished outside the scrape window.
    NoActivity,
    /// Some counter went backwards, e.g. the server restarted between scrapes.
    CounterReset,
}

impl WindowStatus {
    /// Whether latency figures derived from this window may be reported.
    pub fn is_valid(&self) -> bool {
        matches!(self, WindowStatus::Observed | WindowStatus::Overlapped)
    }
}

/// Difference between two snapshots taken around a single request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricsDelta {
    pub request_count: f64,
    pub ttft_sum: f64,
    pub tpot_sum: f64,
    pub decode_sum: f64,
    pub prefill_sum: f64,
    pub ttft_buckets: Vec<Bucket>,
    pub tpot_buckets: Vec<Bucket>,
    pub decode_buckets: Vec<Bucket>,
}

impl MetricsSnapshot {
    /// Activity between `earlier` and this (later) snapshot.
    ///
    /// Fails with [`BenchError::BucketBoundaryMismatch`] when any histogram's
    /// boundary set differs between the two scrapes.
    pub fn delta(&self, earlier: &MetricsSnapshot) -> Result<MetricsDelta> {
        Ok(MetricsDelta {
            request_count: self.request_count - earlier.request_count,
            ttft_sum: self.ttft_sum - earlier.ttft_sum,
            tpot_sum: self.tpot_sum - earlier.tpot_sum,
            decode_sum: self.decode_sum - earlier.decode_sum,
            prefill_sum: self.prefill_sum - earlier.prefill_sum,
            ttft_buckets: delta_buckets(HistogramKind::Ttft, &self.ttft_buckets, &earlier.ttft_buckets)?,
            tpot_buckets: delta_buckets(HistogramKind::Tpot, &self.tpot_buckets, &earlier.tpot_buckets)?,
            decode_buckets: delta_buckets(
                HistogramKind::Decode,
                &self.decode_buckets,
                &earlier.decode_buckets,
            )?,
        })
    }
}

/// Per-boundary `later - earlier`, ascending by boundary.
pub fn delta_buckets(kind: HistogramKind, later: &[Bucket], earlier: &[Bucket]) -> Result<Vec<Bucket>> {
    let later = normalize(later);
    let earlier = normalize(earlier);

    let later_bounds: Vec<f64> = later.iter().map(|(b, _)| *b).collect();
    let earlier_bounds: Vec<f64> = earlier.iter().map(|(b, _)| *b).collect();
    if later_bounds != earlier_bounds {
        return Err(BenchError::BucketBoundaryMismatch {
            histogram: kind,
            later: later_bounds,
            earlier: earlier_bounds,
        });
    }

    Ok(later
        .iter()
        .zip(&earlier)
        .map(|(&(boundary, now), &(_, before))| (boundary, now - before))
        .collect())
}

/// Sort ascending and fold duplicate boundaries into one entry.
pub(crate) fn normalize(buckets: &[Bucket]) -> Vec<Bucket> {
    let mut sorted = buckets.to_vec();
    sorted.sort_by(|a, b| a.0.total_cmp(&b.0));
    let mut out: Vec<Bucket> = Vec::with_capacity(sorted.len());
    for (boundary, count) in sorted {
        match out.last_mut() {
            Some(last) if last.0 == boundary => last.1 += count,
            _ => out.push((boundary, count)),
        }
    }
    out
}

impl MetricsDelta {
    /// Classify the window. Any negative scalar or bucket delta wins over the
    /// request count, since no figure from a reset window is meaningful.
    pub fn status(&self) -> WindowStatus {
        let scalars = [
            self.request_count,
            self.ttft_sum,
            self.tpot_sum,
            self.decode_sum,
            self.prefill_sum,
        ];
        let negative_bucket = [&self.ttft_buckets, &self.tpot_buckets, &self.decode_buckets]
            .iter()
            .flat_map(|series| series.iter())
            .any(|(_, count)| *count < 0.0);

        if negative_bucket || scalars.iter().any(|v| *v < 0.0) {
            WindowStatus::CounterReset
        } else if self.request_count == 0.0 {
            WindowStatus::NoActivity
        } else if self.request_count != 1.0 {
            WindowStatus::Overlapped
        } else {
            WindowStatus::Observed
        }
    }

    fn per_request(&self, sum: f64) -> f64 {
        if self.request_count > 0.0 {
            sum / self.request_count
        } else {
            0.0
        }
    }

    /// Mean time to first token over the window, in seconds; `0.0` without activity.
    pub fn ttft(&self) -> f64 {
        self.per_request(self.ttft_sum)
    }

    pub fn tpot(&self) -> f64 {
        self.per_request(self.tpot_sum)
    }

    pub fn decode_time(&self) -> f64 {
        self.per_request(self.decode_sum)
    }

    pub fn prefill_time(&self) -> f64 {
        self.per_request(self.prefill_sum)
    }

    pub fn buckets(&self, kind: HistogramKind) -> &[Bucket] {
        match kind {
            HistogramKind::Ttft => &self.ttft_buckets,
            HistogramKind::Tpot => &self.tpot_buckets,
            HistogramKind::Decode => &self.decode_buckets,
        }
    }

    pub fn ttft_percentile(&self, p: f64) -> f64 {
        percentile(&self.ttft_buckets, p)
    }

    pub fn tpot_percentile(&self, p: f64) -> f64 {
        percentile(&self.tpot_buckets, p)
    }

    pub fn decode_time_percentile(&self, p: f64) -> f64 {
        percentile(&self.decode_buckets, p)
    }
}

/// Estimate the `p`-quantile (`0.0..=1.0`) of a cumulative histogram by linear
/// interpolation inside the bucket where the target rank falls.
///
/// Returns `0.0` for an empty series or one with no observations. Callers tell
/// that apart from a real measurement through the window's request count.
/// A rank landing in the `+Inf` bucket resolves to the largest finite boundary.
pub fn percentile(buckets: &[Bucket], p: f64) -> f64 {
    let total = buckets.iter().map(|(_, c)| *c).fold(0.0, f64::max);
    if total <= 0.0 || total.is_nan() {
        return 0.0;
    }
    let p = if p.is_nan() { 0.0 } else { p.clamp(0.0, 1.0) };
    let target = total * p;

    let mut prev: Option<Bucket> = None;
    for &(boundary, cumulative) in buckets {
        if cumulative >= target {
            let Some((prev_boundary, prev_cumulative)) = prev else {
                return if boundary.is_finite() { boundary } else { 0.0 };
            };
            if boundary.is_infinite() {
                return prev_boundary;
            }
            let in_bucket = cumulative - prev_cumulative;
            let ratio = if in_bucket > 0.0 {
                (target - prev_cumulative) / in_bucket
            } else {
                0.0
            };
            return prev_boundary + ratio * (boundary - prev_boundary);
        }
        prev = Some((boundary, cumulative));
    }

    // Unreachable with consistent data: the largest count always meets the target.
    buckets
        .iter()
        .rev()
        .map(|(b, _)| *b)
        .find(|b| b.is_finite())
        .unwrap_or(0.0)
}
