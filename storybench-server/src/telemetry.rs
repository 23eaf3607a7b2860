//! Latency telemetry kept in a `prometheus` registry and served in the text
//! exposition format.

use prometheus::{Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder};
use storybench_common::MetricNames;

use crate::config::{FINISH_REASONS, REQUEST_LATENCY_BUCKETS, TPOT_BUCKETS, TTFT_BUCKETS};

/// Per-request latencies in seconds, as the server would observe them.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RequestTimings {
    pub ttft: f64,
    pub prefill: f64,
    pub decode: f64,
    /// Mean inter-token time over the decode phase.
    pub tpot: f64,
    pub e2e: f64,
}

/// Every family the `/metrics` endpoint exports, labelled by `model_name`.
#[derive(Clone)]
pub struct Telemetry {
    pub model: String,
    registry: Registry,
    success: IntCounterVec,
    ttft: HistogramVec,
    tpot: HistogramVec,
    decode: HistogramVec,
    prefill: HistogramVec,
    e2e: HistogramVec,
}

fn histogram(registry: &Registry, name: &str, help: &str, buckets: &[f64]) -> prometheus::Result<HistogramVec> {
    let vec = HistogramVec::new(HistogramOpts::new(name, help).buckets(buckets.to_vec()), &["model_name"])?;
    registry.register(Box::new(vec.clone()))?;
    Ok(vec)
}

impl Telemetry {
    /// Register all families under the names in `names`. Fails only when a
    /// name is not a valid metric name.
    pub fn new(model: impl Into<String>, names: &MetricNames) -> prometheus::Result<Self> {
        let registry = Registry::new();
        let success = IntCounterVec::new(
            Opts::new(
                format!("{}_total", names.request_success),
                "Count of successfully processed requests.",
            ),
            &["finished_reason", "model_name"],
        )?;
        registry.register(Box::new(success.clone()))?;

        let telemetry = Self {
            model: model.into(),
            ttft: histogram(&registry, &names.ttft, "Histogram of time to first token in seconds.", TTFT_BUCKETS)?,
            tpot: histogram(&registry, &names.tpot, "Histogram of time per output token in seconds.", TPOT_BUCKETS)?,
            decode: histogram(
                &registry,
                &names.decode,
                "Histogram of time spent in DECODE phase for request.",
                REQUEST_LATENCY_BUCKETS,
            )?,
            prefill: histogram(
                &registry,
                &names.prefill,
                "Histogram of time spent in PREFILL phase for request.",
                REQUEST_LATENCY_BUCKETS,
            )?,
            e2e: histogram(
                &registry,
                &names.e2e_latency,
                "Histogram of end to end request latency in seconds.",
                REQUEST_LATENCY_BUCKETS,
            )?,
            success,
            registry,
        };
        telemetry.initialize_series();
        Ok(telemetry)
    }

    /// Create every series at zero so families are exported before the first request.
    fn initialize_series(&self) {
        let model = self.model.as_str();
        for &reason in FINISH_REASONS {
            self.success.with_label_values(&[reason, model]);
        }
        for vec in self.histograms() {
            vec.with_label_values(&[model]);
        }
    }

    fn histograms(&self) -> [&HistogramVec; 5] {
        [&self.ttft, &self.tpot, &self.decode, &self.prefill, &self.e2e]
    }

    /// Record one finished request.
    pub fn record(&self, timings: &RequestTimings, finished_reason: &str) {
        let model = [self.model.as_str()];
        self.success.with_label_values(&[finished_reason, model[0]]).inc();
        self.ttft.with_label_values(&model).observe(timings.ttft);
        self.tpot.with_label_values(&model).observe(timings.tpot);
        self.decode.with_label_values(&model).observe(timings.decode);
        self.prefill.with_label_values(&model).observe(timings.prefill);
        self.e2e.with_label_values(&model).observe(timings.e2e);
    }

    /// Completed requests across the exported finish reasons.
    pub fn requests(&self) -> u64 {
        FINISH_REASONS
            .iter()
            .map(|&reason| self.success.with_label_values(&[reason, self.model.as_str()]).get())
            .sum()
    }

    /// Observations recorded in the time-to-first-token histogram.
    pub fn ttft_count(&self) -> u64 {
        self.ttft.with_label_values(&[self.model.as_str()]).get_sample_count()
    }

    /// Drop all counters back to zero, as a process restart would.
    pub fn reset(&self) {
        self.success.reset();
        for vec in self.histograms() {
            vec.reset();
        }
        self.initialize_series();
    }

    /// Encode the registry in the text exposition format.
    pub fn render(&self) -> prometheus::Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}
