//! Records written to a run's results file. Plotting scripts consume this
//! format, so field names are part of the external contract.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::delta::{MetricsDelta, WindowStatus};

pub const P50: f64 = 0.5;
pub const P99: f64 = 0.99;

/// Latency figures for one request, derived from its measurement window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RequestMetrics {
    pub ttft: f64,
    pub ttft_p50: f64,
    pub ttft_p99: f64,
    pub tpot: f64,
    pub tpot_p50: f64,
    pub tpot_p99: f64,
    pub decode_time: f64,
    pub prefill_time: f64,
    /// Whether the window isolated the request; invalid windows carry zeros.
    pub window: WindowStatus,
}

impl RequestMetrics {
    /// Derive per-request figures from `delta`.
    ///
    /// A window without activity or with a counter reset yields all zeros and
    /// a warning; its `window` field tells consumers not to trust it.
    pub fn from_delta(delta: &MetricsDelta) -> Self {
        let window = delta.status();
        match window {
            WindowStatus::NoActivity | WindowStatus::CounterReset => {
                warn!(
                    ?window,
                    request_count = delta.request_count,
                    "telemetry did not isolate the request; reporting zeroed metrics"
                );
                Self::zeroed(window)
            }
            WindowStatus::Overlapped => {
                warn!(
                    request_count = delta.request_count,
                    "measurement window spans more than one request; reporting window averages"
                );
                Self::measured(delta, window)
            }
            WindowStatus::Observed => Self::measured(delta, window),
        }
    }

    pub fn zeroed(window: WindowStatus) -> Self {
        Self {
            ttft: 0.0,
            ttft_p50: 0.0,
            ttft_p99: 0.0,
            tpot: 0.0,
            tpot_p50: 0.0,
            tpot_p99: 0.0,
            decode_time: 0.0,
            prefill_time: 0.0,
            window,
        }
    }

    fn measured(delta: &MetricsDelta, window: WindowStatus) -> Self {
        Self {
            ttft: delta.ttft(),
            ttft_p50: delta.ttft_percentile(P50),
            ttft_p99: delta.ttft_percentile(P99),
            tpot: delta.tpot(),
            tpot_p50: delta.tpot_percentile(P50),
            tpot_p99: delta.tpot_percentile(P99),
            decode_time: delta.decode_time(),
            prefill_time: delta.prefill_time(),
            window,
        }
    }
}

/// One agent turn. Created once, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnRecord {
    /// 1-based.
    pub turn: u32,
    pub agent: String,
    /// Characters of story context handed to the agent.
    pub context_size: usize,
    pub tokens_generated: u64,
    #[serde(flatten)]
    pub metrics: RequestMetrics,
}

/// Aggregates over a run plus the full per-turn sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunMetrics {
    pub avg_ttft: f64,
    pub avg_tpot: f64,
    pub ttft_p50: f64,
    pub ttft_p99: f64,
    pub tpot_p50: f64,
    pub tpot_p99: f64,
    /// Turns that entered the aggregates (after warm-up, valid window).
    pub measured_turns: usize,
    /// Turns whose window could not isolate the request.
    pub invalid_turns: usize,
    pub per_turn_metrics: Vec<TurnRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentParams {
    pub k: u32,
    pub c: u32,
    pub turns: u32,
    pub model: String,
    pub warmup_turns: usize,
    pub grace_ms: u64,
    pub timestamp: DateTime<Utc>,
}

/// Top-level document of a results file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunResults {
    /// Turns actually played; fewer than requested when the run aborted.
    pub total_turns: u32,
    /// Wall-clock seconds for the whole game.
    pub total_time: f64,
    pub full_story: String,
    pub final_context_length: usize,
    pub metrics: RunMetrics,
    pub experiment_params: ExperimentParams,
    /// Why the run stopped early, if it did.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
