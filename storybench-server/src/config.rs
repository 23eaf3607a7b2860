use std::time::Duration;

/// Maximum time to wait when acquiring the telemetry lock.
pub const LOCK_TIMEOUT: Duration = Duration::from_secs(1);

// Histogram boundaries in seconds, matching the layout vLLM exports.

pub const TTFT_BUCKETS: &[f64] = &[
    0.001, 0.005, 0.01, 0.02, 0.04, 0.06, 0.08, 0.1, 0.25, 0.5, 0.75, 1.0, 2.5, 5.0, 7.5, 10.0,
];

pub const TPOT_BUCKETS: &[f64] = &[
    0.01, 0.025, 0.05, 0.075, 0.1, 0.15, 0.2, 0.3, 0.4, 0.5, 0.75, 1.0, 2.5,
];

pub const REQUEST_LATENCY_BUCKETS: &[f64] = &[
    0.3, 0.5, 0.8, 1.0, 1.5, 2.0, 2.5, 5.0, 10.0, 15.0, 20.0, 30.0, 40.0, 50.0, 60.0,
];

/// Finish reasons exported on the success counter, present from startup.
pub const FINISH_REASONS: &[&str] = &["stop", "length", "abort"];
