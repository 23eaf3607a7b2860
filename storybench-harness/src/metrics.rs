use storybench_common::{RunMetrics, TurnRecord};

/// Aggregate a run's turn records.
///
/// The first `warmup_turns` records and every record whose window is not
/// valid are left out of the averages and percentiles, but all records are
/// kept in `per_turn_metrics`.
pub fn summarize(records: Vec<TurnRecord>, warmup_turns: usize) -> RunMetrics {
    let measured: Vec<&TurnRecord> = records
        .iter()
        .skip(warmup_turns)
        .filter(|r| r.metrics.window.is_valid())
        .collect();
    let invalid_turns = records.iter().filter(|r| !r.metrics.window.is_valid()).count();

    let ttft: Vec<f64> = measured.iter().map(|r| r.metrics.ttft).collect();
    let tpot: Vec<f64> = measured.iter().map(|r| r.metrics.tpot).collect();

    RunMetrics {
        avg_ttft: mean(&ttft),
        avg_tpot: mean(&tpot),
        ttft_p50: percentile(&ttft, 0.50),
        ttft_p99: percentile(&ttft, 0.99),
        tpot_p50: percentile(&tpot, 0.50),
        tpot_p99: percentile(&tpot, 0.99),
        measured_turns: measured.len(),
        invalid_turns,
        per_turn_metrics: records,
    }
}

/// Returns 0 for an empty slice.
pub fn mean(data: &[f64]) -> f64 {
    if data.is_empty() {
        return 0.0;
    }
    data.iter().sum::<f64>() / data.len() as f64
}

/// Sort `data` ascending and return the element at index `floor(p * n)`.
/// Returns 0 for an empty slice.
pub fn percentile(data: &[f64], p: f64) -> f64 {
    if data.is_empty() {
        return 0.0;
    }
    let mut sorted = data.to_vec();
    sorted.sort_unstable_by(f64::total_cmp);
    let idx = (p * sorted.len() as f64).floor() as usize;
    sorted[idx.min(sorted.len() - 1)]
}
