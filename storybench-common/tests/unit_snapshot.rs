use storybench_common::exposition::parse;
use storybench_common::snapshot::{histogram_buckets, request_count};
use storybench_common::{HistogramKind, MetricNames, MetricsSnapshot};

const VLLM_BODY: &str = r#"# HELP vllm:request_success_total Count of successfully processed requests.
# TYPE vllm:request_success_total counter
vllm:request_success_total{finished_reason="stop",model_name="m"} 4.0
vllm:request_success_total{finished_reason="length",model_name="m"} 6.0
vllm:request_success_total{finished_reason="abort",model_name="m"} 0.0
# TYPE vllm:e2e_request_latency_seconds histogram
vllm:e2e_request_latency_seconds_count{model_name="m"} 99.0
# TYPE vllm:time_to_first_token_seconds histogram
vllm:time_to_first_token_seconds_sum{model_name="m"} 4.0
vllm:time_to_first_token_seconds_bucket{le="0.1",model_name="m"} 2.0
vllm:time_to_first_token_seconds_bucket{le="+Inf",model_name="m"} 10.0
vllm:time_to_first_token_seconds_bucket{le="0.5",model_name="m"} 9.0
vllm:time_to_first_token_seconds_count{model_name="m"} 10.0
# TYPE vllm:request_time_per_output_token_seconds histogram
vllm:request_time_per_output_token_seconds_sum{model_name="m"} 0.25
vllm:request_time_per_output_token_seconds_bucket{le="0.01",model_name="m"} 3.0
vllm:request_time_per_output_token_seconds_bucket{le="+Inf",model_name="m"} 10.0
# TYPE vllm:request_decode_time_seconds histogram
vllm:request_decode_time_seconds_sum{model_name="m"} 12.5
vllm:request_decode_time_seconds_bucket{le="1.0",model_name="m"} 5.0
vllm:request_decode_time_seconds_bucket{le="+Inf",model_name="m"} 10.0
# TYPE vllm:request_prefill_time_seconds histogram
vllm:request_prefill_time_seconds_sum{model_name="m"} 3.5
"#;

#[test]
fn test_extracts_vllm_families() {
    let snap = MetricsSnapshot::from_exposition(VLLM_BODY, &MetricNames::default()).unwrap();
    // Success counter wins over the e2e histogram count.
    assert_eq!(snap.request_count, 10.0);
    assert_eq!(snap.ttft_sum, 4.0);
    assert_eq!(snap.tpot_sum, 0.25);
    assert_eq!(snap.decode_sum, 12.5);
    assert_eq!(snap.prefill_sum, 3.5);
    assert_eq!(snap.ttft_buckets, vec![(0.1, 2.0), (0.5, 9.0), (f64::INFINITY, 10.0)]);
    assert_eq!(snap.tpot_buckets, vec![(0.01, 3.0), (f64::INFINITY, 10.0)]);
    assert_eq!(snap.buckets(HistogramKind::Decode), &[(1.0, 5.0), (f64::INFINITY, 10.0)]);
}

#[test]
fn test_bucket_round_trip_sorted_ascending() {
    let samples = parse("foo_bucket{le=\"+Inf\"} 5\nfoo_bucket{le=\"1.0\"} 3\n").unwrap();
    assert_eq!(histogram_buckets(&samples, "foo"), vec![(1.0, 3.0), (f64::INFINITY, 5.0)]);
}

#[test]
fn test_malformed_boundary_dropped_without_losing_siblings() {
    let body = "foo_bucket{le=\"1.0\"} 3\nfoo_bucket{le=\"fast\"} 4\nfoo_bucket{le=\"NaN\"} 4\nfoo_bucket 9\nfoo_bucket{le=\"+Inf\"} 5\n";
    let samples = parse(body).unwrap();
    assert_eq!(histogram_buckets(&samples, "foo"), vec![(1.0, 3.0), (f64::INFINITY, 5.0)]);
}

#[test]
fn test_label_sets_merged_per_boundary() {
    let body = "\
foo_bucket{le=\"1.0\",model_name=\"a\"} 1
foo_bucket{le=\"+Inf\",model_name=\"a\"} 2
foo_bucket{le=\"1.0\",model_name=\"b\"} 3
foo_bucket{le=\"+Inf\",model_name=\"b\"} 4
foo_sum{model_name=\"a\"} 0.5
foo_sum{model_name=\"b\"} 1.5
";
    let samples = parse(body).unwrap();
    assert_eq!(histogram_buckets(&samples, "foo"), vec![(1.0, 4.0), (f64::INFINITY, 6.0)]);

    let names = MetricNames { ttft: "foo".to_string(), ..MetricNames::default() };
    let snap = MetricsSnapshot::from_samples(&samples, &names);
    assert_eq!(snap.ttft_sum, 2.0);
}

#[test]
fn test_request_count_falls_back_to_e2e_count() {
    let body = "\
vllm:e2e_request_latency_seconds_count{model_name=\"a\"} 7
vllm:e2e_request_latency_seconds_count{model_name=\"b\"} 2
";
    let samples = parse(body).unwrap();
    assert_eq!(request_count(&samples, &MetricNames::default()), Some(9.0));
}

#[test]
fn test_missing_families_read_as_zero() {
    let snap = MetricsSnapshot::from_exposition("process_open_fds 12\n", &MetricNames::default()).unwrap();
    assert_eq!(snap, MetricsSnapshot::default());
    assert_eq!(snap.request_count, 0.0);
    assert!(snap.ttft_buckets.is_empty());
}

#[test]
fn test_malformed_body_is_an_error() {
    let err = MetricsSnapshot::from_exposition("<html>oops</html>\n", &MetricNames::default()).unwrap_err();
    assert_eq!(err.line, 1);
}
