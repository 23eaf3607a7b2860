use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::Response;
use axum::Json;
use std::net::SocketAddr;
use std::time::Duration;
use storybench_common::api::{ChatCompletionRequest, ChatCompletionResponse, ChatMessage};
use storybench_common::{ErrorResponse, MetricNames, MetricsSnapshot, WindowStatus};
use storybench_server::{
    config::{TPOT_BUCKETS, TTFT_BUCKETS},
    generate_text, handle_completion, handle_health, handle_metrics, AppState, LatencyModel, RequestTimings, Server,
    ServerConfig, Telemetry,
};

// --- Test helpers ---

const MODEL: &str = "test-model";

fn test_config() -> ServerConfig {
    let address: SocketAddr = "127.0.0.1:0".parse().unwrap();
    ServerConfig::new(address, MODEL)
}

fn fresh_state() -> AppState {
    AppState::new(test_config()).unwrap()
}

fn telemetry(model: &str) -> Telemetry {
    Telemetry::new(model, &MetricNames::default()).unwrap()
}

fn request(model: &str, prompt: &str, max_tokens: u32) -> ChatCompletionRequest {
    ChatCompletionRequest {
        model: model.to_string(),
        messages: vec![ChatMessage::user(prompt)],
        max_tokens,
        temperature: 0.7,
    }
}

/// Consume a response body into bytes.
async fn response_body(response: Response) -> Vec<u8> {
    axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap().to_vec()
}

async fn complete(state: &AppState, prompt: &str, max_tokens: u32) -> ChatCompletionResponse {
    let response = handle_completion(State(state.clone()), Json(request(MODEL, prompt, max_tokens))).await;
    assert_eq!(response.status(), StatusCode::OK);
    serde_json::from_slice(&response_body(response).await).unwrap()
}

async fn scrape(state: &AppState) -> MetricsSnapshot {
    let response = handle_metrics(State(state.clone())).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = String::from_utf8(response_body(response).await).unwrap();
    MetricsSnapshot::from_exposition(&body, &MetricNames::default()).unwrap()
}

fn approx(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-9
}

// --- Latency model ---

#[test]
fn test_latency_model_scales_ttft_with_prompt_length() {
    let model = LatencyModel {
        ttft_base: Duration::from_millis(10),
        ttft_per_prompt_char: Duration::from_micros(100),
        tpot: Duration::from_millis(5),
    };

    let short = model.timings(0, 1);
    let long = model.timings(1000, 1);

    assert!(approx(short.ttft, 0.010));
    assert!(approx(long.ttft, 0.110));
    assert_eq!(short.prefill, short.ttft);
}

#[test]
fn test_latency_model_decode_covers_tokens_after_the_first() {
    let model = LatencyModel {
        ttft_base: Duration::from_millis(10),
        ttft_per_prompt_char: Duration::ZERO,
        tpot: Duration::from_millis(5),
    };

    let t = model.timings(0, 11);

    assert!(approx(t.decode, 0.050));
    assert!(approx(t.tpot, 0.005));
    assert!(approx(t.e2e, 0.060));
    assert_eq!(model.timings(0, 1).decode, 0.0);
}

// --- Telemetry rendering ---

#[test]
fn test_rendered_telemetry_parses_back_into_snapshot() {
    let telemetry = telemetry(MODEL);
    let timings = RequestTimings { ttft: 0.03, prefill: 0.03, decode: 0.2, tpot: 0.02, e2e: 0.23 };
    telemetry.record(&timings, "length");
    telemetry.record(&timings, "stop");

    let text = telemetry.render().unwrap();
    let snapshot = MetricsSnapshot::from_exposition(&text, &MetricNames::default()).unwrap();

    assert_eq!(snapshot.request_count, 2.0);
    assert!(approx(snapshot.ttft_sum, 0.06));
    assert!(approx(snapshot.tpot_sum, 0.04));
    assert!(approx(snapshot.decode_sum, 0.4));
    assert!(approx(snapshot.prefill_sum, 0.06));
    assert_eq!(snapshot.ttft_buckets.len(), TTFT_BUCKETS.len() + 1);
    assert_eq!(snapshot.tpot_buckets.len(), TPOT_BUCKETS.len() + 1);
    assert_eq!(snapshot.ttft_buckets.last(), Some(&(f64::INFINITY, 2.0)));
    // 0.03 lands in the (0.02, 0.04] bucket.
    assert!(snapshot.ttft_buckets.contains(&(0.02, 0.0)));
    assert!(snapshot.ttft_buckets.contains(&(0.04, 2.0)));
}

#[test]
fn test_render_exports_every_finish_reason_from_start() {
    let text = telemetry(MODEL).render().unwrap();

    for reason in ["stop", "length", "abort"] {
        let line = format!("vllm:request_success_total{{finished_reason=\"{reason}\",model_name=\"{MODEL}\"}} 0");
        assert!(text.contains(&line), "missing {line}");
    }
    assert!(text.contains("# TYPE vllm:time_to_first_token_seconds histogram"));
}

#[test]
fn test_render_escapes_model_label() {
    let text = telemetry("a\"b").render().unwrap();
    let snapshot = MetricsSnapshot::from_exposition(&text, &MetricNames::default()).unwrap();

    assert!(text.contains("model_name=\"a\\\"b\""));
    assert_eq!(snapshot.request_count, 0.0);
}

#[test]
fn test_render_uses_configured_family_names() {
    let names = MetricNames {
        ttft: "custom:ttft".to_string(),
        ..MetricNames::default()
    };
    let text = Telemetry::new(MODEL, &names).unwrap().render().unwrap();
    let snapshot = MetricsSnapshot::from_exposition(&text, &names).unwrap();

    assert!(text.contains("custom:ttft_bucket"));
    assert!(!text.contains("vllm:time_to_first_token_seconds"));
    assert_eq!(snapshot.ttft_buckets.len(), TTFT_BUCKETS.len() + 1);
}

#[test]
fn test_invalid_family_name_is_rejected() {
    let names = MetricNames {
        tpot: "not a metric name".to_string(),
        ..MetricNames::default()
    };

    assert!(Telemetry::new(MODEL, &names).is_err());
    assert!(AppState::new(ServerConfig { names, ..test_config() }).is_err());
}

#[test]
fn test_reset_zeroes_counters_and_keeps_model() {
    let telemetry = telemetry(MODEL);
    telemetry.record(&LatencyModel::default().timings(10, 4), "length");
    assert_eq!(telemetry.requests(), 1);
    assert_eq!(telemetry.ttft_count(), 1);

    telemetry.reset();

    assert_eq!(telemetry.requests(), 0);
    assert_eq!(telemetry.ttft_count(), 0);
    assert_eq!(telemetry.model, MODEL);
    // Families stay exported, so the next scrape keeps the same boundaries.
    let snapshot = MetricsSnapshot::from_exposition(&telemetry.render().unwrap(), &MetricNames::default()).unwrap();
    assert_eq!(snapshot.ttft_buckets.len(), TTFT_BUCKETS.len() + 1);
}

// --- Handlers ---

#[tokio::test]
async fn test_health_returns_200() {
    assert_eq!(handle_health().await, StatusCode::OK);
}

#[tokio::test]
async fn test_completion_returns_exactly_max_tokens_words() {
    let state = fresh_state();

    let response = complete(&state, "Once upon a time", 7).await;

    let text = response.choices[0].message.content.clone().unwrap();
    assert_eq!(text.split_whitespace().count(), 7);
    assert_eq!(response.model, MODEL);
    let usage = response.usage.unwrap();
    assert_eq!(usage.completion_tokens, 7);
    assert_eq!(usage.prompt_tokens, 4);
    assert_eq!(usage.total_tokens, 11);
}

#[tokio::test]
async fn test_completion_text_is_deterministic() {
    let state = fresh_state();

    let first = complete(&state, "same prompt", 5).await;
    let second = complete(&state, "same prompt", 5).await;

    assert_eq!(first.choices[0].message.content, second.choices[0].message.content);
    assert_ne!(first.id, second.id);
}

#[tokio::test]
async fn test_completion_unknown_model_returns_404() {
    let state = fresh_state();

    let response = handle_completion(State(state.clone()), Json(request("other", "hi", 3))).await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body: ErrorResponse = serde_json::from_slice(&response_body(response).await).unwrap();
    assert!(body.error.message.contains("other"));
    assert_eq!(state.telemetry.read().await.requests(), 0);
}

#[tokio::test]
async fn test_completion_zero_max_tokens_returns_400() {
    let state = fresh_state();

    let response = handle_completion(State(state), Json(request(MODEL, "hi", 0))).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_completion_is_recorded_in_metrics() {
    let state = fresh_state();
    let before = scrape(&state).await;

    complete(&state, "Once upon a time", 10).await;
    let after = scrape(&state).await;

    let delta = after.delta(&before).unwrap();
    let expected = LatencyModel::default().timings("Once upon a time".chars().count(), 10);
    assert_eq!(delta.status(), WindowStatus::Observed);
    assert!(approx(delta.ttft(), expected.ttft));
    assert!(approx(delta.tpot(), expected.tpot));
    assert!(approx(delta.decode_time(), expected.decode));
}

#[tokio::test]
async fn test_metrics_sets_exposition_content_type() {
    let state = fresh_state();

    let response = handle_metrics(State(state)).await;

    let content_type = response.headers().get(header::CONTENT_TYPE).unwrap().to_str().unwrap();
    assert!(content_type.starts_with("text/plain"));
}

#[tokio::test]
async fn test_telemetry_lag_delays_recording() {
    let mut config = test_config();
    config.telemetry_lag = Duration::from_millis(100);
    let state = AppState::new(config).unwrap();

    complete(&state, "prompt", 3).await;
    assert_eq!(state.telemetry.read().await.requests(), 0);

    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(state.telemetry.read().await.requests(), 1);
}

#[tokio::test]
async fn test_reset_telemetry_shows_as_counter_reset() {
    let state = fresh_state();
    complete(&state, "prompt", 3).await;
    let before = scrape(&state).await;

    state.reset_telemetry().await;
    let after = scrape(&state).await;

    let delta = after.delta(&before).unwrap();
    assert_eq!(delta.status(), WindowStatus::CounterReset);
}

#[test]
fn test_generate_text_cycles_vocabulary() {
    assert_eq!(generate_text(0, 0), "");
    assert_eq!(generate_text(3, 4).split(' ').count(), 4);
    assert_eq!(generate_text(3, 4), generate_text(3, 4));
}

// --- Server lifecycle ---

#[tokio::test]
async fn test_server_reports_configured_address_and_shares_state() {
    let server = Server::new(test_config()).unwrap();

    assert_eq!(server.address(), "127.0.0.1:0".parse::<SocketAddr>().unwrap());
    server.state().telemetry.read().await.record(&LatencyModel::default().timings(1, 1), "stop");
    assert_eq!(server.state().telemetry.read().await.requests(), 1);
}
