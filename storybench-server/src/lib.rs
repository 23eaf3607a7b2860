use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use storybench_common::api::{ChatCompletionRequest, ChatCompletionResponse, ChatMessage, Choice, Usage};
use storybench_common::{ErrorBody, ErrorResponse, MetricNames};
use tokio::sync::RwLock;
use tokio::time::timeout;
use tracing::{debug, error, info};

pub mod config;
pub mod telemetry;
use config::LOCK_TIMEOUT;
pub use telemetry::{RequestTimings, Telemetry};

const WORDS: &[&str] = &[
    "the", "fox", "wandered", "through", "a", "quiet", "forest", "until", "it", "found", "an", "old",
    "lantern", "glowing", "beneath", "silver", "leaves", "and", "then", "slowly",
];

/// Deterministic latency model used to fabricate per-request timings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LatencyModel {
    pub ttft_base: Duration,
    /// Extra prefill cost per prompt character.
    pub ttft_per_prompt_char: Duration,
    pub tpot: Duration,
}

impl Default for LatencyModel {
    fn default() -> Self {
        Self {
            ttft_base: Duration::from_millis(20),
            ttft_per_prompt_char: Duration::from_micros(10),
            tpot: Duration::from_millis(15),
        }
    }
}

impl LatencyModel {
    /// Timings for a prompt of `prompt_chars` characters producing `tokens` tokens.
    pub fn timings(&self, prompt_chars: usize, tokens: u32) -> RequestTimings {
        let ttft = self.ttft_base.as_secs_f64() + self.ttft_per_prompt_char.as_secs_f64() * prompt_chars as f64;
        let tpot = self.tpot.as_secs_f64();
        let decode = tpot * tokens.saturating_sub(1) as f64;
        RequestTimings {
            ttft,
            prefill: ttft,
            decode,
            tpot,
            e2e: ttft + decode,
        }
    }
}

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub address: SocketAddr,
    /// Model name served; requests for any other model get a 404.
    pub model: String,
    pub latency: LatencyModel,
    /// Delay between answering a request and recording it in telemetry.
    pub telemetry_lag: Duration,
    pub names: MetricNames,
}

impl ServerConfig {
    pub fn new(address: SocketAddr, model: impl Into<String>) -> Self {
        Self {
            address,
            model: model.into(),
            latency: LatencyModel::default(),
            telemetry_lag: Duration::ZERO,
            names: MetricNames::default(),
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub telemetry: Arc<RwLock<Telemetry>>,
    pub config: Arc<ServerConfig>,
    next_id: Arc<AtomicU64>,
}

impl AppState {
    /// Fails when a configured family name is not a valid metric name.
    pub fn new(config: ServerConfig) -> prometheus::Result<Self> {
        let telemetry = Telemetry::new(config.model.clone(), &config.names)?;
        Ok(Self {
            telemetry: Arc::new(RwLock::new(telemetry)),
            config: Arc::new(config),
            next_id: Arc::new(AtomicU64::new(0)),
        })
    }

    /// Zero every counter and histogram, simulating a server restart.
    /// Holds the write lock so no scrape sees a half-reset registry.
    pub async fn reset_telemetry(&self) {
        self.telemetry.write().await.reset();
        info!("telemetry reset");
    }
}

/// Reference inference server exporting latency telemetry.
pub struct Server {
    state: AppState,
}

impl Server {
    /// Create a new server with the given configuration
    pub fn new(config: ServerConfig) -> prometheus::Result<Self> {
        Ok(Self { state: AppState::new(config)? })
    }

    /// Get the server's configured address
    pub fn address(&self) -> SocketAddr {
        self.state.config.address
    }

    /// Shared state, for controlling telemetry while the server runs.
    pub fn state(&self) -> AppState {
        self.state.clone()
    }

    /// Create the application router with the given state
    pub fn create_router(state: AppState) -> Router {
        Router::new()
            .route("/health", get(handle_health))
            .route("/v1/chat/completions", post(handle_completion))
            .route("/metrics", get(handle_metrics))
            .with_state(state)
    }

    /// Run the server, signalling `ready_tx` with the bound address once accepting connections
    pub async fn run(self, ready_tx: tokio::sync::oneshot::Sender<SocketAddr>) -> Result<(), Box<dyn std::error::Error>> {
        let address = self.address();
        let app = Self::create_router(self.state);
        let listener = tokio::net::TcpListener::bind(address).await?;
        let local_addr = listener.local_addr()?;
        ready_tx.send(local_addr).ok();
        axum::serve(listener, app).await?;
        Ok(())
    }
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(ErrorResponse { error: ErrorBody { message: message.into() } })).into_response()
}

/// `max_tokens` whitespace-separated words, chosen from `seed`.
pub fn generate_text(seed: usize, max_tokens: u32) -> String {
    (0..max_tokens as usize)
        .map(|i| WORDS[(seed + i) % WORDS.len()])
        .collect::<Vec<_>>()
        .join(" ")
}

/// Handler for GET /health
pub async fn handle_health() -> StatusCode {
    StatusCode::OK
}

/// Handler for POST /v1/chat/completions: answers with exactly `max_tokens`
/// words and records the fabricated timings, after `telemetry_lag` if set.
pub async fn handle_completion(State(state): State<AppState>, Json(request): Json<ChatCompletionRequest>) -> Response {
    if request.model != state.config.model {
        return error_response(
            StatusCode::NOT_FOUND,
            format!("The model `{}` does not exist.", request.model),
        );
    }
    if request.max_tokens == 0 {
        return error_response(StatusCode::BAD_REQUEST, "max_tokens must be at least 1");
    }

    let prompt: String = request
        .messages
        .iter()
        .filter_map(|m| m.content.as_deref())
        .collect::<Vec<_>>()
        .join("\n");
    let prompt_chars = prompt.chars().count();
    let prompt_tokens = prompt.split_whitespace().count() as u64;
    let text = generate_text(prompt_chars, request.max_tokens);
    let timings = state.config.latency.timings(prompt_chars, request.max_tokens);

    let lag = state.config.telemetry_lag;
    if lag.is_zero() {
        match timeout(LOCK_TIMEOUT, state.telemetry.read()).await {
            Ok(telemetry) => telemetry.record(&timings, "length"),
            Err(_) => return error_response(StatusCode::SERVICE_UNAVAILABLE, "Server error: Lock acquisition timed out"),
        }
    } else {
        let telemetry = Arc::clone(&state.telemetry);
        tokio::spawn(async move {
            tokio::time::sleep(lag).await;
            telemetry.read().await.record(&timings, "length");
        });
    }

    let id = state.next_id.fetch_add(1, Ordering::Relaxed);
    debug!(id, prompt_chars, max_tokens = request.max_tokens, ttft = timings.ttft, "completion served");

    Json(ChatCompletionResponse {
        id: format!("chatcmpl-{id}"),
        model: state.config.model.clone(),
        choices: vec![Choice {
            index: 0,
            message: ChatMessage { role: "assistant".to_string(), content: Some(text) },
            finish_reason: Some("length".to_string()),
        }],
        usage: Some(Usage {
            prompt_tokens,
            completion_tokens: u64::from(request.max_tokens),
            total_tokens: prompt_tokens + u64::from(request.max_tokens),
        }),
    })
    .into_response()
}

/// Handler for GET /metrics: current telemetry in the text exposition format.
pub async fn handle_metrics(State(state): State<AppState>) -> Response {
    let rendered = match timeout(LOCK_TIMEOUT, state.telemetry.read()).await {
        Ok(telemetry) => telemetry.render(),
        Err(_) => return error_response(StatusCode::SERVICE_UNAVAILABLE, "Server error: Lock acquisition timed out"),
    };
    match rendered {
        Ok(body) => ([(header::CONTENT_TYPE, prometheus::TEXT_FORMAT)], body).into_response(),
        Err(e) => {
            error!("Failed to encode metrics: {}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to encode metrics")
        }
    }
}
