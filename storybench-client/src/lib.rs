use std::time::Duration;
use storybench_common::api::{ChatCompletionRequest, ChatCompletionResponse, ChatMessage};
use storybench_common::{BenchError, ErrorResponse, Result};
use uuid::Uuid;

pub mod measure;
pub mod metrics;

pub use measure::{measure, Measurement, DEFAULT_GRACE_PERIOD};
pub use metrics::{metrics_url_for, MetricsClient, MetricsClientConfig};

/// Per-request timeout for generation calls; long generations on a cold server are slow.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

/// Inference client configuration
#[derive(Debug, Clone)]
pub struct InferenceConfig {
    /// Server root or its `/v1` API base, e.g. `http://localhost:8000/v1`.
    pub base_url: String,
    pub model: String,
    pub timeout: Duration,
}

impl InferenceConfig {
    pub fn new(base_url: &str, model: &str) -> Self {
        Self {
            base_url: base_url.to_string(),
            model: model.to_string(),
            timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

/// Result of one generation request
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub text: String,
    pub prompt_tokens: u64,
    /// Tokens the server reports having generated.
    pub completion_tokens: u64,
}

/// Client for an OpenAI-compatible chat completion server
pub struct InferenceClient {
    pub config: InferenceConfig,
    http_client: reqwest::Client,
}

impl InferenceClient {
    pub fn new(config: InferenceConfig) -> Self {
        Self {
            config,
            http_client: reqwest::Client::new(),
        }
    }

    pub fn completions_url(&self) -> String {
        format!("{}/v1/chat/completions", server_root(&self.config.base_url))
    }

    pub fn health_url(&self) -> String {
        format!("{}/health", server_root(&self.config.base_url))
    }

    /// `true` when `GET /health` answers 200 within one second.
    pub async fn is_healthy(&self) -> bool {
        self.http_client
            .get(self.health_url())
            .timeout(Duration::from_secs(1))
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }

    /// Issue one non-streaming chat completion for `prompt`.
    pub async fn complete(&self, prompt: &str, max_tokens: u32, temperature: f64) -> Result<Completion> {
        let body = ChatCompletionRequest {
            model: self.config.model.clone(),
            messages: vec![ChatMessage::user(prompt)],
            max_tokens,
            temperature,
        };

        let response = self
            .http_client
            .post(self.completions_url())
            .timeout(self.config.timeout)
            .header("X-Request-Id", Uuid::new_v4().to_string())
            .json(&body)
            .send()
            .await
            .map_err(|e| BenchError::NetworkError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(parse_error_response(status, response).await);
        }

        let parsed: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| BenchError::InvalidResponse(e.to_string()))?;

        let text = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| BenchError::InvalidResponse("no text generated".to_string()))?;
        let usage = parsed
            .usage
            .ok_or_else(|| BenchError::InvalidResponse("missing usage".to_string()))?;

        Ok(Completion {
            text,
            prompt_tokens: usage.prompt_tokens,
            completion_tokens: usage.completion_tokens,
        })
    }
}

/// Strip trailing slashes and an API version suffix: `http://h:8000/v1/` → `http://h:8000`.
pub fn server_root(base_url: &str) -> &str {
    let trimmed = base_url.trim_end_matches('/');
    trimmed.strip_suffix("/v1").unwrap_or(trimmed).trim_end_matches('/')
}

async fn parse_error_response(status: reqwest::StatusCode, response: reqwest::Response) -> BenchError {
    let error_msg = response
        .json::<ErrorResponse>()
        .await
        .map(|r| r.error.message)
        .unwrap_or_else(|_| format!("Server returned status: {}", status));

    BenchError::HttpError(status.as_u16(), error_msg)
}
