use clap::Parser;
use std::path::PathBuf;
use storybench_common::RunResults;

pub const DEFAULT_MODEL: &str = "meta-llama/Llama-3.1-8B-Instruct";

#[derive(Parser, Debug)]
#[command(name = "storybench", about = "Story finishing game latency benchmark")]
pub struct Args {
    /// Inference server base URL (server root or its /v1 API base)
    #[arg(long, default_value = "http://localhost:8000")]
    pub base_url: String,

    /// Telemetry endpoint; derived from the base URL when omitted
    #[arg(long)]
    pub metrics_url: Option<String>,

    /// Model name to request
    #[arg(long, short = 'm', default_value = DEFAULT_MODEL)]
    pub model: String,

    /// Inferences per turn (should equal c)
    #[arg(long, short = 'k', default_value_t = 50)]
    pub k: u32,

    /// Tokens generated per turn
    #[arg(long, short = 'c', default_value_t = 50)]
    pub c: u32,

    /// Total number of turns
    #[arg(long, short = 't', default_value_t = 10)]
    pub turns: u32,

    #[arg(long, default_value_t = 0.7)]
    pub temperature: f64,

    /// Pause between a response and the second scrape (ms)
    #[arg(long, default_value_t = 100)]
    pub grace_ms: u64,

    #[arg(long, default_value_t = 5)]
    pub scrape_timeout_secs: u64,

    #[arg(long, default_value_t = 300)]
    pub request_timeout_secs: u64,

    /// How long to wait for the server's health endpoint
    #[arg(long, default_value_t = 60)]
    pub ready_timeout_secs: u64,

    /// Leading turns left out of the run aggregates
    #[arg(long, default_value_t = 1)]
    pub warmup_turns: usize,

    /// Results file
    #[arg(long, short = 'o', default_value = "results.json")]
    pub output: PathBuf,

    /// Fail if more turns than this have an invalid measurement window
    #[arg(long)]
    pub max_invalid_turns: Option<usize>,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

impl Args {
    /// Whether `results` has more invalid windows than `--max-invalid-turns` allows.
    pub fn invalid_turns_exceeded(&self, results: &RunResults) -> bool {
        self.max_invalid_turns
            .is_some_and(|max| results.metrics.invalid_turns > max)
    }
}
