use chrono::Utc;
use clap::Parser;
use std::process;
use std::time::Duration;
use storybench::cli::Args;
use storybench::game::{GameConfig, StoryGame};
use storybench::output::{build_aborted_results, build_results, write_results};
use storybench::server::wait_until_ready;
use storybench_client::{InferenceClient, InferenceConfig, MetricsClient, MetricsClientConfig};
use storybench_common::{ExperimentParams, RunResults};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    if args.k == 0 || args.c == 0 || args.turns == 0 {
        eprintln!("--k, --c and --turns must all be at least 1");
        process::exit(3);
    }

    let mut inference_config = InferenceConfig::new(&args.base_url, &args.model);
    inference_config.timeout = Duration::from_secs(args.request_timeout_secs);
    let inference = InferenceClient::new(inference_config);

    let mut metrics_config = match &args.metrics_url {
        Some(url) => MetricsClientConfig::new(url),
        None => MetricsClientConfig::for_server(&args.base_url),
    };
    metrics_config.timeout = Duration::from_secs(args.scrape_timeout_secs);
    let metrics = MetricsClient::new(metrics_config);

    if let Err(e) = wait_until_ready(&inference, Duration::from_secs(args.ready_timeout_secs)).await {
        eprintln!("Setup failed: {e}");
        process::exit(3);
    }
    println!("Server ready:  {}  |  telemetry {}", inference.completions_url(), metrics.config.url);

    let mut game_config = GameConfig::new(args.k, args.c, args.turns);
    game_config.temperature = args.temperature;
    game_config.grace = Duration::from_millis(args.grace_ms);

    let timestamp = Utc::now();
    let played = StoryGame::new(&inference, &metrics, game_config).play().await;

    let params = ExperimentParams {
        k: args.k,
        c: args.c,
        turns: args.turns,
        model: args.model.clone(),
        warmup_turns: args.warmup_turns,
        grace_ms: args.grace_ms,
        timestamp,
    };
    let results = match played {
        Ok(outcome) => build_results(outcome, params),
        Err(aborted) => {
            error!(turn = aborted.turn, error = %aborted.error, "run aborted");
            build_aborted_results(aborted, params)
        }
    };

    if let Err(e) = write_results(&args.output, &results) {
        eprintln!("Failed to write {}: {e}", args.output.display());
        process::exit(1);
    }
    info!(path = %args.output.display(), "results written");

    print_report(&args, &results);

    if let Some(reason) = &results.error {
        eprintln!("Run aborted after {} of {} turns: {reason}", results.total_turns, args.turns);
        process::exit(1);
    }
    process::exit(if args.invalid_turns_exceeded(&results) { 2 } else { 0 });
}

fn print_report(args: &Args, results: &RunResults) {
    let m = &results.metrics;
    let invalid_exceeded = args.invalid_turns_exceeded(results);
    let passed = results.error.is_none() && !invalid_exceeded;
    let threshold = args
        .max_invalid_turns
        .map(|n| n.to_string())
        .unwrap_or_else(|| "none".to_string());

    println!("Storybench Results");
    println!("==================");
    println!("Model:                 {}", args.model);
    println!("k / c:                 {} / {}", args.k, args.c);
    println!("Turns:                 {} of {}", results.total_turns, args.turns);
    println!("Total time:            {:.2} s", results.total_time);
    println!("Final context:         {} chars", results.final_context_length);
    println!();
    println!("Measured turns:        {} (warm-up {})", m.measured_turns, args.warmup_turns);
    println!("Avg TTFT:              {:.1} ms", secs_to_ms(m.avg_ttft));
    println!("P50 / P99 TTFT:        {:.1} / {:.1} ms", secs_to_ms(m.ttft_p50), secs_to_ms(m.ttft_p99));
    println!("Avg TPOT:              {:.2} ms", secs_to_ms(m.avg_tpot));
    println!("P50 / P99 TPOT:        {:.2} / {:.2} ms", secs_to_ms(m.tpot_p50), secs_to_ms(m.tpot_p99));
    println!();
    println!(
        "Invalid windows:       {}        [threshold: {}]        {}",
        m.invalid_turns,
        threshold,
        if invalid_exceeded { "✗" } else { "✓" },
    );
    println!();
    println!("Results file:          {}", args.output.display());
    if let Some(reason) = &results.error {
        println!("Aborted:               {reason}");
    }
    println!("Result: {}", if passed { "PASS" } else { "FAIL" });
}

fn secs_to_ms(secs: f64) -> f64 {
    secs * 1_000.0
}
