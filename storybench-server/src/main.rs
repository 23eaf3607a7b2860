use clap::Parser;
use std::net::SocketAddr;
use std::time::Duration;
use storybench_server::{LatencyModel, Server, ServerConfig};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "storybench-server", about = "Reference inference server exporting latency telemetry")]
struct Args {
    /// Address to listen on.
    #[arg(long, default_value = "127.0.0.1:8000")]
    address: SocketAddr,

    /// Model name the server answers for.
    #[arg(long, default_value = "storybench/mock")]
    model: String,

    /// Base time to first token, in milliseconds.
    #[arg(long, default_value_t = 20)]
    ttft_ms: u64,

    /// Additional time to first token per prompt character, in microseconds.
    #[arg(long, default_value_t = 10)]
    ttft_per_char_us: u64,

    /// Time per output token, in milliseconds.
    #[arg(long, default_value_t = 15)]
    tpot_ms: u64,

    /// Delay before a finished request shows up in /metrics, in milliseconds.
    #[arg(long, default_value_t = 0)]
    telemetry_lag_ms: u64,

    /// Log filter used when RUST_LOG is unset.
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let mut config = ServerConfig::new(args.address, args.model);
    config.latency = LatencyModel {
        ttft_base: Duration::from_millis(args.ttft_ms),
        ttft_per_prompt_char: Duration::from_micros(args.ttft_per_char_us),
        tpot: Duration::from_millis(args.tpot_ms),
    };
    config.telemetry_lag = Duration::from_millis(args.telemetry_lag_ms);

    let (ready_tx, ready_rx) = tokio::sync::oneshot::channel();

    tokio::spawn(async move {
        if let Ok(addr) = ready_rx.await {
            info!(%addr, "listening");
            println!("Listening on {}", addr);
        }
    });

    Server::new(config)?.run(ready_tx).await?;
    Ok(())
}
