use std::time::{Duration, Instant};
use storybench_client::InferenceClient;
use storybench_common::{BenchError, Result};
use tracing::{debug, info};

const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Poll the server's health endpoint until it answers 200 or `timeout` elapses.
///
/// The server is expected to be running already; this only waits for it to
/// finish loading.
pub async fn wait_until_ready(client: &InferenceClient, timeout: Duration) -> Result<()> {
    let deadline = Instant::now() + timeout;
    let url = client.health_url();
    loop {
        if client.is_healthy().await {
            info!(%url, "inference server ready");
            return Ok(());
        }
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(BenchError::ServerNotReady(format!(
                "{url} did not answer within {}s",
                timeout.as_secs_f64()
            )));
        }
        debug!(%url, "server not ready yet");
        tokio::time::sleep(Duration::min(remaining, POLL_INTERVAL)).await;
    }
}
