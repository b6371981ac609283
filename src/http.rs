use reqwest::Client;
use std::time::Duration;

/// Shared client constructor. Callers pick the total timeout per purpose
/// (short for probes, long for inference, longest for the inline fallback);
/// the connect timeout is env-tunable in one place.
pub fn build_client(timeout: Duration) -> Client {
    let connect = std::env::var("HTTP_CONNECT_TIMEOUT_SECS")
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(5);
    Client::builder()
        .timeout(timeout)
        .connect_timeout(Duration::from_secs(connect))
        .build()
        .unwrap_or_else(|_| Client::new())
}

pub fn duration_from_env(key: &str, default_secs: u64) -> Duration {
    let secs = std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .filter(|v| *v > 0)
        .unwrap_or(default_secs);
    Duration::from_secs(secs)
}
