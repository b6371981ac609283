use crate::http::{build_client, duration_from_env};
use reqwest::{Client, StatusCode};
use std::time::Duration;

/// Reachability oracle for remote assets. Implementations must be boolean:
/// any transport failure means "unreachable", never an error.
pub trait Prechecker {
    fn is_reachable(&self, url: &str) -> impl Future<Output = bool> + Send;
}

pub struct HttpProbe {
    http: Client,
    timeout: Duration,
}

impl HttpProbe {
    pub fn from_env() -> Self {
        let timeout = duration_from_env("PROBE_TIMEOUT_SECS", 5);
        Self {
            http: build_client(timeout),
            timeout,
        }
    }
}

impl Prechecker for HttpProbe {
    /// Probes with a HEAD request first; some CDNs reject HEAD, so a non-200
    /// answer falls back to a GET whose body is never read (dropping the
    /// response aborts the transfer after the status line).
    async fn is_reachable(&self, url: &str) -> bool {
        match self
            .http
            .head(url)
            .timeout(self.timeout)
            .send()
            .await
        {
            Ok(response) if response.status() == StatusCode::OK => return true,
            Ok(_) | Err(_) => {}
        }

        match self.http.get(url).timeout(self.timeout).send().await {
            Ok(response) => response.status() == StatusCode::OK,
            Err(_) => false,
        }
    }
}
