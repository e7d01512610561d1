//! Readiness probing for HTTP workers.
//!
//! Request/response workers expose `GET /health` and answer 200 once their
//! model is loaded. Callers poll it before sending traffic.

use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum HealthError {
    #[error("Invalid base URL: {0}")]
    InvalidUrl(String),

    #[error("Worker at {url} not ready after {attempts} attempts (last: {last})")]
    NotReady {
        url: String,
        attempts: u32,
        last: String,
    },

    #[error("HTTP client error: {0}")]
    Client(#[from] reqwest::Error),
}

/// Readiness probe configuration.
#[derive(Debug, Clone)]
pub struct HealthConfig {
    pub interval: Duration,
    pub max_attempts: u32,
    /// Timeout for a single probe request.
    pub request_timeout: Duration,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            max_attempts: 60,
            request_timeout: Duration::from_secs(5),
        }
    }
}

/// Outcome of a successful wait.
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub url: String,
    pub attempts: u32,
    pub waited_ms: u64,
}

/// Health endpoint for a worker base URL. A trailing `/v1` is stripped since
/// OpenAI-compatible servers serve `/health` at the root.
pub fn health_url(base_url: &str) -> Result<String, HealthError> {
    let trimmed = base_url.trim().trim_end_matches('/');
    if !(trimmed.starts_with("http://") || trimmed.starts_with("https://")) {
        return Err(HealthError::InvalidUrl(base_url.to_string()));
    }
    let root = trimmed.strip_suffix("/v1").unwrap_or(trimmed);
    Ok(format!("{}/health", root))
}

/// Poll `GET {base_url}/health` until it answers 200.
pub async fn wait_until_ready(
    base_url: &str,
    config: &HealthConfig,
) -> Result<HealthReport, HealthError> {
    let url = health_url(base_url)?;
    let client = reqwest::Client::builder()
        .timeout(config.request_timeout)
        .build()?;
    let started = tokio::time::Instant::now();
    let max_attempts = config.max_attempts.max(1);
    let mut last = String::from("no response");

    for attempt in 1..=max_attempts {
        match client.get(&url).send().await {
            Ok(response) if response.status().is_success() => {
                let report = HealthReport {
                    url: url.clone(),
                    attempts: attempt,
                    waited_ms: started.elapsed().as_millis() as u64,
                };
                info!(url = %url, attempts = attempt, "worker ready");
                return Ok(report);
            }
            Ok(response) => {
                last = format!("status {}", response.status());
                debug!(url = %url, attempt, status = %response.status(), "worker not ready");
            }
            Err(e) => {
                last = e.to_string();
                debug!(url = %url, attempt, error = %e, "health probe failed");
            }
        }

        if attempt < max_attempts {
            tokio::time::sleep(config.interval).await;
        }
    }

    warn!(url = %url, attempts = max_attempts, "worker never became ready");
    Err(HealthError::NotReady {
        url,
        attempts: max_attempts,
        last,
    })
}
