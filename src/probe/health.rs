use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Outcome of a single health probe
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthResult {
    pub healthy: bool,
    pub detail: String,
}

impl HealthResult {
    pub fn healthy(detail: impl Into<String>) -> Self {
        Self {
            healthy: true,
            detail: detail.into(),
        }
    }

    pub fn unhealthy(detail: impl Into<String>) -> Self {
        Self {
            healthy: false,
            detail: detail.into(),
        }
    }

    /// Classify an HTTP status code; only 200 is healthy
    pub fn from_status(code: u16) -> Self {
        let detail = format!("status code {}", code);
        if code == 200 {
            Self::healthy(detail)
        } else {
            Self::unhealthy(detail)
        }
    }

    /// Classify a transport-level failure
    pub fn from_error(err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::unhealthy("timed out")
        } else if err.is_connect() || is_refused_or_reset(err) {
            Self::unhealthy("connection refused")
        } else {
            Self::unhealthy(err.to_string())
        }
    }
}

fn is_refused_or_reset(err: &reqwest::Error) -> bool {
    let mut source = std::error::Error::source(err);
    while let Some(cause) = source {
        if let Some(io_err) = cause.downcast_ref::<std::io::Error>() {
            return matches!(
                io_err.kind(),
                std::io::ErrorKind::ConnectionRefused
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
            );
        }
        source = cause.source();
    }
    false
}

/// Issues bounded-timeout GET requests against a health endpoint
///
/// No retries happen here; each call is exactly one request.
#[derive(Debug, Clone)]
pub struct HealthProbe {
    client: reqwest::Client,
}

impl HealthProbe {
    pub fn new() -> Result<Self> {
        Ok(Self::with_client(super::http_client()?))
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Probe `url` once and classify the outcome
    ///
    /// Never fails: every transport problem is folded into an unhealthy
    /// `HealthResult`. A zero timeout counts as already expired.
    pub async fn check(&self, url: &str, timeout: Duration) -> HealthResult {
        if timeout.is_zero() {
            return HealthResult::unhealthy("timed out");
        }

        let result = match self.client.get(url).timeout(timeout).send().await {
            Ok(response) => HealthResult::from_status(response.status().as_u16()),
            Err(e) => HealthResult::from_error(&e),
        };

        debug!(url, healthy = result.healthy, detail = %result.detail, "Health probe finished");
        result
    }
}
