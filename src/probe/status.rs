use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Snapshot of the target's self-reported status endpoint
///
/// Every field is optional on the wire; anything missing reads as zero or
/// false.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TargetStatus {
    #[serde(default)]
    pub memory_leaked_mb: f64,
    #[serde(default)]
    pub cpu_stress_active: bool,
    #[serde(default)]
    pub slow_mode: bool,
    #[serde(default)]
    pub pid: Option<u32>,
}

/// Reads the target's status endpoint. Informational only.
#[derive(Debug, Clone)]
pub struct StatusProbe {
    client: reqwest::Client,
}

impl StatusProbe {
    pub fn new() -> Result<Self> {
        Ok(Self::with_client(super::http_client()?))
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Fetch and decode the status document, falling back to defaults
    pub async fn fetch(&self, url: &str, timeout: Duration) -> TargetStatus {
        let response = match self.client.get(url).timeout(timeout).send().await {
            Ok(response) => response,
            Err(e) => {
                debug!(url, "Status endpoint unreachable: {}", e);
                return TargetStatus::default();
            }
        };

        if response.status() != reqwest::StatusCode::OK {
            debug!(url, status = response.status().as_u16(), "Status endpoint not OK");
            return TargetStatus::default();
        }

        match response.json::<TargetStatus>().await {
            Ok(status) => status,
            Err(e) => {
                debug!(url, "Malformed status document: {}", e);
                TargetStatus::default()
            }
        }
    }
}
