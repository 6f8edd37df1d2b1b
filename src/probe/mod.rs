// Probe module - HTTP checks against the supervised target

mod health;
mod status;

pub use health::{HealthProbe, HealthResult};
pub use status::{StatusProbe, TargetStatus};

use crate::error::{ReboundError, Result};

/// Build the HTTP client shared by the probes
///
/// Proxies are disabled: the target normally lives on loopback and an
/// inherited `HTTP_PROXY` would turn every probe into a proxy probe.
pub fn http_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .no_proxy()
        .build()
        .map_err(|e| ReboundError::HttpClientError(format!("Failed to build HTTP client: {}", e)))
}
