use crate::probe::HealthResult;
use crate::process::ResourceResult;

/// What a single cycle concluded
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// First healthy cycle after the initial launch
    Up,
    /// Healthy, nothing changed
    Healthy,
    /// Healthy again after a restart or a degraded stretch
    Healed,
    /// Unhealthy but below the consecutive-failure threshold
    Degraded { reason: String, failures: u32 },
    /// Unhealthy; the target was restarted
    Restarted {
        reason: String,
        old_pid: Option<u32>,
        new_pid: u32,
    },
}

impl Verdict {
    pub fn is_healthy(&self) -> bool {
        matches!(self, Verdict::Up | Verdict::Healthy | Verdict::Healed)
    }
}

/// Results of one probe/inspect/decide pass
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub health: HealthResult,
    pub resource: ResourceResult,
    pub verdict: Verdict,
}

/// Why a cycle is unhealthy, if it is
///
/// Either signal alone is enough. When both fail the probe's detail wins.
pub fn unhealthy_reason(health: &HealthResult, resource: &ResourceResult) -> Option<String> {
    if !health.healthy {
        Some(health.detail.clone())
    } else if !resource.healthy {
        Some(resource.detail.clone())
    } else {
        None
    }
}
