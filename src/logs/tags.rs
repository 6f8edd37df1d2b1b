use serde::{Deserialize, Serialize};
use std::fmt;

/// Classification tag attached to every supervisor log event
///
/// External log watchers key off these values, so the strings are part of
/// the log contract and must not change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventTag {
    Starting,
    Up,
    Check,
    Activated,
    Restarted,
    Healed,
    Degraded,
    Stopping,
    LaunchFailed,
    Shutdown,
}

impl EventTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventTag::Starting => "STARTING",
            EventTag::Up => "UP",
            EventTag::Check => "CHECK",
            EventTag::Activated => "ACTIVATED",
            EventTag::Restarted => "RESTARTED",
            EventTag::Healed => "HEALED",
            EventTag::Degraded => "DEGRADED",
            EventTag::Stopping => "STOPPING",
            EventTag::LaunchFailed => "LAUNCH_FAILED",
            EventTag::Shutdown => "SHUTDOWN",
        }
    }
}

impl fmt::Display for EventTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_activation_and_heal_are_distinct() {
        assert_ne!(EventTag::Activated.as_str(), EventTag::Healed.as_str());
        assert_eq!(EventTag::LaunchFailed.to_string(), "LAUNCH_FAILED");
    }

    #[test]
    fn test_serde_matches_display() {
        let json = serde_json::to_string(&EventTag::LaunchFailed).unwrap();
        assert_eq!(json, "\"LAUNCH_FAILED\"");
    }
}
