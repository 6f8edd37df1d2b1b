use crate::config::{BackoffKind, StartRetryConfig};
use std::time::Duration;

/// Retry policy for launching the target
#[derive(Debug, Clone, PartialEq)]
pub struct StartRetryPolicy {
    /// Total launch attempts, at least 1
    pub attempts: u32,
    /// Delay before the second attempt (in milliseconds)
    pub initial_delay_ms: u64,
    /// Backoff strategy to use
    pub backoff_strategy: BackoffStrategy,
}

impl StartRetryPolicy {
    /// A single attempt with no delay
    pub fn once() -> Self {
        Self {
            attempts: 1,
            initial_delay_ms: 0,
            backoff_strategy: BackoffStrategy::Fixed,
        }
    }

    /// Create a retry policy from configuration values
    pub fn from_config(config: &StartRetryConfig) -> Self {
        let backoff_strategy = match config.backoff {
            BackoffKind::Fixed => BackoffStrategy::Fixed,
            BackoffKind::Exponential => BackoffStrategy::Exponential {
                max_delay_ms: config.max_delay_ms,
            },
        };

        Self {
            attempts: config.attempts.max(1),
            initial_delay_ms: config.delay_ms,
            backoff_strategy,
        }
    }

    /// Whether another attempt may follow `failed` failed attempts
    pub fn should_retry(&self, failed: u32) -> bool {
        failed < self.attempts
    }

    /// Delay to wait after `failed` failed attempts
    pub fn calculate_delay(&self, failed: u32) -> Duration {
        self.backoff_strategy
            .calculate_delay(self.initial_delay_ms, failed.saturating_sub(1))
    }
}

impl Default for StartRetryPolicy {
    fn default() -> Self {
        Self::from_config(&StartRetryConfig::default())
    }
}

/// Backoff strategy for launch retry delays
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BackoffStrategy {
    /// Fixed delay between attempts
    Fixed,
    /// Exponential backoff with maximum delay
    Exponential { max_delay_ms: u64 },
}

impl BackoffStrategy {
    /// Calculate the delay for the given retry index (0 = first retry)
    pub fn calculate_delay(&self, initial_delay_ms: u64, retry: u32) -> Duration {
        match self {
            BackoffStrategy::Fixed => Duration::from_millis(initial_delay_ms),
            BackoffStrategy::Exponential { max_delay_ms } => {
                // delay = initial * 2^retry
                let delay_ms = initial_delay_ms
                    .saturating_mul(2_u64.saturating_pow(retry))
                    .min(*max_delay_ms);
                Duration::from_millis(delay_ms)
            }
        }
    }
}
