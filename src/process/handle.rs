use chrono::{DateTime, Local};
use std::time::Duration;
use tokio::process::Child;

/// The supervisor's reference to a launched target process
///
/// Handles are never mutated into pointing at a different process: a
/// restart consumes the old handle and returns a new one. The child stays
/// unreaped until `stop`, so a crashed target lingers as a zombie and its
/// PID cannot be handed to an unrelated process while the handle is live.
#[derive(Debug)]
pub struct ProcessHandle {
    pid: u32,
    started_at: DateTime<Local>,
    pub(crate) child: Child,
}

impl ProcessHandle {
    pub(crate) fn new(pid: u32, child: Child) -> Self {
        Self {
            pid,
            started_at: Local::now(),
            child,
        }
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn started_at(&self) -> DateTime<Local> {
        self.started_at
    }

    pub fn uptime(&self) -> Duration {
        (Local::now() - self.started_at)
            .to_std()
            .unwrap_or(Duration::from_secs(0))
    }
}
