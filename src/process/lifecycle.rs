use crate::config::TargetCommand;
use crate::error::{ReboundError, Result};
use crate::logs::EventTag;
use crate::process::handle::ProcessHandle;
use crate::process::inspector::ResourceInspector;
use crate::process::restart::StartRetryPolicy;
use crate::process::spawner::spawn_target;
use nix::errno::Errno;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use std::fmt;
use std::process::ExitStatus;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Upper bound on reaping after SIGKILL; the kernel normally needs far less
const FORCED_REAP_TIMEOUT: Duration = Duration::from_secs(5);

/// How a `stop` call ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// The process had already exited before stop began
    AlreadyGone,
    /// The process exited within the grace timeout
    Graceful,
    /// The process had to be killed with SIGKILL
    Forced,
}

impl fmt::Display for StopOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopOutcome::AlreadyGone => write!(f, "already gone"),
            StopOutcome::Graceful => write!(f, "graceful"),
            StopOutcome::Forced => write!(f, "forced"),
        }
    }
}

/// Starts, stops and restarts the target as a child process
pub struct ProcessLifecycle {
    inspector: ResourceInspector,
    retry: StartRetryPolicy,
}

impl ProcessLifecycle {
    /// Lifecycle manager that makes a single launch attempt
    pub fn new() -> Self {
        Self::with_retry_policy(StartRetryPolicy::once())
    }

    pub fn with_retry_policy(retry: StartRetryPolicy) -> Self {
        Self {
            inspector: ResourceInspector::new(),
            retry,
        }
    }

    /// Launch the target and return its handle without waiting for readiness
    ///
    /// Failed launches are retried according to the retry policy; once the
    /// attempts are used up the last spawn error is reported as
    /// `LaunchFailed`.
    pub async fn start(&self, target: &TargetCommand) -> Result<ProcessHandle> {
        let mut failed = 0;

        loop {
            info!(tag = %EventTag::Starting, "Starting {}", target.display());

            let err = match spawn_target(target) {
                Ok(handle) => {
                    info!(tag = %EventTag::Starting, pid = handle.pid(), "Target started with PID {}", handle.pid());
                    return Ok(handle);
                }
                Err(e) => e,
            };

            failed += 1;
            if !self.retry.should_retry(failed) {
                error!(tag = %EventTag::LaunchFailed, attempts = failed, "Giving up on launching target: {}", err);
                return Err(ReboundError::LaunchFailed {
                    attempts: failed,
                    reason: err.to_string(),
                });
            }

            let delay = self.retry.calculate_delay(failed);
            warn!(attempt = failed, "Launch attempt {} failed: {}; retrying in {:?}", failed, err, delay);
            tokio::time::sleep(delay).await;
        }
    }

    /// Stop the process behind `handle`
    ///
    /// Descendants get SIGTERM first, then the process itself. If it has not
    /// exited after `grace_timeout`, or anything in the graceful path fails,
    /// descendants and process are sent SIGKILL. Descendants are tracked by
    /// PID and start time, so a recycled PID is never signalled with SIGKILL.
    /// Stopping a handle whose process is already gone is a no-op, so
    /// repeated calls are safe.
    pub async fn stop(&mut self, handle: &mut ProcessHandle, grace_timeout: Duration) -> StopOutcome {
        let pid = handle.pid();

        match handle.child.try_wait() {
            Ok(Some(status)) => {
                info!(tag = %EventTag::Stopping, pid, "Process {} already gone ({})", pid, status);
                return StopOutcome::AlreadyGone;
            }
            Ok(None) => {}
            Err(e) => {
                warn!(pid, "Could not query process {} state: {}", pid, e);
            }
        }

        info!(tag = %EventTag::Stopping, pid, "Stopping process {}", pid);

        let tracked = Self::track_descendants(pid).await;
        let descendants: Vec<u32> = tracked.iter().map(|&(child, _)| child).collect();
        if !descendants.is_empty() {
            debug!(pid, ?descendants, "Terminating {} descendant(s)", descendants.len());
        }

        match Self::terminate_gracefully(handle, &descendants, grace_timeout).await {
            Ok(status) => {
                info!(tag = %EventTag::Stopping, pid, "Process {} exited gracefully ({})", pid, status);
                // Descendants still running now would be orphaned
                let stragglers = self.inspector.survivors(&tracked);
                Self::signal_all(&stragglers, Signal::SIGKILL);
                StopOutcome::Graceful
            }
            Err(e) => {
                warn!(tag = %EventTag::Stopping, pid, "{}; forcing kill", e);
                let stragglers = self.inspector.survivors(&tracked);
                Self::force_kill(handle, &stragglers).await;
                StopOutcome::Forced
            }
        }
    }

    /// Stop `old` and launch a fresh target
    ///
    /// The old handle is consumed; the returned handle is the only live one.
    pub async fn restart(
        &mut self,
        mut old: ProcessHandle,
        target: &TargetCommand,
        grace_timeout: Duration,
    ) -> Result<ProcessHandle> {
        let outcome = self.stop(&mut old, grace_timeout).await;
        debug!(pid = old.pid(), %outcome, "Old target stopped");
        drop(old);

        self.start(target).await
    }

    /// Descendants of `pid` paired with their start times
    ///
    /// The full process-table scan runs on the blocking pool.
    async fn track_descendants(pid: u32) -> Vec<(u32, u64)> {
        let scan = tokio::task::spawn_blocking(move || {
            let mut inspector = ResourceInspector::new();
            inspector
                .descendants(pid)
                .into_iter()
                .filter_map(|child| inspector.start_time(child).map(|started| (child, started)))
                .collect::<Vec<_>>()
        });

        match scan.await {
            Ok(tracked) => tracked,
            Err(e) => {
                warn!(pid, "Descendant scan failed: {}", e);
                Vec::new()
            }
        }
    }

    async fn terminate_gracefully(
        handle: &mut ProcessHandle,
        descendants: &[u32],
        grace_timeout: Duration,
    ) -> Result<ExitStatus> {
        let pid = handle.pid();

        Self::signal_all(descendants, Signal::SIGTERM);

        if let Err(e) = signal::kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
            // ESRCH here means it died between try_wait and now; the wait below reaps it
            if e != Errno::ESRCH {
                return Err(ReboundError::SignalError(format!(
                    "Failed to send SIGTERM to {}: {}",
                    pid, e
                )));
            }
        }

        match tokio::time::timeout(grace_timeout, handle.child.wait()).await {
            Ok(Ok(status)) => Ok(status),
            Ok(Err(e)) => Err(ReboundError::StopError(pid, format!("Wait failed: {}", e))),
            Err(_) => Err(ReboundError::StopError(
                pid,
                format!("did not exit within {:?}", grace_timeout),
            )),
        }
    }

    async fn force_kill(handle: &mut ProcessHandle, descendants: &[u32]) {
        let pid = handle.pid();

        Self::signal_all(descendants, Signal::SIGKILL);

        if let Err(e) = handle.child.start_kill() {
            warn!(pid, "Failed to send SIGKILL to {}: {}", pid, e);
        }

        match tokio::time::timeout(FORCED_REAP_TIMEOUT, handle.child.wait()).await {
            Ok(Ok(status)) => info!(tag = %EventTag::Stopping, pid, "Process {} killed ({})", pid, status),
            Ok(Err(e)) => error!(pid, "Failed to reap process {}: {}", pid, e),
            Err(_) => error!(pid, "Process {} still present {:?} after SIGKILL", pid, FORCED_REAP_TIMEOUT),
        }
    }

    fn signal_all(pids: &[u32], sig: Signal) {
        for &pid in pids {
            match signal::kill(Pid::from_raw(pid as i32), sig) {
                Ok(()) | Err(Errno::ESRCH) => {}
                Err(e) => warn!(pid, "Failed to send {:?} to descendant {}: {}", sig, pid, e),
            }
        }
    }
}

impl Default for ProcessLifecycle {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_start_returns_live_handle() {
        let mut lifecycle = ProcessLifecycle::new();
        let mut handle = lifecycle
            .start(&TargetCommand::new("/bin/sleep").with_args(["10"]))
            .await
            .unwrap();

        let mut inspector = ResourceInspector::new();
        assert!(inspector.is_process_alive(handle.pid()));

        let outcome = lifecycle.stop(&mut handle, Duration::from_secs(2)).await;
        assert_eq!(outcome, StopOutcome::Graceful);
    }

    #[tokio::test]
    async fn test_start_failure_is_error() {
        let lifecycle = ProcessLifecycle::new();
        let result = lifecycle.start(&TargetCommand::new("/nonexistent/target")).await;

        match result {
            Err(ReboundError::LaunchFailed { attempts, reason }) => {
                assert_eq!(attempts, 1);
                assert!(reason.contains("does not exist"));
            }
            other => panic!("Expected LaunchFailed, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_start_retries_before_giving_up() {
        let policy = StartRetryPolicy {
            attempts: 3,
            initial_delay_ms: 50,
            backoff_strategy: crate::process::BackoffStrategy::Fixed,
        };
        let lifecycle = ProcessLifecycle::with_retry_policy(policy);

        let started = std::time::Instant::now();
        let result = lifecycle.start(&TargetCommand::new("/nonexistent/target")).await;

        assert!(matches!(result, Err(ReboundError::LaunchFailed { attempts: 3, .. })));
        // Two delays of 50ms between three attempts
        assert!(started.elapsed() >= Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_stop_exited_process_is_noop() {
        let mut lifecycle = ProcessLifecycle::new();
        let mut handle = lifecycle
            .start(&TargetCommand::new("/bin/sh").with_args(["-c", "exit 3"]))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(200)).await;

        let outcome = lifecycle.stop(&mut handle, Duration::from_secs(1)).await;
        assert_eq!(outcome, StopOutcome::AlreadyGone);
    }

    #[tokio::test]
    async fn test_restart_yields_new_pid() {
        let mut lifecycle = ProcessLifecycle::new();
        let target = TargetCommand::new("/bin/sleep").with_args(["10"]);

        let old = lifecycle.start(&target).await.unwrap();
        let old_pid = old.pid();

        let mut new = lifecycle
            .restart(old, &target, Duration::from_secs(2))
            .await
            .unwrap();
        assert_ne!(new.pid(), old_pid);

        let mut inspector = ResourceInspector::new();
        assert!(!inspector.is_process_alive(old_pid));
        assert!(inspector.is_process_alive(new.pid()));

        lifecycle.stop(&mut new, Duration::from_secs(2)).await;
    }

    #[tokio::test]
    async fn test_track_descendants_records_start_times() {
        let mut lifecycle = ProcessLifecycle::new();
        let mut handle = lifecycle
            .start(&TargetCommand::new("/bin/sh").with_args(["-c", "sleep 5 & wait"]))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(300)).await;

        let tracked = ProcessLifecycle::track_descendants(handle.pid()).await;
        assert_eq!(tracked.len(), 1, "tracked: {:?}", tracked);

        let mut inspector = ResourceInspector::new();
        let (child, started) = tracked[0];
        assert_eq!(inspector.start_time(child), Some(started));

        lifecycle.stop(&mut handle, Duration::from_secs(2)).await;
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(inspector.survivors(&tracked).is_empty());
    }

    #[test]
    fn test_stop_outcome_display() {
        assert_eq!(StopOutcome::AlreadyGone.to_string(), "already gone");
        assert_eq!(StopOutcome::Forced.to_string(), "forced");
    }
}
