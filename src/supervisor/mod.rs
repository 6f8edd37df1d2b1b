// Supervisor module - the probe / inspect / decide / recover loop

mod decision;

pub use decision::{unhealthy_reason, CycleReport, Verdict};

use crate::config::SupervisorConfig;
use crate::error::Result;
use crate::logs::EventTag;
use crate::probe::{http_client, HealthProbe, StatusProbe};
use crate::process::{
    ProcessHandle, ProcessLifecycle, ResourceInspector, ResourceResult, StartRetryPolicy,
    StopOutcome,
};
use crate::state::{Phase, SnapshotStore, StatusSnapshot, SupervisorState};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Totals reported when the loop exits cleanly
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub cycles: u64,
    pub restarts: u64,
    /// Outcome of the final stop, `None` when no target was running
    pub final_stop: Option<StopOutcome>,
}

/// Keeps one target process alive and healthy
///
/// The supervisor owns the only `ProcessHandle`; there is one thread of
/// control and cycles never overlap. External readers observe it through
/// `subscribe`.
pub struct Supervisor {
    config: Arc<SupervisorConfig>,
    probe: HealthProbe,
    status_probe: StatusProbe,
    inspector: ResourceInspector,
    lifecycle: ProcessLifecycle,
    state: SupervisorState,
    handle: Option<ProcessHandle>,
    status_tx: watch::Sender<StatusSnapshot>,
    store: Option<SnapshotStore>,
}

impl Supervisor {
    /// Validate the configuration and build the supervisor
    ///
    /// Nothing is launched until `launch` or `run`.
    pub fn new(config: SupervisorConfig) -> Result<Self> {
        config.validate()?;

        let client = http_client()?;
        let retry = StartRetryPolicy::from_config(&config.start_retry);
        let state = SupervisorState::new();
        let (status_tx, _) = watch::channel(state.snapshot());
        let store = config.state_file.as_ref().map(SnapshotStore::new);

        Ok(Self {
            config: Arc::new(config),
            probe: HealthProbe::with_client(client.clone()),
            status_probe: StatusProbe::with_client(client),
            inspector: ResourceInspector::new(),
            lifecycle: ProcessLifecycle::with_retry_policy(retry),
            state,
            handle: None,
            status_tx,
            store,
        })
    }

    pub fn config(&self) -> &SupervisorConfig {
        &self.config
    }

    pub fn state(&self) -> &SupervisorState {
        &self.state
    }

    /// PID of the currently live target, if any
    pub fn current_pid(&self) -> Option<u32> {
        self.handle.as_ref().map(ProcessHandle::pid)
    }

    /// Receive a fresh `StatusSnapshot` after every state change
    pub fn subscribe(&self) -> watch::Receiver<StatusSnapshot> {
        self.status_tx.subscribe()
    }

    /// Run until `shutdown` flips to `true`
    ///
    /// Launches the target, waits the settle delay, then runs cycles at the
    /// configured interval. On shutdown the target gets one final stop
    /// before this returns. A launch that exhausts its retries ends the loop
    /// with `LaunchFailed`.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> Result<RunSummary> {
        info!(
            tag = %EventTag::Starting,
            "Self-healing supervisor active (health: {}, interval: {:?}, memory limit: {}MB)",
            self.config.health_url,
            self.config.check_interval(),
            self.config.memory_threshold_mb
        );

        self.launch().await?;

        let mut running = pause(self.config.settle_delay(), &mut shutdown).await;

        while running {
            let report = match self.run_cycle().await {
                Ok(report) => report,
                Err(e) => {
                    error!("Supervisor halted: {}", e);
                    self.shutdown().await;
                    return Err(e);
                }
            };

            if matches!(report.verdict, Verdict::Restarted { .. }) {
                info!(
                    "Waiting {:?} for stabilization",
                    self.config.stabilization_delay()
                );
                running = pause(self.config.stabilization_delay(), &mut shutdown).await;
                if !running {
                    break;
                }
            }

            running = pause(self.config.check_interval(), &mut shutdown).await;
        }

        let final_stop = self.shutdown().await;

        Ok(RunSummary {
            cycles: self.state.cycles,
            restarts: self.state.restarts,
            final_stop,
        })
    }

    /// Start the initial target process
    pub async fn launch(&mut self) -> Result<()> {
        self.state.phase = Phase::Starting;

        match self.lifecycle.start(&self.config.target).await {
            Ok(handle) => {
                self.state.record_launch(handle.pid(), handle.started_at());
                self.handle = Some(handle);
                self.publish();
                Ok(())
            }
            Err(e) => {
                self.state.record_stopped();
                self.publish();
                Err(e)
            }
        }
    }

    /// Perform a single cycle: probe, inspect, decide, maybe restart
    ///
    /// Only a failed relaunch makes this return an error; in that case no
    /// target is running afterwards.
    pub async fn run_cycle(&mut self) -> Result<CycleReport> {
        let health = self
            .probe
            .check(&self.config.health_url, self.config.probe_timeout())
            .await;

        let resource = match self.handle {
            Some(ref handle) => self
                .inspector
                .check(handle.pid(), self.config.memory_threshold_mb),
            None => ResourceResult::unhealthy("no target process"),
        };

        if let Some(ref status_url) = self.config.status_url {
            let status = self
                .status_probe
                .fetch(status_url, self.config.probe_timeout())
                .await;
            debug!(
                leaked_mb = status.memory_leaked_mb,
                cpu_stress = status.cpu_stress_active,
                "Target status"
            );
            self.state.target_status = Some(status);
        }

        self.state.record_check(&health, &resource);
        info!(
            tag = %EventTag::Check,
            cycle = self.state.cycles,
            "HTTP: {} ({}) | RES: {} ({})",
            mark(health.healthy),
            health.detail,
            mark(resource.healthy),
            resource.detail
        );

        let verdict = match unhealthy_reason(&health, &resource) {
            None => self.on_healthy(),
            Some(reason) => self.on_unhealthy(reason).await?,
        };

        self.publish();

        Ok(CycleReport {
            health,
            resource,
            verdict,
        })
    }

    /// Stop the current target, if any, and mark the supervisor stopped
    pub async fn shutdown(&mut self) -> Option<StopOutcome> {
        info!(tag = %EventTag::Shutdown, "Shutting down supervisor");

        let outcome = match self.handle.take() {
            Some(mut handle) => Some(
                self.lifecycle
                    .stop(&mut handle, self.config.stop_timeout())
                    .await,
            ),
            None => None,
        };

        self.state.record_stopped();
        self.publish();

        outcome
    }

    fn on_healthy(&mut self) -> Verdict {
        self.state.consecutive_failures = 0;

        let verdict = match self.state.phase {
            Phase::Restarting | Phase::Degraded => {
                info!(tag = %EventTag::Healed, "HEALED: target healthy again");
                self.state.record_healed();
                Verdict::Healed
            }
            Phase::Starting | Phase::Stopped => {
                info!(tag = %EventTag::Up, "Target is up and healthy");
                Verdict::Up
            }
            Phase::Healthy => {
                debug!("System healthy");
                Verdict::Healthy
            }
        };

        self.state.phase = Phase::Healthy;
        verdict
    }

    async fn on_unhealthy(&mut self, reason: String) -> Result<Verdict> {
        let failures = self.state.record_failure(&reason);

        if failures < self.config.failure_threshold {
            warn!(
                tag = %EventTag::Degraded,
                "Target unhealthy ({}/{}): {}",
                failures,
                self.config.failure_threshold,
                reason
            );
            self.state.phase = Phase::Degraded;
            return Ok(Verdict::Degraded { reason, failures });
        }

        warn!(tag = %EventTag::Activated, reason = %reason, "HEALER ACTIVATED: {}", reason);

        let old_pid = self.current_pid();
        let relaunched = match self.handle.take() {
            Some(old) => {
                debug!(pid = old.pid(), uptime = ?old.uptime(), "Replacing target");
                self.lifecycle
                    .restart(old, &self.config.target, self.config.stop_timeout())
                    .await
            }
            None => self.lifecycle.start(&self.config.target).await,
        };

        let handle = match relaunched {
            Ok(handle) => handle,
            Err(e) => {
                self.state.record_stopped();
                self.publish();
                return Err(e);
            }
        };

        let new_pid = handle.pid();
        self.state.record_launch(new_pid, handle.started_at());
        self.state.record_restart();
        self.handle = Some(handle);

        info!(
            tag = %EventTag::Restarted,
            restarts = self.state.restarts,
            "Target restarted with PID {}",
            new_pid
        );

        Ok(Verdict::Restarted {
            reason,
            old_pid,
            new_pid,
        })
    }

    fn publish(&self) {
        let snapshot = self.state.snapshot();

        if let Some(ref store) = self.store {
            if let Err(e) = store.save(&snapshot) {
                warn!("Failed to write status snapshot: {}", e);
            }
        }

        self.status_tx.send_replace(snapshot);
    }
}

fn mark(healthy: bool) -> &'static str {
    if healthy {
        "✓"
    } else {
        "✗"
    }
}

/// Sleep for `duration` unless shutdown is requested first
///
/// Returns `false` when the supervisor should stop.
async fn pause(duration: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    if *shutdown.borrow() {
        return false;
    }

    let sleep = tokio::time::sleep(duration);
    tokio::pin!(sleep);

    loop {
        tokio::select! {
            _ = &mut sleep => return true,
            changed = shutdown.changed() => match changed {
                Ok(()) => {
                    if *shutdown.borrow() {
                        return false;
                    }
                }
                Err(_) => {
                    // Sender gone: nobody can ask us to stop any more
                    (&mut sleep).await;
                    return true;
                }
            },
        }
    }
}
