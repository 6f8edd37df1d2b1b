// State module - Supervisor state and status snapshot export

use crate::error::{ReboundError, Result};
use crate::probe::{HealthResult, TargetStatus};
use crate::process::ResourceResult;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

/// Version of the snapshot file format
const SNAPSHOT_VERSION: &str = "1.0.0";

/// Where the supervisor is in its state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    Starting,
    Healthy,
    Degraded,
    Restarting,
    Stopped,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Starting => write!(f, "STARTING"),
            Phase::Healthy => write!(f, "HEALTHY"),
            Phase::Degraded => write!(f, "DEGRADED"),
            Phase::Restarting => write!(f, "RESTARTING"),
            Phase::Stopped => write!(f, "STOPPED"),
        }
    }
}

/// Everything the loop tracks between cycles
///
/// Owned and mutated by the supervisor only; other readers get a
/// `StatusSnapshot` copy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SupervisorState {
    pub phase: Phase,
    pub pid: Option<u32>,
    pub started_at: Option<DateTime<Local>>,
    pub cycles: u64,
    pub restarts: u64,
    pub consecutive_failures: u32,
    pub last_check: Option<DateTime<Local>>,
    pub last_restart: Option<DateTime<Local>>,
    pub last_healed: Option<DateTime<Local>>,
    pub last_reason: Option<String>,
    pub last_health: Option<HealthResult>,
    pub last_resource: Option<ResourceResult>,
    pub target_status: Option<TargetStatus>,
}

impl SupervisorState {
    pub fn new() -> Self {
        Self {
            phase: Phase::Starting,
            pid: None,
            started_at: None,
            cycles: 0,
            restarts: 0,
            consecutive_failures: 0,
            last_check: None,
            last_restart: None,
            last_healed: None,
            last_reason: None,
            last_health: None,
            last_resource: None,
            target_status: None,
        }
    }

    pub fn record_launch(&mut self, pid: u32, started_at: DateTime<Local>) {
        self.pid = Some(pid);
        self.started_at = Some(started_at);
    }

    pub fn record_check(&mut self, health: &HealthResult, resource: &ResourceResult) {
        self.cycles += 1;
        self.last_check = Some(Local::now());
        self.last_health = Some(health.clone());
        self.last_resource = Some(resource.clone());
    }

    /// Count an unhealthy cycle and return the consecutive total
    pub fn record_failure(&mut self, reason: &str) -> u32 {
        self.consecutive_failures += 1;
        self.last_reason = Some(reason.to_string());
        self.consecutive_failures
    }

    pub fn record_restart(&mut self) {
        self.restarts += 1;
        self.consecutive_failures = 0;
        self.last_restart = Some(Local::now());
        self.phase = Phase::Restarting;
    }

    pub fn record_healed(&mut self) {
        self.last_healed = Some(Local::now());
    }

    pub fn record_stopped(&mut self) {
        self.phase = Phase::Stopped;
        self.pid = None;
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        StatusSnapshot {
            version: SNAPSHOT_VERSION.to_string(),
            updated_at: Local::now(),
            state: self.clone(),
        }
    }
}

impl Default for SupervisorState {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time copy of the supervisor state for external readers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub version: String,
    pub updated_at: DateTime<Local>,
    #[serde(flatten)]
    pub state: SupervisorState,
}

impl Default for StatusSnapshot {
    fn default() -> Self {
        SupervisorState::new().snapshot()
    }
}

/// Writes status snapshots to disk for out-of-process readers
pub struct SnapshotStore {
    path: PathBuf,
}

impl SnapshotStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Save a snapshot with an atomic temp-file + rename
    pub fn save(&self, snapshot: &StatusSnapshot) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| {
                    ReboundError::StateSaveError(format!("Failed to create state directory: {}", e))
                })?;
            }
        }

        let temp_path = self.path.with_extension("tmp");

        {
            let file = File::create(&temp_path).map_err(|e| {
                ReboundError::StateSaveError(format!("Failed to create temp state file: {}", e))
            })?;

            let mut writer = BufWriter::new(file);

            serde_json::to_writer_pretty(&mut writer, snapshot).map_err(|e| {
                ReboundError::StateSaveError(format!("Failed to serialize snapshot: {}", e))
            })?;

            writer.flush().map_err(|e| {
                ReboundError::StateSaveError(format!("Failed to flush state file: {}", e))
            })?;
        }

        fs::rename(&temp_path, &self.path).map_err(|e| {
            ReboundError::StateSaveError(format!("Failed to rename temp state file: {}", e))
        })?;

        Ok(())
    }

    /// Read back the last saved snapshot
    pub fn load(&self) -> Result<StatusSnapshot> {
        let file = File::open(&self.path)?;
        serde_json::from_reader(BufReader::new(file)).map_err(|e| {
            ReboundError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e))
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
