use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};
use sysinfo::{Pid, ProcessRefreshKind, ProcessStatus, ProcessesToUpdate, System};

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Outcome of a single resource inspection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceResult {
    pub healthy: bool,
    pub detail: String,
    /// Resident memory in megabytes, when it could be read
    pub memory_mb: Option<f64>,
}

impl ResourceResult {
    pub fn unhealthy(detail: impl Into<String>) -> Self {
        Self {
            healthy: false,
            detail: detail.into(),
            memory_mb: None,
        }
    }

    /// Classify a memory reading against the ceiling
    ///
    /// Only readings strictly above the limit are unhealthy.
    pub fn from_memory(memory_mb: f64, limit_mb: u64) -> Self {
        if memory_mb > limit_mb as f64 {
            Self {
                healthy: false,
                detail: format!("memory {:.2}MB exceeds limit {}MB", memory_mb, limit_mb),
                memory_mb: Some(memory_mb),
            }
        } else {
            Self {
                healthy: true,
                detail: format!("memory {:.2}MB", memory_mb),
                memory_mb: Some(memory_mb),
            }
        }
    }
}

/// Reads OS process state for the supervised target
pub struct ResourceInspector {
    system: System,
}

impl ResourceInspector {
    pub fn new() -> Self {
        Self {
            system: System::new(),
        }
    }

    /// Inspect `pid` and classify it against `memory_limit_mb`
    ///
    /// Never fails: a missing process, a zombie, or an unusable process
    /// table all come back as an unhealthy result.
    pub fn check(&mut self, pid: u32, memory_limit_mb: u64) -> ResourceResult {
        if !sysinfo::IS_SUPPORTED_SYSTEM {
            return ResourceResult::unhealthy("process inspection unsupported on this platform");
        }
        if pid == 0 {
            return ResourceResult::unhealthy("invalid process id 0");
        }

        let sys_pid = Pid::from_u32(pid);
        self.system.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[sys_pid]),
            true,
            ProcessRefreshKind::new().with_memory(),
        );

        let Some(process) = self.system.process(sys_pid) else {
            return ResourceResult::unhealthy("process not found");
        };

        match process.status() {
            ProcessStatus::Zombie => ResourceResult::unhealthy("zombie"),
            ProcessStatus::Dead => ResourceResult::unhealthy("process not found"),
            _ => ResourceResult::from_memory(process.memory() as f64 / BYTES_PER_MB, memory_limit_mb),
        }
    }

    /// Whether `pid` exists and has not terminated
    pub fn is_process_alive(&mut self, pid: u32) -> bool {
        let sys_pid = Pid::from_u32(pid);
        self.system.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[sys_pid]),
            true,
            ProcessRefreshKind::new(),
        );

        match self.system.process(sys_pid) {
            Some(process) => !matches!(process.status(), ProcessStatus::Zombie | ProcessStatus::Dead),
            None => false,
        }
    }

    /// Kernel start time of `pid` in seconds since the epoch
    ///
    /// Together with the PID this identifies one incarnation of a process.
    pub fn start_time(&mut self, pid: u32) -> Option<u64> {
        let sys_pid = Pid::from_u32(pid);
        self.system.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[sys_pid]),
            true,
            ProcessRefreshKind::new(),
        );

        self.system
            .process(sys_pid)
            .filter(|process| !matches!(process.status(), ProcessStatus::Zombie | ProcessStatus::Dead))
            .map(|process| process.start_time())
    }

    /// PIDs from `tracked` that still run as the same incarnation
    ///
    /// A PID whose start time changed has been recycled by the OS and is
    /// left out.
    pub fn survivors(&mut self, tracked: &[(u32, u64)]) -> Vec<u32> {
        tracked
            .iter()
            .filter(|&&(pid, started)| self.start_time(pid) == Some(started))
            .map(|&(pid, _)| pid)
            .collect()
    }

    /// All live descendants of `pid`, parents before children
    ///
    /// Refreshes the whole process table; blocking.
    pub fn descendants(&mut self, pid: u32) -> Vec<u32> {
        self.system
            .refresh_processes_specifics(ProcessesToUpdate::All, true, ProcessRefreshKind::new());

        let mut children: HashMap<u32, Vec<u32>> = HashMap::new();
        for (child_pid, process) in self.system.processes() {
            // Threads show up as tasks of their process on Linux
            if process.thread_kind().is_some() {
                continue;
            }
            if let Some(parent) = process.parent() {
                children
                    .entry(parent.as_u32())
                    .or_default()
                    .push(child_pid.as_u32());
            }
        }

        let mut found = Vec::new();
        let mut seen = HashSet::from([pid]);
        let mut queue = VecDeque::from([pid]);
        while let Some(current) = queue.pop_front() {
            for &child in children.get(&current).into_iter().flatten() {
                if seen.insert(child) {
                    found.push(child);
                    queue.push_back(child);
                }
            }
        }

        found
    }
}

impl Default for ResourceInspector {
    fn default() -> Self {
        Self::new()
    }
}
