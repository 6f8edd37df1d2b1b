use crate::error::{ReboundError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Command used to launch the supervised target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetCommand {
    /// Program to execute (absolute path or looked up in PATH)
    pub command: String,

    /// Command-line arguments
    #[serde(default)]
    pub args: Vec<String>,

    /// Working directory for the target
    #[serde(default)]
    pub cwd: Option<PathBuf>,

    /// Extra environment variables
    #[serde(default)]
    pub env: HashMap<String, String>,
}

impl TargetCommand {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            args: Vec::new(),
            cwd: None,
            env: HashMap::new(),
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Human readable command line, used in log lines
    pub fn display(&self) -> String {
        if self.args.is_empty() {
            self.command.clone()
        } else {
            format!("{} {}", self.command, self.args.join(" "))
        }
    }
}

/// How the delay between launch attempts grows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackoffKind {
    Fixed,
    Exponential,
}

/// Retry settings applied to every launch of the target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StartRetryConfig {
    /// Total launch attempts before giving up
    #[serde(default = "default_start_attempts")]
    pub attempts: u32,

    /// Delay before the second attempt (in milliseconds)
    #[serde(default = "default_start_delay")]
    pub delay_ms: u64,

    #[serde(default = "default_backoff")]
    pub backoff: BackoffKind,

    /// Upper bound for exponential delays (in milliseconds)
    #[serde(default = "default_start_max_delay")]
    pub max_delay_ms: u64,
}

impl Default for StartRetryConfig {
    fn default() -> Self {
        Self {
            attempts: default_start_attempts(),
            delay_ms: default_start_delay(),
            backoff: default_backoff(),
            max_delay_ms: default_start_max_delay(),
        }
    }
}

/// Log output settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive, overridden by RUST_LOG
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Append log lines to this file in addition to stdout
    #[serde(default)]
    pub file: Option<PathBuf>,

    /// Emit JSON lines instead of plain text
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
            json: false,
        }
    }
}

/// Supervisor configuration, immutable once the supervisor is built
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SupervisorConfig {
    /// Endpoint probed every cycle; 200 means healthy
    pub health_url: String,

    /// Optional status endpoint, informational only
    #[serde(default)]
    pub status_url: Option<String>,

    /// How the target is launched
    pub target: TargetCommand,

    /// Pause between cycles (in milliseconds)
    #[serde(default = "default_check_interval")]
    pub check_interval_ms: u64,

    /// Timeout for a single health probe (in milliseconds)
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_ms: u64,

    /// Resident memory ceiling in megabytes
    #[serde(default = "default_memory_threshold")]
    pub memory_threshold_mb: u64,

    /// Boot allowance after the initial launch (in milliseconds)
    #[serde(default = "default_settle_delay")]
    pub settle_delay_ms: u64,

    /// Wait after a restart before checks resume (in milliseconds)
    #[serde(default = "default_stabilization_delay")]
    pub stabilization_delay_ms: u64,

    /// Grace period before a forced kill (in milliseconds)
    #[serde(default = "default_stop_timeout")]
    pub stop_timeout_ms: u64,

    /// Consecutive unhealthy cycles needed to trigger a restart
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    /// Where to write the JSON status snapshot, if anywhere
    #[serde(default)]
    pub state_file: Option<PathBuf>,

    #[serde(default)]
    pub start_retry: StartRetryConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

// Default value functions for serde
fn default_check_interval() -> u64 {
    3_000
}

fn default_probe_timeout() -> u64 {
    2_000
}

fn default_memory_threshold() -> u64 {
    100
}

fn default_settle_delay() -> u64 {
    2_000
}

fn default_stabilization_delay() -> u64 {
    3_000
}

fn default_stop_timeout() -> u64 {
    3_000
}

fn default_failure_threshold() -> u32 {
    1
}

fn default_start_attempts() -> u32 {
    3
}

fn default_start_delay() -> u64 {
    2_000
}

fn default_start_max_delay() -> u64 {
    30_000
}

fn default_backoff() -> BackoffKind {
    BackoffKind::Fixed
}

fn default_log_level() -> String {
    "info".to_string()
}

impl SupervisorConfig {
    /// Build a configuration with default timings
    pub fn new(health_url: impl Into<String>, target: TargetCommand) -> Self {
        Self {
            health_url: health_url.into(),
            status_url: None,
            target,
            check_interval_ms: default_check_interval(),
            probe_timeout_ms: default_probe_timeout(),
            memory_threshold_mb: default_memory_threshold(),
            settle_delay_ms: default_settle_delay(),
            stabilization_delay_ms: default_stabilization_delay(),
            stop_timeout_ms: default_stop_timeout(),
            failure_threshold: default_failure_threshold(),
            state_file: None,
            start_retry: StartRetryConfig::default(),
            logging: LoggingConfig::default(),
        }
    }

    /// Load a configuration file (supports TOML and JSON)
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ReboundError::ConfigError(format!("Failed to read config file: {}", e)))?;

        let extension = path.extension().and_then(|s| s.to_str()).unwrap_or("");

        let mut config = match extension {
            "toml" => Self::parse_toml(&contents)?,
            "json" => Self::parse_json(&contents)?,
            _ => {
                return Err(ReboundError::InvalidConfig(format!(
                    "Unsupported file format: {}. Use .toml or .json",
                    extension
                )))
            }
        };

        config.expand_env_vars();
        config.validate()?;

        Ok(config)
    }

    fn parse_toml(contents: &str) -> Result<Self> {
        toml::from_str(contents)
            .map_err(|e| ReboundError::InvalidConfig(format!("Failed to parse TOML: {}", e)))
    }

    fn parse_json(contents: &str) -> Result<Self> {
        serde_json::from_str(contents)
            .map_err(|e| ReboundError::InvalidConfig(format!("Failed to parse JSON: {}", e)))
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.health_url.trim().is_empty() {
            return Err(ReboundError::MissingConfigField("health_url".to_string()));
        }
        Self::validate_url("health_url", &self.health_url)?;

        if let Some(ref status_url) = self.status_url {
            Self::validate_url("status_url", status_url)?;
        }

        if self.target.command.trim().is_empty() {
            return Err(ReboundError::MissingConfigField("target.command".to_string()));
        }

        let positive = [
            ("check_interval_ms", self.check_interval_ms),
            ("probe_timeout_ms", self.probe_timeout_ms),
            ("stop_timeout_ms", self.stop_timeout_ms),
            ("memory_threshold_mb", self.memory_threshold_mb),
            ("failure_threshold", u64::from(self.failure_threshold)),
            ("start_retry.attempts", u64::from(self.start_retry.attempts)),
        ];
        for (field, value) in positive {
            if value == 0 {
                return Err(ReboundError::ConfigValidationError(format!(
                    "{} must be greater than 0",
                    field
                )));
            }
        }

        if let Some(ref cwd) = self.target.cwd {
            if !cwd.is_dir() {
                return Err(ReboundError::ConfigValidationError(format!(
                    "Working directory does not exist: {}",
                    cwd.display()
                )));
            }
        }

        Ok(())
    }

    fn validate_url(field: &str, url: &str) -> Result<()> {
        let parsed = reqwest::Url::parse(url).map_err(|e| {
            ReboundError::ConfigValidationError(format!("Invalid {} '{}': {}", field, url, e))
        })?;

        match parsed.scheme() {
            "http" | "https" => Ok(()),
            other => Err(ReboundError::ConfigValidationError(format!(
                "Unsupported scheme '{}' in {}",
                other, field
            ))),
        }
    }

    /// Expand environment variables in command, arguments, paths and URLs
    fn expand_env_vars(&mut self) {
        self.health_url = expand_env_in_string(&self.health_url);
        self.status_url = self.status_url.as_deref().map(expand_env_in_string);

        self.target.command = expand_env_in_string(&self.target.command);
        self.target.args = self
            .target
            .args
            .iter()
            .map(|arg| expand_env_in_string(arg))
            .collect();

        if let Some(ref cwd) = self.target.cwd {
            self.target.cwd = Some(expand_env_in_path(cwd));
        }

        self.target.env = self
            .target
            .env
            .iter()
            .map(|(k, v)| (k.clone(), expand_env_in_string(v)))
            .collect();

        if let Some(ref file) = self.logging.file {
            self.logging.file = Some(expand_env_in_path(file));
        }
        if let Some(ref file) = self.state_file {
            self.state_file = Some(expand_env_in_path(file));
        }
    }

    pub fn check_interval(&self) -> Duration {
        Duration::from_millis(self.check_interval_ms)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn stabilization_delay(&self) -> Duration {
        Duration::from_millis(self.stabilization_delay_ms)
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }

    /// Commented template written by `rebound init-config`
    pub fn template() -> &'static str {
        r#"# Rebound supervisor configuration

# Endpoint probed every cycle; anything but HTTP 200 counts as unhealthy
health_url = "http://127.0.0.1:5000/health"
# Optional JSON status endpoint (informational only)
# status_url = "http://127.0.0.1:5000/status"

check_interval_ms = 3000
probe_timeout_ms = 2000
memory_threshold_mb = 100
settle_delay_ms = 2000
stabilization_delay_ms = 3000
stop_timeout_ms = 3000
failure_threshold = 1
# state_file = "rebound-status.json"

[target]
command = "python3"
args = ["breakable_app.py"]
# cwd = "/srv/app"
# env = { PORT = "5000" }

[start_retry]
attempts = 3
delay_ms = 2000
backoff = "fixed"
max_delay_ms = 30000

[logging]
level = "info"
file = "healer.log"
json = false
"#
    }
}

/// Expand `$VAR` and `${VAR}` references in a string
fn expand_env_in_string(s: &str) -> String {
    if !s.contains('$') {
        return s.to_string();
    }

    let mut vars: Vec<(String, String)> = std::env::vars().collect();
    // Longest names first so `$HOME` does not clobber `$HOMEDIR`
    vars.sort_by(|a, b| b.0.len().cmp(&a.0.len()));

    let mut result = s.to_string();
    for (key, value) in vars {
        result = result.replace(&format!("${{{}}}", key), &value);
        result = result.replace(&format!("${}", key), &value);
    }

    result
}

fn expand_env_in_path(path: &Path) -> PathBuf {
    PathBuf::from(expand_env_in_string(&path.to_string_lossy()))
}
