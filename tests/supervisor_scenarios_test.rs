// End-to-end supervisor scenarios against real processes and a mock health endpoint

use rebound::config::{SupervisorConfig, TargetCommand};
use rebound::error::ReboundError;
use rebound::process::{ResourceInspector, StopOutcome};
use rebound::state::{Phase, SnapshotStore};
use rebound::supervisor::{Supervisor, Verdict};
use std::io;
use std::net::{SocketAddr, TcpListener};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::watch;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn mount_health(server: &MockServer, status: u16) {
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(status))
        .mount(server)
        .await;
}

async fn healthy_server() -> MockServer {
    let server = MockServer::start().await;
    mount_health(&server, 200).await;
    server
}

/// In-memory sink for formatted log lines
#[derive(Clone, Default)]
struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl CapturedLogs {
    fn count_lines(&self, needle: &str) -> usize {
        let buffer = self.0.lock().unwrap();
        String::from_utf8_lossy(&buffer)
            .lines()
            .filter(|line| line.contains(needle))
            .count()
    }
}

impl io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn create_test_config(health_url: String, target: TargetCommand) -> SupervisorConfig {
    let mut config = SupervisorConfig::new(health_url, target);
    config.check_interval_ms = 50;
    config.probe_timeout_ms = 500;
    config.settle_delay_ms = 50;
    config.stabilization_delay_ms = 50;
    config.stop_timeout_ms = 1_000;
    config.start_retry.attempts = 1;
    config
}

fn sleeper() -> TargetCommand {
    TargetCommand::new("/bin/sleep").with_args(["30"])
}

fn unused_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap()
}

#[tokio::test]
async fn test_healthy_target_is_never_restarted() {
    let server = healthy_server().await;
    let config = create_test_config(format!("{}/health", server.uri()), sleeper());
    let mut supervisor = Supervisor::new(config).unwrap();

    supervisor.launch().await.unwrap();
    let pid = supervisor.current_pid().unwrap();

    let first = supervisor.run_cycle().await.unwrap();
    assert_eq!(first.verdict, Verdict::Up);

    for _ in 0..4 {
        let report = supervisor.run_cycle().await.unwrap();
        assert_eq!(report.verdict, Verdict::Healthy);
    }

    assert_eq!(supervisor.current_pid(), Some(pid));
    assert_eq!(supervisor.state().restarts, 0);
    assert_eq!(supervisor.state().cycles, 5);
    assert_eq!(supervisor.state().phase, Phase::Healthy);

    supervisor.shutdown().await;
}

#[tokio::test]
async fn test_refused_endpoint_restarts_then_heals() {
    let logs = CapturedLogs::default();
    let writer = logs.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(move || writer.clone())
        .with_ansi(false)
        .with_max_level(tracing::Level::DEBUG)
        .finish();
    let _log_guard = tracing::subscriber::set_default(subscriber);

    let addr = unused_addr();
    let config = create_test_config(format!("http://{}/health", addr), sleeper());
    let mut supervisor = Supervisor::new(config).unwrap();

    supervisor.launch().await.unwrap();
    let first_pid = supervisor.current_pid().unwrap();

    let report = supervisor.run_cycle().await.unwrap();
    assert_eq!(report.health.detail, "connection refused");
    match report.verdict {
        Verdict::Restarted { reason, old_pid, new_pid } => {
            assert_eq!(reason, "connection refused");
            assert_eq!(old_pid, Some(first_pid));
            assert_ne!(new_pid, first_pid);
        }
        other => panic!("Expected restart, got {:?}", other),
    }

    let mut inspector = ResourceInspector::new();
    assert!(!inspector.is_process_alive(first_pid));

    // The endpoint comes back on the same address
    let server = MockServer::builder()
        .listener(TcpListener::bind(addr).unwrap())
        .start()
        .await;
    mount_health(&server, 200).await;

    let report = supervisor.run_cycle().await.unwrap();
    assert_eq!(report.verdict, Verdict::Healed);
    assert!(supervisor.state().last_healed.is_some());

    let report = supervisor.run_cycle().await.unwrap();
    assert_eq!(report.verdict, Verdict::Healthy);
    assert_eq!(supervisor.state().restarts, 1);

    supervisor.shutdown().await;

    // Log watchers match on these messages
    assert_eq!(logs.count_lines("HEALER ACTIVATED: connection refused"), 1);
    assert_eq!(logs.count_lines("HEALED: target healthy again"), 1);
    assert_eq!(logs.count_lines("HEALED:"), 1);
}

#[tokio::test]
async fn test_error_status_triggers_restart() {
    let server = MockServer::start().await;
    mount_health(&server, 503).await;

    let config = create_test_config(format!("{}/health", server.uri()), sleeper());
    let mut supervisor = Supervisor::new(config).unwrap();
    supervisor.launch().await.unwrap();

    let report = supervisor.run_cycle().await.unwrap();
    match report.verdict {
        Verdict::Restarted { reason, .. } => assert!(reason.contains("503")),
        other => panic!("Expected restart, got {:?}", other),
    }
    assert_eq!(supervisor.state().phase, Phase::Restarting);

    supervisor.shutdown().await;
}

#[tokio::test]
async fn test_memory_over_limit_triggers_restart() {
    let server = healthy_server().await;
    let target = TargetCommand::new("/bin/sh").with_args([
        "-c",
        "x=$(head -c 20000000 /dev/zero | tr '\\0' a); sleep 30",
    ]);
    let mut config = create_test_config(format!("{}/health", server.uri()), target);
    config.memory_threshold_mb = 5;
    let mut supervisor = Supervisor::new(config).unwrap();

    supervisor.launch().await.unwrap();
    let pid = supervisor.current_pid().unwrap();

    // Wait for the shell to finish building its buffer
    let mut inspector = ResourceInspector::new();
    for _ in 0..50 {
        if !inspector.check(pid, 5).healthy {
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    let report = supervisor.run_cycle().await.unwrap();
    assert!(report.health.healthy);
    assert!(!report.resource.healthy);
    match report.verdict {
        Verdict::Restarted { reason, .. } => assert!(reason.contains("exceeds limit")),
        other => panic!("Expected restart, got {:?}", other),
    }

    supervisor.shutdown().await;
}

#[tokio::test]
async fn test_killed_target_restarts_in_same_cycle() {
    let server = healthy_server().await;
    let config = create_test_config(format!("{}/health", server.uri()), sleeper());
    let mut supervisor = Supervisor::new(config).unwrap();

    supervisor.launch().await.unwrap();
    assert_eq!(supervisor.run_cycle().await.unwrap().verdict, Verdict::Up);

    let pid = supervisor.current_pid().unwrap();
    nix::sys::signal::kill(
        nix::unistd::Pid::from_raw(pid as i32),
        nix::sys::signal::Signal::SIGKILL,
    )
    .unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;

    let report = supervisor.run_cycle().await.unwrap();
    assert!(report.health.healthy);
    assert_eq!(report.resource.detail, "zombie");
    assert!(matches!(report.verdict, Verdict::Restarted { .. }));
    assert_ne!(supervisor.current_pid(), Some(pid));

    assert_eq!(supervisor.run_cycle().await.unwrap().verdict, Verdict::Healed);

    supervisor.shutdown().await;
}

#[tokio::test]
async fn test_failed_relaunch_halts_with_no_target() {
    let addr = unused_addr();
    let temp_dir = TempDir::new().unwrap();
    let script = temp_dir.path().join("target.sh");
    std::fs::write(&script, "#!/bin/sh\nexec sleep 30\n").unwrap();
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
    }

    let target = TargetCommand::new(script.to_str().unwrap());
    let config = create_test_config(format!("http://{}/health", addr), target);
    let mut supervisor = Supervisor::new(config).unwrap();
    supervisor.launch().await.unwrap();

    // The executable disappears before the restart
    std::fs::remove_file(&script).unwrap();

    let result = supervisor.run_cycle().await;
    assert!(matches!(result, Err(ReboundError::LaunchFailed { attempts: 1, .. })));
    assert!(supervisor.current_pid().is_none());
    assert_eq!(supervisor.state().phase, Phase::Stopped);
}

#[tokio::test]
async fn test_run_stops_target_on_shutdown() {
    let server = healthy_server().await;
    let temp_dir = TempDir::new().unwrap();
    let state_file = temp_dir.path().join("status.json");

    let mut config = create_test_config(format!("{}/health", server.uri()), sleeper());
    config.state_file = Some(state_file.clone());
    let supervisor = Supervisor::new(config).unwrap();
    let mut status = supervisor.subscribe();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let running = tokio::spawn(supervisor.run(shutdown_rx));

    let pid = tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            status.changed().await.unwrap();
            let snapshot = status.borrow_and_update().clone();
            if snapshot.state.phase == Phase::Healthy {
                return snapshot.state.pid.unwrap();
            }
        }
    })
    .await
    .unwrap();

    shutdown_tx.send(true).unwrap();
    let summary = tokio::time::timeout(Duration::from_secs(10), running)
        .await
        .unwrap()
        .unwrap()
        .unwrap();

    assert!(summary.cycles >= 1);
    assert_eq!(summary.restarts, 0);
    assert_eq!(summary.final_stop, Some(StopOutcome::Graceful));

    let mut inspector = ResourceInspector::new();
    assert!(!inspector.is_process_alive(pid));

    let saved = SnapshotStore::new(&state_file).load().unwrap();
    assert_eq!(saved.state.phase, Phase::Stopped);
    assert!(saved.state.pid.is_none());
}

#[tokio::test]
async fn test_run_reports_launch_failure() {
    let server = healthy_server().await;
    let mut config = create_test_config(
        format!("{}/health", server.uri()),
        TargetCommand::new("/nonexistent/target"),
    );
    config.start_retry.attempts = 2;
    config.start_retry.delay_ms = 10;

    let supervisor = Supervisor::new(config).unwrap();
    let (_shutdown_tx, shutdown_rx) = watch::channel(false);

    let result = supervisor.run(shutdown_rx).await;
    assert!(matches!(result, Err(ReboundError::LaunchFailed { attempts: 2, .. })));
}
