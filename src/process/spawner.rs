use crate::config::TargetCommand;
use crate::error::{ReboundError, Result};
use crate::process::handle::ProcessHandle;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;

/// Launch the target described by `target`
///
/// Returns as soon as the OS has created the process; readiness of the
/// service itself is not awaited. The target inherits stdout and stderr.
pub fn spawn_target(target: &TargetCommand) -> Result<ProcessHandle> {
    // Paths are checked up front for a clearer error; bare names go through PATH
    if target.command.contains('/') && !Path::new(&target.command).exists() {
        return Err(ReboundError::SpawnError(format!(
            "Command does not exist: {}",
            target.command
        )));
    }

    let mut command = Command::new(&target.command);

    if !target.args.is_empty() {
        command.args(&target.args);
    }

    if let Some(ref cwd) = target.cwd {
        command.current_dir(cwd);
    }

    for (key, value) in &target.env {
        command.env(key, value);
    }

    command
        .stdin(Stdio::null())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .kill_on_drop(true);

    let child = command.spawn().map_err(|e| {
        ReboundError::SpawnError(format!("Failed to spawn '{}': {}", target.display(), e))
    })?;

    let pid = child.id().ok_or_else(|| {
        ReboundError::SpawnError(format!("Failed to get PID for '{}'", target.display()))
    })?;

    Ok(ProcessHandle::new(pid, child))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_spawn_simple_process() {
        let target = TargetCommand::new("/bin/sleep").with_args(["5"]);

        let mut handle = spawn_target(&target).unwrap();
        assert!(handle.pid() > 0);

        let _ = handle.child.kill().await;
    }

    #[tokio::test]
    async fn test_spawn_through_path_lookup() {
        let target = TargetCommand::new("true");

        let mut handle = spawn_target(&target).unwrap();
        let status = handle.child.wait().await.unwrap();
        assert!(status.success());
    }

    #[tokio::test]
    async fn test_spawn_with_env_and_cwd() {
        let temp_dir = TempDir::new().unwrap();
        let mut target = TargetCommand::new("/bin/sh").with_args(["-c", "test \"$REBOUND_VAR\" = ok"]);
        target.cwd = Some(temp_dir.path().to_path_buf());
        target
            .env
            .insert("REBOUND_VAR".to_string(), "ok".to_string());

        let mut handle = spawn_target(&target).unwrap();
        let status = handle.child.wait().await.unwrap();
        assert!(status.success());
    }

    #[tokio::test]
    async fn test_spawn_nonexistent_command() {
        let target = TargetCommand::new("/nonexistent/binary");

        match spawn_target(&target) {
            Err(ReboundError::SpawnError(msg)) => assert!(msg.contains("does not exist")),
            other => panic!("Expected SpawnError, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_spawn_invalid_working_directory() {
        let mut target = TargetCommand::new("/bin/echo");
        target.cwd = Some(PathBuf::from("/nonexistent/directory"));

        assert!(matches!(
            spawn_target(&target),
            Err(ReboundError::SpawnError(_))
        ));
    }
}
