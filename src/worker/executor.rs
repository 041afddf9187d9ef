//! Payload execution backends.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::error::ExecutionError;

/// Maximum output kept in an error message.
const MAX_ERROR_OUTPUT: usize = 2 * 1024;

/// Runs one opaque payload. The agent never looks inside a payload.
#[async_trait]
pub trait PayloadExecutor: Send + Sync {
    async fn execute(&self, payload: &str) -> Result<(), ExecutionError>;
}

/// Runs each payload as a shell command line.
#[derive(Debug, Clone)]
pub struct ShellExecutor {
    /// Working directory for commands (if None, uses cwd).
    working_dir: Option<PathBuf>,
    timeout: Duration,
}

impl ShellExecutor {
    pub fn new(timeout: Duration) -> Self {
        Self {
            working_dir: None,
            timeout,
        }
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    fn command(payload: &str) -> Command {
        if cfg!(target_os = "windows") {
            let mut c = Command::new("cmd");
            c.args(["/C", payload]);
            c
        } else {
            let mut c = Command::new("sh");
            c.args(["-c", payload]);
            c
        }
    }
}

#[async_trait]
impl PayloadExecutor for ShellExecutor {
    async fn execute(&self, payload: &str) -> Result<(), ExecutionError> {
        let mut command = Self::command(payload);
        if let Some(dir) = &self.working_dir {
            command.current_dir(dir);
        }
        command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = command
            .spawn()
            .map_err(|e| ExecutionError::Spawn(e.to_string()))?;

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| ExecutionError::Timeout(self.timeout))??;

        let stdout = String::from_utf8_lossy(&output.stdout);
        if !stdout.trim().is_empty() {
            debug!(output = %truncate(stdout.trim()), "Payload output");
        }

        if output.status.success() {
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        let detail = if stderr.trim().is_empty() {
            stdout.trim().to_string()
        } else {
            stderr.trim().to_string()
        };
        Err(ExecutionError::NonZeroExit {
            code: output.status.code().unwrap_or(-1),
            output: truncate(&detail),
        })
    }
}

fn truncate(s: &str) -> String {
    if s.len() <= MAX_ERROR_OUTPUT {
        return s.to_string();
    }
    let mut end = MAX_ERROR_OUTPUT;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}... (truncated)", &s[..end])
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn shell() -> ShellExecutor {
        ShellExecutor::new(Duration::from_secs(5))
    }

    #[tokio::test]
    async fn successful_command() {
        assert!(shell().execute("echo hello").await.is_ok());
    }

    #[tokio::test]
    async fn non_zero_exit_reports_stderr() {
        let err = shell()
            .execute("echo broken >&2; exit 3")
            .await
            .unwrap_err();
        match err {
            ExecutionError::NonZeroExit { code, output } => {
                assert_eq!(code, 3);
                assert_eq!(output, "broken");
            }
            other => panic!("expected NonZeroExit, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn command_timeout() {
        let executor = ShellExecutor::new(Duration::from_millis(100));
        let result = executor.execute("sleep 10").await;
        assert!(matches!(result, Err(ExecutionError::Timeout(_))));
    }

    #[tokio::test]
    async fn runs_in_working_dir() {
        let dir = tempfile::tempdir().unwrap();
        let executor = shell().with_working_dir(dir.path());
        executor.execute("touch marker").await.unwrap();
        assert!(dir.path().join("marker").exists());
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        let long = "é".repeat(MAX_ERROR_OUTPUT);
        let out = truncate(&long);
        assert!(out.ends_with("... (truncated)"));
        assert!(out.len() < long.len());
        assert_eq!(truncate("short"), "short");
    }
}
