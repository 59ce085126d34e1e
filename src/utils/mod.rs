// backupcenter/src/utils/mod.rs
use anyhow::Context;
use std::io;
use std::path::PathBuf;
use std::process::Output;
use std::time::Duration;
use tokio::process::Command;

use crate::errors::Result;

/// How much of a subprocess stderr we keep for diagnostics.
pub const STDERR_TAIL_BYTES: usize = 4096;

/// Locates an external tool in the PATH (or verifies an explicit path).
pub fn find_executable(name: &str) -> Result<PathBuf> {
    Ok(which::which(name).context(format!(
        "{name} executable not found in PATH. Please ensure the required tools are installed and in your PATH."
    ))?)
}

/// Runs a subprocess with a wall-clock limit. The child is killed if the
/// limit is exceeded; that surfaces as a `TimedOut` I/O error so callers can
/// fold it into their own failure taxonomy.
pub async fn run_with_timeout(
    mut command: Command,
    timeout: Duration,
) -> std::result::Result<Output, io::Error> {
    command.kill_on_drop(true);
    command.stdout(std::process::Stdio::piped());
    command.stderr(std::process::Stdio::piped());
    let child = command.spawn()?;
    match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(result) => result,
        Err(_) => Err(io::Error::new(
            io::ErrorKind::TimedOut,
            format!("subprocess exceeded {}s wall-clock limit", timeout.as_secs()),
        )),
    }
}

/// Last `STDERR_TAIL_BYTES` of a captured stderr, lossily decoded.
pub fn stderr_tail(output: &Output) -> String {
    let stderr = &output.stderr;
    let start = stderr.len().saturating_sub(STDERR_TAIL_BYTES);
    String::from_utf8_lossy(&stderr[start..]).trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_run_with_timeout_kills_slow_commands() {
        let mut cmd = Command::new("sleep");
        cmd.arg("5");
        let result = run_with_timeout(cmd, Duration::from_millis(100)).await;
        let err = result.expect_err("sleep should exceed the limit");
        assert_eq!(err.kind(), io::ErrorKind::TimedOut);
    }

    #[tokio::test]
    async fn test_stderr_tail_is_bounded() {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg("head -c 10000 /dev/zero | tr '\\0' 'x' >&2; exit 1");
        let output = run_with_timeout(cmd, Duration::from_secs(5))
            .await
            .expect("command should run");
        assert!(!output.status.success());
        let tail = stderr_tail(&output);
        assert_eq!(tail.len(), STDERR_TAIL_BYTES);
    }
}
