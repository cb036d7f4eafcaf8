//! Child-process helpers for external device tools.
//!
//! Every child is spawned with `kill_on_drop(true)`: a child is terminated as
//! soon as the future or guard owning it is dropped, including when a capture
//! worker is aborted or a command times out.

use std::ffi::OsStr;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::{Child, Command};
use tracing::debug;

use crate::application::device::DeviceError;

/// Builds a command with null stdin, piped stdout/stderr and kill-on-drop.
pub fn command<I, S>(program: &str, args: I) -> Command
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let mut cmd = Command::new(program);
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    cmd
}

/// Spawns `cmd`, mapping failure to [`DeviceError::Spawn`].
pub fn spawn(program: &str, cmd: &mut Command) -> Result<Child, DeviceError> {
    cmd.spawn().map_err(|source| DeviceError::Spawn {
        program: program.to_string(),
        source,
    })
}

/// Runs a one-shot command to completion and returns its stdout.
///
/// # Errors
///
/// - [`DeviceError::Spawn`] if the program cannot be started.
/// - [`DeviceError::Timeout`] if it runs longer than `timeout`.  The child is
///   killed.
/// - [`DeviceError::Exit`] on a non-zero exit status.
pub async fn run_with_timeout<I, S>(
    program: &str,
    args: I,
    timeout: Duration,
) -> Result<Vec<u8>, DeviceError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let child = spawn(program, &mut command(program, args))?;

    // Dropping the `wait_with_output` future on timeout drops the child, which
    // kills it.
    let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(result) => result.map_err(|source| DeviceError::Io {
            program: program.to_string(),
            source,
        })?,
        Err(_) => {
            return Err(DeviceError::Timeout {
                program: program.to_string(),
                timeout,
            })
        }
    };

    if !output.status.success() {
        return Err(DeviceError::Exit {
            program: program.to_string(),
            status: output.status.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    debug!("{program} finished ({} bytes of output)", output.stdout.len());
    Ok(output.stdout)
}

/// Like [`run_with_timeout`], returning stdout and stderr as one lossy string.
pub async fn run_text<I, S>(program: &str, args: I, timeout: Duration) -> Result<String, DeviceError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let stdout = run_with_timeout(program, args, timeout).await?;
    Ok(String::from_utf8_lossy(&stdout).into_owned())
}

/// Splits a configured command line into program and arguments.
pub fn split_command(parts: &[String]) -> Option<(&str, &[String])> {
    parts.split_first().map(|(program, args)| (program.as_str(), args))
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_successful_command_returns_stdout() {
        let out = run_with_timeout("echo", ["hello"], Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(out, b"hello\n");
    }

    #[tokio::test]
    async fn test_non_zero_exit_is_reported_with_stderr() {
        // Arrange / Act
        let result = run_with_timeout(
            "sh",
            ["-c", "echo broken >&2; exit 3"],
            Duration::from_secs(5),
        )
        .await;

        // Assert
        match result {
            Err(DeviceError::Exit { status, stderr, .. }) => {
                assert!(status.contains('3'));
                assert_eq!(stderr, "broken");
            }
            other => panic!("expected Exit, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_slow_command_times_out() {
        let result = run_with_timeout("sleep", ["5"], Duration::from_millis(50)).await;
        assert!(matches!(result, Err(DeviceError::Timeout { .. })));
    }

    #[tokio::test]
    async fn test_missing_program_is_a_spawn_error() {
        let result = run_with_timeout(
            "definitely-not-a-real-tool-6d1c",
            Vec::<String>::new(),
            Duration::from_secs(1),
        )
        .await;
        assert!(matches!(result, Err(DeviceError::Spawn { .. })));
    }

    #[test]
    fn test_split_command() {
        let parts = vec!["tool".to_string(), "a".to_string(), "b".to_string()];
        let (program, args) = split_command(&parts).unwrap();
        assert_eq!(program, "tool");
        assert_eq!(args, ["a", "b"]);
        assert!(split_command(&[]).is_none());
    }
}
