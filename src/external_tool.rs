//! External tool runner
//!
//! Collectors that wrap an external analyzer (linter, test runner) follow a
//! common pattern:
//! 1. Run the tool as a subprocess with `std::process::Command`
//! 2. Bound the wait with a timeout, killing the child's process group on expiry
//! 3. Hand stdout/stderr back for the collector to parse
//!
//! Output pipes are drained on reader threads so a chatty tool cannot fill
//! the pipe buffer and stall while we wait for it to exit. Collecting their
//! output shares the same deadline as the wait itself.

use crate::errors::{GateError, GateResult};
use crate::scanner::ProtectedPaths;
use crossbeam_channel::Sender;
use serde_json::Value as JsonValue;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Result from running an external tool
#[derive(Debug, Clone)]
pub struct ExternalToolResult {
    /// Whether the tool ran to completion (it may still report problems)
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
    pub return_code: Option<i32>,
    pub timed_out: bool,
    /// The program could not be found
    pub not_found: bool,
    pub error: Option<String>,
}

impl ExternalToolResult {
    pub fn success(stdout: String, stderr: String, return_code: i32) -> Self {
        Self {
            success: true,
            stdout,
            stderr,
            return_code: Some(return_code),
            timed_out: false,
            not_found: false,
            error: None,
        }
    }

    pub fn failure(error: String) -> Self {
        Self {
            success: false,
            stdout: String::new(),
            stderr: String::new(),
            return_code: None,
            timed_out: false,
            not_found: false,
            error: Some(error),
        }
    }

    pub fn not_found(tool_name: &str) -> Self {
        Self {
            not_found: true,
            ..Self::failure(format!("{} not found", tool_name))
        }
    }

    pub fn timeout(tool_name: &str, timeout_secs: u64) -> Self {
        Self {
            timed_out: true,
            ..Self::failure(format!("{} timed out after {}s", tool_name, timeout_secs))
        }
    }

    /// Parse stdout as JSON
    pub fn json_output(&self) -> Option<JsonValue> {
        let trimmed = self.stdout.trim();
        if trimmed.is_empty() {
            return None;
        }
        serde_json::from_str(trimmed).ok()
    }

    /// Map an incomplete run onto the gate's error taxonomy
    pub fn into_gate_result(self, tool_name: &str, timeout_secs: u64) -> GateResult<Self> {
        if self.not_found {
            return Err(GateError::ToolUnavailable {
                tool: tool_name.to_string(),
            });
        }
        if self.timed_out {
            return Err(GateError::ToolTimeout {
                tool: tool_name.to_string(),
                timeout_secs,
            });
        }
        if !self.success {
            return Err(GateError::ToolFailed {
                tool: tool_name.to_string(),
                code: self.return_code,
                stderr: self.error.unwrap_or_default(),
            });
        }
        Ok(self)
    }
}

/// Run an external tool with a bounded wait.
///
/// # Arguments
/// * `cmd` - Command and arguments to run
/// * `tool_name` - Human-readable tool name for error messages
/// * `timeout_secs` - Timeout in seconds (0 = no timeout)
/// * `cwd` - Working directory; refused if it lies in a protected directory
pub fn run_external_tool(
    cmd: &[String],
    tool_name: &str,
    timeout_secs: u64,
    cwd: &Path,
    root: &Path,
    protected: &ProtectedPaths,
) -> GateResult<ExternalToolResult> {
    protected.guard(root, cwd)?;

    let Some((program, args)) = cmd.split_first() else {
        return Ok(ExternalToolResult::not_found(tool_name));
    };

    debug!("Running {}: {} {:?}", tool_name, program, args);

    let mut command = Command::new(program);
    command
        .args(args)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    isolate(&mut command);

    let mut child = match command.spawn() {
        Ok(child) => child,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!("{} not found on PATH", program);
            return Ok(ExternalToolResult::not_found(tool_name));
        }
        Err(e) => {
            return Ok(ExternalToolResult::failure(format!(
                "Failed to run {}: {}",
                tool_name, e
            )));
        }
    };

    let (tx, rx) = crossbeam_channel::bounded(2);
    spawn_reader(Stream::Stdout, child.stdout.take(), tx.clone());
    spawn_reader(Stream::Stderr, child.stderr.take(), tx);

    let start = Instant::now();
    let deadline = (timeout_secs > 0).then(|| start + Duration::from_secs(timeout_secs));

    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) => {
                if deadline.is_some_and(|d| Instant::now() >= d) {
                    kill_tree(&mut child);
                    warn!("{} timed out after {}s", tool_name, timeout_secs);
                    return Ok(ExternalToolResult::timeout(tool_name, timeout_secs));
                }
                thread::sleep(Duration::from_millis(50));
            }
            Err(e) => {
                kill_tree(&mut child);
                return Ok(ExternalToolResult::failure(format!(
                    "Failed to wait for {}: {}",
                    tool_name, e
                )));
            }
        }
    };

    // A background process started by the tool inherits the pipes and keeps
    // them open after the tool itself exits.
    let mut stdout = None;
    let mut stderr = None;
    while stdout.is_none() || stderr.is_none() {
        let received = match deadline {
            Some(d) => rx.recv_timeout(d.saturating_duration_since(Instant::now())).ok(),
            None => rx.recv().ok(),
        };
        match received {
            Some((Stream::Stdout, text)) => stdout = Some(text),
            Some((Stream::Stderr, text)) => stderr = Some(text),
            None => {
                kill_tree(&mut child);
                warn!(
                    "{} left output pipes open past the {}s timeout",
                    tool_name, timeout_secs
                );
                return Ok(ExternalToolResult::timeout(tool_name, timeout_secs));
            }
        }
    }

    Ok(ExternalToolResult::success(
        stdout.unwrap_or_default(),
        stderr.unwrap_or_default(),
        status.code().unwrap_or(-1),
    ))
}

#[derive(Debug, Clone, Copy)]
enum Stream {
    Stdout,
    Stderr,
}

fn spawn_reader<R>(kind: Stream, stream: Option<R>, tx: Sender<(Stream, String)>)
where
    R: Read + Send + 'static,
{
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut s) = stream {
            let _ = s.read_to_end(&mut buf);
        }
        let _ = tx.send((kind, String::from_utf8_lossy(&buf).into_owned()));
    });
}

/// Put the tool in its own process group so the whole tree can be killed
#[cfg(unix)]
fn isolate(command: &mut Command) {
    use std::os::unix::process::CommandExt;
    command.process_group(0);
}

#[cfg(not(unix))]
fn isolate(_command: &mut Command) {}

/// Kill the tool and anything it left running in its process group
fn kill_tree(child: &mut Child) {
    #[cfg(unix)]
    {
        let group = format!("-{}", child.id());
        let _ = Command::new("kill")
            .args(["-KILL", "--", group.as_str()])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();
    }
    let _ = child.kill();
    let _ = child.wait();
}

/// Locate a program on PATH (or verify an explicit path)
pub fn find_program(program: &str) -> Option<PathBuf> {
    let candidate = Path::new(program);
    if candidate.components().count() > 1 {
        return candidate.is_file().then(|| candidate.to_path_buf());
    }

    let path_var = std::env::var_os("PATH")?;
    for dir in std::env::split_paths(&path_var) {
        let full = dir.join(program);
        if full.is_file() {
            return Some(full);
        }
        if cfg!(windows) {
            let exe = dir.join(format!("{}.exe", program));
            if exe.is_file() {
                return Some(exe);
            }
        }
    }
    None
}

/// Check if the first word of a command resolves to an executable
pub fn is_tool_installed(cmd: &[String]) -> bool {
    cmd.first().and_then(|p| find_program(p)).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unprotected() -> ProtectedPaths {
        ProtectedPaths::new(&[".github/workflows".to_string()])
    }

    #[test]
    fn test_external_tool_result() {
        let result = ExternalToolResult::success("output".into(), "".into(), 0);
        assert!(result.success);
        assert_eq!(result.stdout, "output");

        let result = ExternalToolResult::failure("error".into());
        assert!(!result.success);
        assert_eq!(result.error, Some("error".into()));

        let result = ExternalToolResult::timeout("test", 60);
        assert!(result.timed_out);
        assert!(!result.success);
    }

    #[test]
    fn test_json_parsing() {
        let result = ExternalToolResult::success(" [1, 2, 3]\n".into(), "".into(), 0);
        let arr = result.json_output().unwrap();
        assert_eq!(arr.as_array().unwrap().len(), 3);

        let result = ExternalToolResult::success("".into(), "".into(), 0);
        assert!(result.json_output().is_none());
    }

    #[test]
    fn test_missing_program_maps_to_tool_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let cmd = vec!["fitness-gate-no-such-tool-4b1d".to_string()];
        let result =
            run_external_tool(&cmd, "ghost", 5, dir.path(), dir.path(), &unprotected()).unwrap();
        assert!(result.not_found);
        let err = result.into_gate_result("ghost", 5).unwrap_err();
        assert!(matches!(err, GateError::ToolUnavailable { .. }));
    }

    #[test]
    fn test_empty_command_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let result =
            run_external_tool(&[], "lint", 5, dir.path(), dir.path(), &unprotected()).unwrap();
        assert!(result.not_found);
    }

    #[test]
    fn test_refuses_protected_cwd() {
        let dir = tempfile::tempdir().unwrap();
        let cwd = dir.path().join(".github/workflows");
        std::fs::create_dir_all(&cwd).unwrap();
        let cmd = vec!["echo".to_string()];
        let err = run_external_tool(&cmd, "echo", 5, &cwd, dir.path(), &unprotected()).unwrap_err();
        assert!(matches!(err, GateError::ProtectedPath(_)));
    }

    #[cfg(unix)]
    #[test]
    fn test_captures_output() {
        let dir = tempfile::tempdir().unwrap();
        let cmd = vec!["sh".to_string(), "-c".to_string(), "echo hello; echo oops >&2; exit 3".to_string()];
        let result =
            run_external_tool(&cmd, "sh", 10, dir.path(), dir.path(), &unprotected()).unwrap();
        assert!(result.success);
        assert_eq!(result.stdout.trim(), "hello");
        assert_eq!(result.stderr.trim(), "oops");
        assert_eq!(result.return_code, Some(3));
    }

    #[cfg(unix)]
    #[test]
    fn test_timeout_kills_child() {
        let dir = tempfile::tempdir().unwrap();
        let cmd = vec!["sleep".to_string(), "5".to_string()];
        let start = Instant::now();
        let result =
            run_external_tool(&cmd, "sleep", 1, dir.path(), dir.path(), &unprotected()).unwrap();
        assert!(result.timed_out);
        assert!(start.elapsed() < Duration::from_secs(4));
        let err = result.into_gate_result("sleep", 1).unwrap_err();
        assert!(matches!(err, GateError::ToolTimeout { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn test_background_process_cannot_outlive_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let cmd = vec![
            "sh".to_string(),
            "-c".to_string(),
            "sleep 20 & echo 3".to_string(),
        ];
        let start = Instant::now();
        let result =
            run_external_tool(&cmd, "lint", 2, dir.path(), dir.path(), &unprotected()).unwrap();
        assert!(result.timed_out);
        assert!(start.elapsed() < Duration::from_secs(10));
        let err = result.into_gate_result("lint", 2).unwrap_err();
        assert!(matches!(err, GateError::ToolTimeout { .. }));
    }
}
