//! Child process execution for CLI-backed collaborators.

use std::path::Path;
use std::process::{Command, Stdio};

use devbox_common::error::{DevboxError, Result};

/// Captured output of a finished command.
#[derive(Debug, Clone)]
pub struct ExecOutput {
    /// Standard output from the command.
    pub stdout: String,
    /// Standard error from the command.
    pub stderr: String,
    /// Exit code returned by the command, or -1 if killed by a signal.
    pub exit_code: i32,
}

impl ExecOutput {
    /// Whether the command exited with status zero.
    pub const fn succeeded(&self) -> bool {
        self.exit_code == 0
    }

    /// Best diagnostic text for a failed command: stderr if it has any,
    /// otherwise stdout, otherwise the exit code.
    pub fn diagnostic(&self) -> String {
        let stderr = self.stderr.trim();
        if !stderr.is_empty() {
            return stderr.to_string();
        }
        let stdout = self.stdout.trim();
        if !stdout.is_empty() {
            return stdout.to_string();
        }
        format!("exited with status {}", self.exit_code)
    }
}

/// Runs `program` with `args` to completion and captures its output.
///
/// A non-zero exit is not an error here; callers decide what it means.
///
/// # Errors
///
/// Returns [`DevboxError::Io`] if the process cannot be spawned.
pub fn capture(program: &Path, args: &[String]) -> Result<ExecOutput> {
    let output = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .output()
        .map_err(|e| DevboxError::io(program, e))?;

    Ok(ExecOutput {
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        exit_code: output.status.code().unwrap_or(-1),
    })
}

/// Runs `program` with the terminal's stdout and stderr attached.
///
/// Returns the exit code, or -1 if the process was killed by a signal.
///
/// # Errors
///
/// Returns [`DevboxError::Io`] if the process cannot be spawned.
pub fn passthrough(program: &Path, args: &[String]) -> Result<i32> {
    let status = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .status()
        .map_err(|e| DevboxError::io(program, e))?;
    Ok(status.code().unwrap_or(-1))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh(script: &str) -> Vec<String> {
        vec!["-c".into(), script.into()]
    }

    #[test]
    fn captures_both_streams_and_exit_code() {
        let out = capture(Path::new("sh"), &sh("echo out; echo err >&2; exit 3")).expect("spawn");
        assert_eq!(out.stdout, "out\n");
        assert_eq!(out.stderr, "err\n");
        assert_eq!(out.exit_code, 3);
        assert!(!out.succeeded());
    }

    #[test]
    fn diagnostic_prefers_stderr() {
        let out = ExecOutput {
            stdout: "ignored".into(),
            stderr: " Error: no such volume \n".into(),
            exit_code: 125,
        };
        assert_eq!(out.diagnostic(), "Error: no such volume");
    }

    #[test]
    fn diagnostic_falls_back_to_exit_code() {
        let out = ExecOutput {
            stdout: String::new(),
            stderr: "\n".into(),
            exit_code: 2,
        };
        assert_eq!(out.diagnostic(), "exited with status 2");
    }

    #[test]
    fn missing_program_is_an_io_error() {
        let err = capture(Path::new("/nonexistent/devbox-test-binary"), &[]).unwrap_err();
        assert_eq!(err.kind(), devbox_common::error::ErrorKind::Io);
    }

    #[test]
    fn passthrough_reports_exit_code() {
        assert_eq!(passthrough(Path::new("sh"), &sh("exit 0")).expect("spawn"), 0);
        assert_eq!(passthrough(Path::new("sh"), &sh("exit 4")).expect("spawn"), 4);
    }
}
