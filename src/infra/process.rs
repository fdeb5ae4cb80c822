//! External process execution
//!
//! Every collaborator the pipeline drives (pip, the test runner, git) is an
//! external program. This module spawns them one at a time, captures their
//! output and turns a non-zero exit into a [`ProcessError`].

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use thiserror::Error;
use tokio::process::Command;

use crate::config::defaults::STDERR_TAIL_LINES;

/// Process execution errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProcessError {
    /// The program could not be started at all
    #[error("Failed to run '{program}': {error}")]
    Spawn { program: String, error: String },

    /// The program ran and exited unsuccessfully
    #[error("'{command}' exited with {}{}", exit_label(.exit_code), stderr_suffix(.stderr))]
    Failed {
        command: String,
        exit_code: Option<i32>,
        stderr: String,
    },
}

impl ProcessError {
    /// Exit code of a failed program, `None` for spawn errors or signals
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            Self::Spawn { .. } => None,
            Self::Failed { exit_code, .. } => *exit_code,
        }
    }

    /// Captured stderr tail of a failed program
    pub fn stderr(&self) -> &str {
        match self {
            Self::Spawn { .. } => "",
            Self::Failed { stderr, .. } => stderr,
        }
    }
}

fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("status {code}"),
        None => "a signal".to_string(),
    }
}

fn stderr_suffix(stderr: &str) -> String {
    if stderr.trim().is_empty() {
        String::new()
    } else {
        format!(":\n{}", stderr.trim_end())
    }
}

/// Captured output of a finished program
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    /// Exit code (`None` when killed by a signal)
    pub exit_code: Option<i32>,
    /// Standard output, lossily decoded
    pub stdout: String,
    /// Standard error, lossily decoded
    pub stderr: String,
}

impl CommandOutput {
    /// Whether the program exited with status 0
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// A program invocation rooted in a working directory
#[derive(Debug, Clone)]
pub struct ProcessCommand {
    program: PathBuf,
    args: Vec<OsString>,
    cwd: Option<PathBuf>,
    env_remove: Vec<String>,
}

impl ProcessCommand {
    /// Create an invocation of `program`
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            env_remove: Vec::new(),
        }
    }

    /// Append one argument
    #[must_use]
    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Run in `dir` instead of the current directory
    #[must_use]
    pub fn current_dir(mut self, dir: &Path) -> Self {
        self.cwd = Some(dir.to_path_buf());
        self
    }

    /// Do not pass `key` through from the parent environment
    #[must_use]
    pub fn env_remove(mut self, key: &str) -> Self {
        self.env_remove.push(key.to_string());
        self
    }

    /// Human-readable command line, used in logs and errors
    pub fn display(&self) -> String {
        let mut line = self.program.display().to_string();
        for arg in &self.args {
            line.push(' ');
            line.push_str(&arg.to_string_lossy());
        }
        line
    }

    /// Run to completion and capture output, whatever the exit status
    pub async fn output(&self) -> Result<CommandOutput, ProcessError> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.cwd {
            cmd.current_dir(dir);
        }
        for key in &self.env_remove {
            cmd.env_remove(key);
        }

        tracing::debug!("Running: {}", self.display());

        let output = cmd.output().await.map_err(|e| ProcessError::Spawn {
            program: self.program.display().to_string(),
            error: e.to_string(),
        })?;

        let result = CommandOutput {
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };

        tracing::debug!(
            "Finished: {} (exit {:?}, {} bytes stdout, {} bytes stderr)",
            self.display(),
            result.exit_code,
            result.stdout.len(),
            result.stderr.len()
        );

        Ok(result)
    }

    /// Run to completion; a non-zero exit becomes [`ProcessError::Failed`]
    pub async fn run(&self) -> Result<CommandOutput, ProcessError> {
        let output = self.output().await?;
        if output.success() {
            Ok(output)
        } else {
            Err(self.failure(&output))
        }
    }

    /// Build the error describing an unsuccessful `output` of this command
    pub fn failure(&self, output: &CommandOutput) -> ProcessError {
        ProcessError::Failed {
            command: self.display(),
            exit_code: output.exit_code,
            stderr: tail_lines(&output.stderr, STDERR_TAIL_LINES),
        }
    }
}

/// Keep the last `n` lines of `text`
pub fn tail_lines(text: &str, n: usize) -> String {
    let lines: Vec<&str> = text.lines().collect();
    let start = lines.len().saturating_sub(n);
    lines[start..].join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_joins_program_and_args() {
        let cmd = ProcessCommand::new("python3")
            .args(["-m", "pip"])
            .arg("freeze");
        assert_eq!(cmd.display(), "python3 -m pip freeze");
    }

    #[test]
    fn test_tail_lines() {
        assert_eq!(tail_lines("a\nb\nc\nd", 2), "c\nd");
        assert_eq!(tail_lines("a\nb", 5), "a\nb");
        assert_eq!(tail_lines("", 3), "");
    }

    #[test]
    fn test_failed_error_message() {
        let err = ProcessError::Failed {
            command: "pip install x".to_string(),
            exit_code: Some(1),
            stderr: "ERROR: No matching distribution found for x\n".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.starts_with("'pip install x' exited with status 1:"), "{msg}");
        assert!(msg.contains("No matching distribution"));
        assert_eq!(err.exit_code(), Some(1));
    }

    #[test]
    fn test_failed_error_without_stderr() {
        let err = ProcessError::Failed {
            command: "pytest".to_string(),
            exit_code: Some(5),
            stderr: String::new(),
        };
        assert_eq!(err.to_string(), "'pytest' exited with status 5");
    }

    #[tokio::test]
    async fn test_spawn_missing_program() {
        let result = ProcessCommand::new("cdu-definitely-not-a-real-program")
            .output()
            .await;
        match result {
            Err(ProcessError::Spawn { program, .. }) => {
                assert_eq!(program, "cdu-definitely-not-a-real-program");
            }
            other => panic!("Expected Spawn error, got: {other:?}"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_captures_stdout() {
        let output = ProcessCommand::new("sh")
            .args(["-c", "echo hello"])
            .run()
            .await
            .unwrap();
        assert!(output.success());
        assert_eq!(output.stdout.trim(), "hello");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_non_zero_exit_is_error() {
        let err = ProcessCommand::new("sh")
            .args(["-c", "echo boom >&2; exit 3"])
            .run()
            .await
            .unwrap_err();
        assert_eq!(err.exit_code(), Some(3));
        assert_eq!(err.stderr(), "boom");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_current_dir_is_respected() {
        let temp = tempfile::TempDir::new().unwrap();
        let output = ProcessCommand::new("sh")
            .args(["-c", "pwd"])
            .current_dir(temp.path())
            .run()
            .await
            .unwrap();
        let reported = std::fs::canonicalize(output.stdout.trim()).unwrap();
        assert_eq!(reported, std::fs::canonicalize(temp.path()).unwrap());
    }
}
