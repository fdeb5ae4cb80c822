//! Common test utilities and helpers
//!
//! This module provides shared utilities for integration tests: temporary
//! projects, throwaway git repositories with a bare "remote", and a fake
//! Python interpreter for driving the binary end to end.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

/// Identity used for fixture commits, distinct from the automation identity
pub const DEVELOPER_NAME: &str = "Jordan Developer";
pub const DEVELOPER_EMAIL: &str = "jordan@example.com";

/// Test project context
///
/// Creates a temporary directory for test projects and provides
/// utilities for setting up test scenarios.
pub struct TestProject {
    /// Temporary directory for the test project
    pub dir: TempDir,
}

impl TestProject {
    /// Create a new test project in a temporary directory
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("Failed to create temp directory"),
        }
    }

    /// Get the path to the test project directory
    pub fn path(&self) -> PathBuf {
        self.dir.path().to_path_buf()
    }

    /// Create a file in the test project
    pub fn create_file(&self, name: &str, content: &str) {
        let path = self.dir.path().join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("Failed to create parent directories");
        }
        std::fs::write(path, content).expect("Failed to write file");
    }

    /// Check if a file exists in the test project
    pub fn file_exists(&self, name: &str) -> bool {
        self.dir.path().join(name).exists()
    }

    /// Read a file from the test project
    pub fn read_file(&self, name: &str) -> String {
        std::fs::read_to_string(self.dir.path().join(name)).expect("Failed to read file")
    }
}

impl Default for TestProject {
    fn default() -> Self {
        Self::new()
    }
}

/// Whether the `git` CLI is installed
pub fn git_available() -> bool {
    which::which("git").is_ok()
}

/// Run git in `dir`, panicking on failure, and return trimmed stdout
pub fn git(dir: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .current_dir(dir)
        .args(args)
        .output()
        .expect("Failed to run git");
    assert!(
        output.status.success(),
        "git {args:?} failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

/// A working repository on `main` tracking a bare `origin`
pub struct GitFixture {
    pub root: TempDir,
}

impl GitFixture {
    /// Create the remote and a working copy whose first commit holds `lockfile`
    pub fn new(lockfile: &str) -> Self {
        let root = TempDir::new().expect("Failed to create temp directory");
        let remote = root.path().join("remote.git");
        let work = root.path().join("work");
        std::fs::create_dir_all(&remote).unwrap();
        std::fs::create_dir_all(&work).unwrap();

        git(&remote, &["init", "--bare", "--quiet"]);
        git(&remote, &["symbolic-ref", "HEAD", "refs/heads/main"]);
        git(&work, &["init", "--quiet"]);
        git(&work, &["symbolic-ref", "HEAD", "refs/heads/main"]);
        std::fs::write(work.join("requirements.txt"), lockfile).unwrap();
        git(&work, &["add", "requirements.txt"]);
        developer_commit(&work, "Initial commit");
        git(&work, &["remote", "add", "origin", remote.to_str().unwrap()]);
        git(&work, &["push", "--quiet", "origin", "main"]);

        Self { root }
    }

    /// Working copy
    pub fn work(&self) -> PathBuf {
        self.root.path().join("work")
    }

    /// Bare remote
    pub fn remote(&self) -> PathBuf {
        self.root.path().join("remote.git")
    }

    /// Commit `main` points at on the remote
    pub fn remote_head(&self) -> String {
        git(&self.remote(), &["rev-parse", "main"])
    }

    /// Lockfile content on the remote's `main`
    pub fn remote_lockfile(&self) -> String {
        let output = Command::new("git")
            .current_dir(self.remote())
            .args(["show", "main:requirements.txt"])
            .output()
            .expect("Failed to run git");
        String::from_utf8_lossy(&output.stdout).into_owned()
    }

    /// Local HEAD
    pub fn head(&self) -> String {
        git(&self.work(), &["rev-parse", "HEAD"])
    }

    /// Overwrite the working copy's lockfile
    pub fn write_lockfile(&self, content: &str) {
        std::fs::write(self.work().join("requirements.txt"), content).unwrap();
    }

    /// Read the working copy's lockfile
    pub fn read_lockfile(&self) -> String {
        std::fs::read_to_string(self.work().join("requirements.txt")).unwrap()
    }
}

/// Commit staged changes as a human developer
pub fn developer_commit(dir: &Path, message: &str) {
    git(
        dir,
        &[
            "-c",
            &format!("user.name={DEVELOPER_NAME}"),
            "-c",
            &format!("user.email={DEVELOPER_EMAIL}"),
            "-c",
            "commit.gpgsign=false",
            "commit",
            "--quiet",
            "-m",
            message,
        ],
    );
}

/// Write an executable `sh` script standing in for a program
#[cfg(unix)]
pub fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).expect("Failed to write script");
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))
        .expect("Failed to make script executable");
    path
}

/// A fake interpreter: reports `version`, freezes to `freeze`, and runs the
/// test suite with exit status `test_status`. Every invocation is logged to
/// `calls.log` next to the script.
#[cfg(unix)]
pub fn fake_python(dir: &Path, version: &str, freeze: &str, test_status: i32) -> PathBuf {
    let log = dir.join("calls.log");
    let frozen = dir.join("frozen.txt");
    std::fs::write(&frozen, freeze).expect("Failed to write freeze output");
    write_script(
        dir,
        "python",
        &format!(
            r#"echo "$*" >> '{log}'
case "$*" in
  --version) echo "Python {version}" ;;
  *"pip --no-input freeze"*) cat '{frozen}' ;;
  *"-m pytest"*) echo "collected 3 items"; exit {test_status} ;;
esac
exit 0"#,
            log = log.display(),
            frozen = frozen.display(),
        ),
    )
}

/// Run the cdu binary in `dir`
pub fn run_cdu(dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_cdu"))
        .current_dir(dir)
        .args(args)
        .env_remove("RUST_LOG")
        .env_remove("CDU_CRON")
        .env_remove("CDU_PYTHON_VERSION")
        .env_remove("CDU_PYTHON_BIN")
        .env_remove("CDU_LOCKFILE")
        .env_remove("CDU_REMOTE")
        .env_remove("CDU_BRANCH")
        .env("CDU_CACHE_DIR", std::env::temp_dir().join("cdu-test-cache"))
        .output()
        .expect("Failed to execute cdu")
}

/// Sample project configuration
pub const SAMPLE_CONFIG: &str = r#"
[python]
version = "3.9"
venv = false

[tests]
runner = "pytest"
args = ["-q"]

[identity]
name = "Dependency Bot"
email = "deps-bot@example.com"

[commit]
message = "chore: refresh pinned dependencies"

[schedule]
cron = "30 4 * * 1-5"
"#;
