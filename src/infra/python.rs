//! Python interpreter, pip and test runner
//!
//! Locates an interpreter of the required version, optionally isolates it in
//! a virtual environment, and drives `python -m pip` and `python -m <runner>`
//! for the pipeline.

use std::path::{Path, PathBuf};

use regex::Regex;
use tempfile::TempDir;

use crate::config::defaults::{STDERR_TAIL_LINES, VENV_DIR_NAME};
use crate::core::tools::{PackageInstaller, TestRunner};
use crate::error::PipelineError;
use crate::infra::process::{tail_lines, ProcessCommand, ProcessError};

/// An interpreter that reported a usable version
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interpreter {
    /// Executable path
    pub path: PathBuf,
    /// Full reported version, e.g. "3.9.18"
    pub version: String,
}

/// Extract the version from `python --version` output
pub fn parse_python_version(output: &str) -> Option<String> {
    let version_regex = Regex::new(r"Python\s+(\d+(?:\.\d+)*\S*)").ok()?;
    version_regex
        .captures(output)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// Whether `actual` satisfies `required` by dotted-component prefix
///
/// `3.9` accepts `3.9.18` but not `3.10.1`.
pub fn version_matches(required: &str, actual: &str) -> bool {
    let actual_parts: Vec<&str> = actual
        .split(|c: char| !c.is_ascii_digit())
        .take_while(|part| !part.is_empty())
        .collect();
    let required_parts: Vec<&str> = required.split('.').collect();
    required_parts.len() <= actual_parts.len()
        && required_parts
            .iter()
            .zip(&actual_parts)
            .all(|(r, a)| r.parse::<u64>().ok() == a.parse::<u64>().ok())
}

/// Interpreter candidates, in search order
pub fn candidates(required: &str, explicit: Option<&Path>) -> Vec<PathBuf> {
    if let Some(path) = explicit {
        return vec![path.to_path_buf()];
    }
    let mut names = Vec::new();
    let parts: Vec<&str> = required.split('.').collect();
    if parts.len() >= 2 {
        names.push(format!("python{}.{}", parts[0], parts[1]));
    }
    if parts.first() == Some(&"3") || parts.first() == Some(&"2") {
        names.push(format!("python{}", parts[0]));
    }
    names.push("python3".to_string());
    names.push("python".to_string());
    names.dedup();

    let mut seen = Vec::new();
    for name in names {
        let path = which::which(&name).unwrap_or_else(|_| PathBuf::from(&name));
        if !seen.contains(&path) {
            seen.push(path);
        }
    }
    seen
}

/// Ask an interpreter for its version
pub async fn probe(path: &Path) -> Result<String, ProcessError> {
    let cmd = ProcessCommand::new(path).arg("--version");
    let output = cmd.run().await?;
    // Python 2 prints its version to stderr
    let combined = format!("{}{}", output.stdout, output.stderr);
    parse_python_version(&combined).ok_or_else(|| ProcessError::Failed {
        command: cmd.display(),
        exit_code: output.exit_code,
        stderr: format!("unrecognized version output: {}", combined.trim()),
    })
}

/// Find an interpreter whose version matches `required`
pub async fn find_interpreter(
    required: &str,
    explicit: Option<&Path>,
) -> Result<Interpreter, PipelineError> {
    let mut tried = Vec::new();
    for path in candidates(required, explicit) {
        match probe(&path).await {
            Ok(version) if version_matches(required, &version) => {
                tracing::info!("Using Python {version} at {}", path.display());
                return Ok(Interpreter { path, version });
            }
            Ok(version) => {
                tracing::debug!("{} is Python {version}, need {required}", path.display());
                tried.push(format!("{}: {version}", path.display()));
            }
            Err(e) => {
                tracing::debug!("{} unusable: {e}", path.display());
                tried.push(format!("{}: not runnable", path.display()));
            }
        }
    }
    Err(PipelineError::provisioning(format!(
        "Python {required} not found (tried {})",
        tried.join(", ")
    )))
}

/// A throwaway virtual environment
#[derive(Debug)]
pub struct VirtualEnv {
    dir: TempDir,
    python: PathBuf,
}

impl VirtualEnv {
    /// Create a venv from `base` in a fresh directory under `parent`
    pub async fn create(base: &Interpreter, parent: &Path) -> Result<Self, PipelineError> {
        std::fs::create_dir_all(parent).map_err(|e| {
            PipelineError::provisioning(format!("cannot create {}: {e}", parent.display()))
        })?;
        let dir = tempfile::Builder::new()
            .prefix("cdu-env-")
            .tempdir_in(parent)
            .map_err(|e| PipelineError::provisioning(format!("cannot create venv directory: {e}")))?;
        let venv_path = dir.path().join(VENV_DIR_NAME);

        ProcessCommand::new(&base.path)
            .args(["-m", "venv"])
            .arg(&venv_path)
            .run()
            .await
            .map_err(|e| PipelineError::provisioning(format!("venv creation failed: {e}")))?;

        let python = venv_python(&venv_path);
        tracing::info!("Created virtual environment at {}", venv_path.display());
        Ok(Self { dir, python })
    }

    /// Interpreter inside the venv
    pub fn python(&self) -> &Path {
        &self.python
    }

    /// Root of the scratch directory holding the venv
    pub fn path(&self) -> &Path {
        self.dir.path()
    }
}

/// The interpreter every later step runs, and the venv that owns it
#[derive(Debug)]
pub struct Runtime {
    interpreter: Interpreter,
    python: PathBuf,
    venv: Option<VirtualEnv>,
}

impl Runtime {
    /// Interpreter to run pip and the tests with
    pub fn python(&self) -> &Path {
        &self.python
    }

    /// The base interpreter that was found
    pub fn interpreter(&self) -> &Interpreter {
        &self.interpreter
    }

    /// Whether steps run inside a throwaway venv
    pub fn is_isolated(&self) -> bool {
        self.venv.is_some()
    }
}

/// Find the required interpreter and, if `use_venv`, isolate it under `envs_dir`
pub async fn provision(
    version: &str,
    explicit: Option<&Path>,
    use_venv: bool,
    envs_dir: &Path,
) -> Result<Runtime, PipelineError> {
    let interpreter = find_interpreter(version, explicit).await?;
    if !use_venv {
        return Ok(Runtime {
            python: interpreter.path.clone(),
            interpreter,
            venv: None,
        });
    }
    let venv = VirtualEnv::create(&interpreter, envs_dir).await?;
    Ok(Runtime {
        python: venv.python().to_path_buf(),
        interpreter,
        venv: Some(venv),
    })
}

fn venv_python(venv: &Path) -> PathBuf {
    if cfg!(windows) {
        venv.join("Scripts").join("python.exe")
    } else {
        venv.join("bin").join("python")
    }
}

/// `python -m pip`
#[derive(Debug, Clone)]
pub struct Pip {
    python: PathBuf,
    cwd: PathBuf,
}

impl Pip {
    /// Drive pip through `python`, running in `cwd`
    pub fn new(python: &Path, cwd: &Path) -> Self {
        Self {
            python: python.to_path_buf(),
            cwd: cwd.to_path_buf(),
        }
    }

    fn pip(&self) -> ProcessCommand {
        ProcessCommand::new(&self.python)
            .args(["-m", "pip", "--no-input"])
            .current_dir(&self.cwd)
    }

    /// Check that pip is runnable, returning its version line
    pub async fn version(&self) -> Result<String, ProcessError> {
        let output = self.pip().arg("--version").run().await?;
        Ok(output.stdout.trim().to_string())
    }
}

impl PackageInstaller for Pip {
    async fn upgrade_self(&self) -> Result<(), ProcessError> {
        self.pip().args(["install", "--upgrade", "pip"]).run().await?;
        Ok(())
    }

    async fn install_requirements(&self, lockfile: &Path) -> Result<(), ProcessError> {
        self.pip().args(["install", "-r"]).arg(lockfile).run().await?;
        Ok(())
    }

    async fn eager_upgrade(&self, packages: &[String]) -> Result<(), ProcessError> {
        self.pip()
            .args(["install", "--upgrade", "--upgrade-strategy", "eager"])
            .args(packages)
            .run()
            .await?;
        Ok(())
    }

    async fn freeze(&self) -> Result<String, ProcessError> {
        Ok(self.pip().arg("freeze").run().await?.stdout)
    }

    async fn install_package(&self, package: &str) -> Result<(), ProcessError> {
        self.pip().args(["install", package]).run().await?;
        Ok(())
    }
}

/// Runs the suite as `python -m <module> [args...]` from the repository root
#[derive(Debug, Clone)]
pub struct ModuleTestRunner {
    python: PathBuf,
    module: String,
    args: Vec<String>,
    cwd: PathBuf,
}

impl ModuleTestRunner {
    pub fn new(python: &Path, module: &str, args: &[String], cwd: &Path) -> Self {
        Self {
            python: python.to_path_buf(),
            module: module.to_string(),
            args: args.to_vec(),
            cwd: cwd.to_path_buf(),
        }
    }
}

impl TestRunner for ModuleTestRunner {
    async fn run_tests(&self) -> Result<(), ProcessError> {
        let cmd = ProcessCommand::new(&self.python)
            .arg("-m")
            .arg(&self.module)
            .args(&self.args)
            .current_dir(&self.cwd);
        let output = cmd.output().await?;
        if output.success() {
            return Ok(());
        }
        // Test runners report failures on stdout; keep the tail of both streams.
        let combined = format!("{}{}", output.stdout, output.stderr);
        Err(ProcessError::Failed {
            command: cmd.display(),
            exit_code: output.exit_code,
            stderr: tail_lines(&combined, STDERR_TAIL_LINES),
        })
    }
}
