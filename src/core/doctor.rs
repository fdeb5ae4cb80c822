//! Doctor command logic
//!
//! Checks that the programs a run depends on are present and that the
//! project is configured so that a run can start.

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::config::defaults::{CONFIG_FILE_NAME, DEFAULT_PYTHON_VERSION};
use crate::core::settings::{Overrides, ProjectConfig};
use crate::infra::git;
use crate::infra::process::ProcessCommand;
use crate::infra::python::{self, Pip};

/// Result of a single dependency check
#[derive(Debug, Clone, Serialize)]
pub struct CheckResult {
    /// Name of the dependency being checked
    pub name: String,
    /// Whether the check passed
    pub passed: bool,
    /// Version if available
    pub version: Option<String>,
    /// Error message if check failed
    pub error: Option<String>,
    /// Suggestion for fixing the issue
    pub suggestion: Option<String>,
    /// Whether this is a required or optional dependency
    pub required: bool,
}

impl CheckResult {
    /// Create a passing check result
    pub fn pass(name: &str, version: Option<String>, required: bool) -> Self {
        Self {
            name: name.to_string(),
            passed: true,
            version,
            error: None,
            suggestion: None,
            required,
        }
    }

    /// Create a failing check result
    pub fn fail(name: &str, error: &str, suggestion: Option<&str>, required: bool) -> Self {
        Self {
            name: name.to_string(),
            passed: false,
            version: None,
            error: Some(error.to_string()),
            suggestion: suggestion.map(String::from),
            required,
        }
    }
}

/// Overall doctor report
#[derive(Debug, Default, Serialize)]
pub struct DoctorReport {
    /// Individual check results
    pub checks: Vec<CheckResult>,
    /// Configuration issues found
    pub config_issues: Vec<String>,
}

impl DoctorReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_check(&mut self, result: CheckResult) {
        self.checks.push(result);
    }

    pub fn add_config_issue(&mut self, issue: String) {
        self.config_issues.push(issue);
    }

    /// Check if all required checks passed
    pub fn all_required_passed(&self) -> bool {
        self.checks
            .iter()
            .filter(|c| c.required)
            .all(|c| c.passed)
    }

    /// Check if all checks passed and no configuration issue was found
    pub fn all_passed(&self) -> bool {
        self.checks.iter().all(|c| c.passed) && self.config_issues.is_empty()
    }

    pub fn passed_count(&self) -> usize {
        self.checks.iter().filter(|c| c.passed).count()
    }

    pub fn failed_count(&self) -> usize {
        self.checks.iter().filter(|c| !c.passed).count()
    }

    /// Get all failed required checks
    pub fn failed_required(&self) -> Vec<&CheckResult> {
        self.checks
            .iter()
            .filter(|c| c.required && !c.passed)
            .collect()
    }
}

/// Version reported by `<command> --version`, if it runs
pub async fn check_command_available(command: &str) -> Option<String> {
    let output = ProcessCommand::new(command).arg("--version").output().await.ok()?;
    if !output.success() {
        return None;
    }
    extract_version(&format!("{}{}", output.stdout, output.stderr))
}

/// Extract version string from command output
fn extract_version(output: &str) -> Option<String> {
    let version_regex = regex::Regex::new(r"v?(\d+\.\d+(?:\.\d+)?(?:-\w+)?)").ok()?;
    version_regex
        .captures(output)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// Check Git availability
pub async fn check_git() -> CheckResult {
    match check_command_available("git").await {
        Some(version) => CheckResult::pass("Git", Some(version), true),
        None => CheckResult::fail(
            "Git",
            "Git not found in PATH",
            Some("Install Git from https://git-scm.com/ or use your package manager"),
            true,
        ),
    }
}

/// Check the interpreter, then pip and venv through it
async fn check_python(
    report: &mut DoctorReport,
    project_dir: &Path,
    version: &str,
    bin: Option<&Path>,
    use_venv: bool,
) {
    let name = format!("Python {version}");
    let interpreter = match python::find_interpreter(version, bin).await {
        Ok(interpreter) => {
            report.add_check(CheckResult::pass(&name, Some(interpreter.version.clone()), true));
            interpreter
        }
        Err(e) => {
            report.add_check(CheckResult::fail(
                &name,
                &e.to_string(),
                Some("Install the required Python version or point python.bin at it"),
                true,
            ));
            report.add_check(CheckResult::fail(
                "pip",
                "no matching interpreter",
                None,
                true,
            ));
            return;
        }
    };

    match Pip::new(&interpreter.path, project_dir).version().await {
        Ok(line) => report.add_check(CheckResult::pass("pip", extract_version(&line), true)),
        Err(e) => report.add_check(CheckResult::fail(
            "pip",
            &e.to_string(),
            Some("Install pip with `python -m ensurepip --upgrade`"),
            true,
        )),
    }

    let venv = ProcessCommand::new(&interpreter.path)
        .args(["-m", "venv", "--help"])
        .output()
        .await;
    match venv {
        Ok(output) if output.success() => {
            report.add_check(CheckResult::pass("venv module", None, use_venv));
        }
        _ => report.add_check(CheckResult::fail(
            "venv module",
            "venv module not available",
            Some("Install your distribution's python3-venv package or set python.venv = false"),
            use_venv,
        )),
    }
}

/// Run all doctor checks for the project at `project_dir`
pub async fn run_doctor(
    project_dir: &Path,
    config_path: Option<&Path>,
    overrides: &Overrides,
) -> DoctorReport {
    let mut report = DoctorReport::new();

    report.add_check(check_git().await);

    let config_file: PathBuf = config_path.map_or_else(|| project_dir.join(CONFIG_FILE_NAME), Path::to_path_buf);
    let settings = ProjectConfig::load_from_path(&config_file).and_then(|config| config.resolve(overrides));

    let (version, bin, use_venv) = match &settings {
        Ok(settings) => (
            settings.python_version.clone(),
            settings.python_bin.clone(),
            settings.use_venv,
        ),
        Err(e) => {
            report.add_config_issue(e.to_string());
            (
                overrides
                    .python_version
                    .clone()
                    .unwrap_or_else(|| DEFAULT_PYTHON_VERSION.to_string()),
                overrides.python_bin.clone(),
                !overrides.no_venv,
            )
        }
    };

    check_python(&mut report, project_dir, &version, bin.as_deref(), use_venv).await;

    if !git::is_repository(project_dir) {
        report.add_config_issue(format!(
            "{} is not the root of a git repository",
            project_dir.display()
        ));
    }
    if let Ok(settings) = &settings {
        let lockfile = project_dir.join(&settings.lockfile);
        if !lockfile.is_file() {
            report.add_config_issue(format!(
                "Lockfile {} not found; the first run will create it",
                settings.lockfile.display()
            ));
        }
    }

    report
}
