//! Project configuration
//!
//! Reads `cdu.toml` from the repository root. Every value is optional in the
//! file; [`ProjectConfig::resolve`] layers command-line overrides on top,
//! fills the rest from [`crate::config::defaults`] and validates the result
//! into [`Settings`], which is what the pipeline consumes.

use std::fs;
use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::config::defaults::{
    CONFIG_FILE_NAME, DEFAULT_BOT_EMAIL, DEFAULT_BOT_NAME, DEFAULT_COMMIT_MESSAGE,
    DEFAULT_LOCKFILE, DEFAULT_PYTHON_VERSION, DEFAULT_REMOTE, DEFAULT_SCHEDULE,
    DEFAULT_TEST_RUNNER,
};
use crate::core::schedule::CronSchedule;
use crate::error::ConfigError;

/// Contents of `cdu.toml`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProjectConfig {
    /// Interpreter settings
    #[serde(default)]
    pub python: PythonConfig,

    /// Lockfile settings
    #[serde(default)]
    pub lockfile: LockfileConfig,

    /// Verification settings
    #[serde(default)]
    pub tests: TestsConfig,

    /// Automation identity for commits
    #[serde(default)]
    pub identity: IdentityConfig,

    /// Commit settings
    #[serde(default)]
    pub commit: CommitConfig,

    /// Remote settings
    #[serde(default)]
    pub git: GitConfig,

    /// Trigger schedule
    #[serde(default)]
    pub schedule: ScheduleConfig,
}

/// `[python]`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PythonConfig {
    /// Required interpreter version, e.g. "3.9"
    pub version: Option<String>,
    /// Explicit interpreter binary to use instead of searching PATH
    pub bin: Option<PathBuf>,
    /// Install into an isolated virtual environment
    pub venv: Option<bool>,
}

/// `[lockfile]`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LockfileConfig {
    /// Path relative to the repository root
    pub path: Option<PathBuf>,
}

/// `[tests]`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TestsConfig {
    /// Test runner package, also run as `python -m <runner>`
    pub runner: Option<String>,
    /// Extra arguments passed to the runner
    pub args: Option<Vec<String>>,
}

/// `[identity]`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IdentityConfig {
    pub name: Option<String>,
    pub email: Option<String>,
}

/// `[commit]`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CommitConfig {
    pub message: Option<String>,
}

/// `[git]`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GitConfig {
    /// Remote to push to
    pub remote: Option<String>,
    /// Remote branch to push to; the current branch when unset
    pub branch: Option<String>,
    /// Push after committing
    pub push: Option<bool>,
}

/// `[schedule]`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScheduleConfig {
    /// Five-field cron expression, evaluated in UTC
    pub cron: Option<String>,
}

/// Values supplied on the command line (or through their environment variables)
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub python_version: Option<String>,
    pub python_bin: Option<PathBuf>,
    pub no_venv: bool,
    pub lockfile: Option<PathBuf>,
    pub remote: Option<String>,
    pub branch: Option<String>,
    pub no_push: bool,
    pub cron: Option<String>,
}

/// Fixed committer identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Identity {
    pub name: String,
    pub email: String,
}

/// Validated, fully-resolved settings for one run
#[derive(Debug, Clone)]
pub struct Settings {
    pub python_version: String,
    pub python_bin: Option<PathBuf>,
    pub use_venv: bool,
    pub lockfile: PathBuf,
    pub test_runner: String,
    pub test_args: Vec<String>,
    pub identity: Identity,
    pub commit_message: String,
    pub remote: String,
    pub branch: Option<String>,
    pub push: bool,
    pub schedule: CronSchedule,
}

impl ProjectConfig {
    /// Load `cdu.toml` from a project directory
    pub fn load(project_dir: &Path) -> Result<Self, ConfigError> {
        Self::load_from_path(&project_dir.join(CONFIG_FILE_NAME))
    }

    /// Load configuration from a specific path
    ///
    /// A missing file yields the default configuration; an unreadable or
    /// invalid one is an error.
    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::debug!("No config file at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            error: e.to_string(),
        })
    }

    /// Apply overrides, fill defaults and validate
    pub fn resolve(&self, overrides: &Overrides) -> Result<Settings, ConfigError> {
        let python_version = overrides
            .python_version
            .clone()
            .or_else(|| self.python.version.clone())
            .unwrap_or_else(|| DEFAULT_PYTHON_VERSION.to_string());
        validate_python_version(&python_version)?;

        let lockfile = overrides
            .lockfile
            .clone()
            .or_else(|| self.lockfile.path.clone())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_LOCKFILE));
        validate_lockfile_path(&lockfile)?;

        let test_runner = self
            .tests
            .runner
            .clone()
            .unwrap_or_else(|| DEFAULT_TEST_RUNNER.to_string());
        require_non_empty("tests.runner", &test_runner)?;

        let identity = Identity {
            name: self
                .identity
                .name
                .clone()
                .unwrap_or_else(|| DEFAULT_BOT_NAME.to_string()),
            email: self
                .identity
                .email
                .clone()
                .unwrap_or_else(|| DEFAULT_BOT_EMAIL.to_string()),
        };
        require_non_empty("identity.name", &identity.name)?;
        if !identity.email.contains('@') {
            return Err(invalid("identity.email", "must be an email address containing '@'"));
        }

        let commit_message = self
            .commit
            .message
            .clone()
            .unwrap_or_else(|| DEFAULT_COMMIT_MESSAGE.to_string());
        require_non_empty("commit.message", &commit_message)?;

        let remote = overrides
            .remote
            .clone()
            .or_else(|| self.git.remote.clone())
            .unwrap_or_else(|| DEFAULT_REMOTE.to_string());
        require_non_empty("git.remote", &remote)?;

        let branch = overrides.branch.clone().or_else(|| self.git.branch.clone());
        if let Some(branch) = &branch {
            require_non_empty("git.branch", branch)?;
        }

        let cron = overrides
            .cron
            .clone()
            .or_else(|| self.schedule.cron.clone())
            .unwrap_or_else(|| DEFAULT_SCHEDULE.to_string());
        let schedule = CronSchedule::parse(&cron).map_err(|e| invalid("schedule.cron", e))?;

        Ok(Settings {
            python_version,
            python_bin: overrides.python_bin.clone().or_else(|| self.python.bin.clone()),
            use_venv: !overrides.no_venv && self.python.venv.unwrap_or(true),
            lockfile,
            test_runner,
            test_args: self.tests.args.clone().unwrap_or_default(),
            identity,
            commit_message,
            remote,
            branch,
            push: !overrides.no_push && self.git.push.unwrap_or(true),
            schedule,
        })
    }
}

fn invalid(field: &str, message: impl std::fmt::Display) -> ConfigError {
    ConfigError::Invalid {
        field: field.to_string(),
        message: message.to_string(),
    }
}

fn require_non_empty(field: &str, value: &str) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        Err(invalid(field, "must not be empty"))
    } else {
        Ok(())
    }
}

fn validate_python_version(version: &str) -> Result<(), ConfigError> {
    let valid = !version.is_empty()
        && version
            .split('.')
            .all(|part| !part.is_empty() && part.chars().all(|c| c.is_ascii_digit()));
    if valid {
        Ok(())
    } else {
        Err(invalid(
            "python.version",
            format!("'{version}' is not a dotted version such as 3.9"),
        ))
    }
}

fn validate_lockfile_path(path: &Path) -> Result<(), ConfigError> {
    if path.as_os_str().is_empty() {
        return Err(invalid("lockfile.path", "must not be empty"));
    }
    let escapes = path.components().any(|c| {
        matches!(
            c,
            Component::ParentDir | Component::RootDir | Component::Prefix(_)
        )
    });
    if escapes {
        return Err(invalid(
            "lockfile.path",
            format!("'{}' must be relative to the repository root", path.display()),
        ));
    }
    Ok(())
}

/// Commented `cdu.toml` written by `cdu init`
pub fn default_config_toml() -> String {
    format!(
        r#"# cdu - continuous dependency updating

[python]
# Interpreter version the refresh runs against
version = "{DEFAULT_PYTHON_VERSION}"
# Install into an isolated virtual environment outside the working tree
venv = true

[lockfile]
path = "{DEFAULT_LOCKFILE}"

[tests]
runner = "{DEFAULT_TEST_RUNNER}"
args = []

[identity]
name = "{DEFAULT_BOT_NAME}"
email = "{DEFAULT_BOT_EMAIL}"

[commit]
message = "{DEFAULT_COMMIT_MESSAGE}"

[git]
remote = "{DEFAULT_REMOTE}"
# branch = "main"
push = true

[schedule]
# minute hour day-of-month month day-of-week, UTC
cron = "{DEFAULT_SCHEDULE}"
"#
    )
}

/// Write the default config into `project_dir`
pub fn write_default_config(project_dir: &Path, force: bool) -> Result<PathBuf, ConfigError> {
    let path = project_dir.join(CONFIG_FILE_NAME);
    if path.exists() && !force {
        return Err(ConfigError::AlreadyExists { path });
    }
    fs::write(&path, default_config_toml()).map_err(|e| ConfigError::Write {
        path: path.clone(),
        error: e.to_string(),
    })?;
    Ok(path)
}
