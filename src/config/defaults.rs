//! Default configuration values

/// Project configuration file name, looked up in the repository root
pub const CONFIG_FILE_NAME: &str = "cdu.toml";

/// Lockfile path relative to the repository root
pub const DEFAULT_LOCKFILE: &str = "requirements.txt";

/// Interpreter version the pipeline provisions
pub const DEFAULT_PYTHON_VERSION: &str = "3.9";

/// Test runner package installed before verification
pub const DEFAULT_TEST_RUNNER: &str = "pytest";

/// Daily at 00:00 UTC
pub const DEFAULT_SCHEDULE: &str = "0 0 * * *";

/// Automation identity used for bot commits
pub const DEFAULT_BOT_NAME: &str = "GitHub Action";

/// Automation identity email used for bot commits
pub const DEFAULT_BOT_EMAIL: &str = "action@github.com";

/// Message of every dependency refresh commit
pub const DEFAULT_COMMIT_MESSAGE: &str = "Update dependencies via CDU";

/// Remote that refreshed lockfiles are pushed to
pub const DEFAULT_REMOTE: &str = "origin";

/// Directory name of the interpreter-isolated environment inside a run's scratch dir
pub const VENV_DIR_NAME: &str = "venv";

/// Number of trailing stderr lines kept when a subprocess fails
pub const STDERR_TAIL_LINES: usize = 20;

/// Minimum proptest iterations
pub const MIN_PROPTEST_ITERATIONS: u32 = 100;
