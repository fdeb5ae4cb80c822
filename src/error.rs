//! Error types for cdu
//!
//! Domain-specific error types using thiserror.

use std::path::PathBuf;
use thiserror::Error;

use crate::core::pipeline::Step;
use crate::infra::git::GitError;
use crate::infra::process::ProcessError;

/// Project configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to read config file
    #[error("Failed to read config file '{path}': {error}")]
    Read { path: PathBuf, error: String },

    /// Failed to parse config file
    #[error("Failed to parse config file '{path}': {error}")]
    Parse { path: PathBuf, error: String },

    /// A field holds a value the pipeline cannot work with
    #[error("Invalid value for '{field}': {message}")]
    Invalid { field: String, message: String },

    /// Refusing to overwrite an existing config file
    #[error("Config file already exists: {path}. Use --force to overwrite")]
    AlreadyExists { path: PathBuf },

    /// Failed to write config file
    #[error("Failed to write config file '{path}': {error}")]
    Write { path: PathBuf, error: String },
}

/// Lockfile I/O errors
#[derive(Error, Debug)]
pub enum LockfileError {
    /// Failed to read lockfile
    #[error("Failed to read lockfile '{path}': {error}")]
    Read { path: PathBuf, error: String },

    /// Failed to write lockfile
    #[error("Failed to write lockfile '{path}': {error}")]
    Write { path: PathBuf, error: String },
}

/// Fatal pipeline failures
///
/// Every variant aborts the run. A clean working tree at publish time is not
/// represented here: it is [`crate::core::publish::CommitOutcome::NothingToCommit`].
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Checkout, interpreter or environment could not be prepared
    #[error("Provisioning failed: {message}")]
    Provisioning { message: String },

    /// The package installer reported an error
    #[error("Installer failed during {step}: {source}")]
    Installer {
        step: Step,
        #[source]
        source: ProcessError,
    },

    /// The test suite did not pass against the upgraded environment
    #[error("Test suite failed ({}); the regenerated lockfile was not published", describe_exit(.exit_code))]
    TestsFailed {
        exit_code: Option<i32>,
        output: String,
    },

    /// Lockfile could not be read or written
    #[error(transparent)]
    Lockfile(#[from] LockfileError),

    /// Identity, staging or commit failed
    #[error("Commit failed: {0}")]
    Commit(#[source] GitError),

    /// The remote rejected the push or could not be reached
    #[error("Push to '{remote}' failed: {source}")]
    Push {
        remote: String,
        #[source]
        source: GitError,
    },
}

impl PipelineError {
    /// Build a provisioning error from anything printable
    pub fn provisioning(message: impl std::fmt::Display) -> Self {
        Self::Provisioning {
            message: message.to_string(),
        }
    }

    /// The step a failure belongs to
    pub fn step(&self) -> Step {
        match self {
            Self::Provisioning { .. } => Step::Provision,
            Self::Installer { step, .. } => *step,
            Self::TestsFailed { .. } => Step::Verify,
            Self::Lockfile(_) => Step::Freeze,
            Self::Commit(_) | Self::Push { .. } => Step::Publish,
        }
    }
}

fn describe_exit(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {code}"),
        None => "terminated by signal".to_string(),
    }
}
