//! Collaborator interfaces
//!
//! The pipeline never talks to pip, the test runner or git directly. It drives
//! these traits; [`crate::infra::python`] and [`crate::infra::git`] implement
//! them over the real programs, and tests substitute in-memory fakes.

use std::path::Path;

use crate::core::publish::CommitOutcome;
use crate::core::settings::Identity;
use crate::infra::git::GitError;
use crate::infra::process::ProcessError;

/// Package installer operations
#[allow(async_fn_in_trait)]
pub trait PackageInstaller {
    /// Upgrade the installer itself
    async fn upgrade_self(&self) -> Result<(), ProcessError>;

    /// Install everything pinned in `lockfile`
    async fn install_requirements(&self, lockfile: &Path) -> Result<(), ProcessError>;

    /// Upgrade `packages` and all their dependencies to the newest allowed versions
    async fn eager_upgrade(&self, packages: &[String]) -> Result<(), ProcessError>;

    /// Exact versions of everything installed, in lockfile format
    async fn freeze(&self) -> Result<String, ProcessError>;

    /// Install a single package
    async fn install_package(&self, package: &str) -> Result<(), ProcessError>;
}

/// Test suite execution
#[allow(async_fn_in_trait)]
pub trait TestRunner {
    /// Run the project's tests; any failure is an error
    async fn run_tests(&self) -> Result<(), ProcessError>;
}

/// Version-control operations used to publish a refreshed lockfile
#[allow(async_fn_in_trait)]
pub trait VersionControl {
    /// Set the committer identity for this repository only
    async fn configure_identity(&self, identity: &Identity) -> Result<(), GitError>;

    /// Stage `path` (relative to the repository root)
    async fn stage(&self, path: &Path) -> Result<(), GitError>;

    /// Commit staged changes to `path`, or report that there are none
    async fn commit(&self, path: &Path, message: &str) -> Result<CommitOutcome, GitError>;

    /// Push HEAD to `remote`, optionally to a named `branch`
    async fn push(&self, remote: &str, branch: Option<&str>) -> Result<(), GitError>;
}
