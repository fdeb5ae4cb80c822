//! Git operations
//!
//! Cloning and HEAD resolution go through the gix crate. Publishing (identity,
//! staging, commit, push) shells out to the `git` CLI so that the user's
//! credential helpers and hooks apply exactly as they would by hand.

use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::core::publish::CommitOutcome;
use crate::core::settings::Identity;
use crate::core::tools::VersionControl;
use crate::infra::process::{ProcessCommand, ProcessError};

/// Environment variables that would override the configured identity
const IDENTITY_OVERRIDES: [&str; 4] = [
    "GIT_AUTHOR_NAME",
    "GIT_AUTHOR_EMAIL",
    "GIT_COMMITTER_NAME",
    "GIT_COMMITTER_EMAIL",
];

/// Git operation errors
#[derive(Error, Debug)]
pub enum GitError {
    /// Failed to clone repository
    #[error("Failed to clone '{url}': {error}")]
    CloneFailed { url: String, error: String },

    /// Failed to resolve HEAD to a commit
    #[error("Failed to resolve HEAD in '{path}': {error}")]
    ResolveFailed { path: PathBuf, error: String },

    /// IO error
    #[error("IO error for '{path}': {error}")]
    IoError { path: PathBuf, error: String },

    /// Invalid repository
    #[error("Invalid repository at '{path}': {error}")]
    InvalidRepository { path: PathBuf, error: String },

    /// A git command failed
    #[error(transparent)]
    Command(#[from] ProcessError),

    /// Git printed something we could not interpret
    #[error("Unexpected output from '{command}': {output}")]
    UnexpectedOutput { command: String, output: String },
}

/// Clone `url` into `dest`, checking out the remote's default branch
///
/// Blocking; callers on the async runtime should use `spawn_blocking`.
pub fn clone_repo(url: &str, dest: &Path) -> Result<String, GitError> {
    if dest.exists() {
        std::fs::remove_dir_all(dest).map_err(|e| GitError::IoError {
            path: dest.to_path_buf(),
            error: e.to_string(),
        })?;
    }

    let clone_failed = |e: &dyn std::fmt::Display| GitError::CloneFailed {
        url: url.to_string(),
        error: e.to_string(),
    };

    let mut prepare = gix::prepare_clone(url, dest).map_err(|e| clone_failed(&e))?;

    let (mut checkout, _outcome) = prepare
        .fetch_then_checkout(gix::progress::Discard, &gix::interrupt::IS_INTERRUPTED)
        .map_err(|e| clone_failed(&e))?;

    let (repo, _outcome) = checkout
        .main_worktree(gix::progress::Discard, &gix::interrupt::IS_INTERRUPTED)
        .map_err(|e| clone_failed(&e))?;

    let sha = repo
        .head_id()
        .map_err(|e| GitError::ResolveFailed {
            path: dest.to_path_buf(),
            error: e.to_string(),
        })?
        .to_hex()
        .to_string();

    tracing::info!("Cloned {url} at {sha}");
    Ok(sha)
}

/// Resolve HEAD of the repository at `path` to a commit SHA
pub fn head_revision(path: &Path) -> Result<String, GitError> {
    let repo = gix::open(path).map_err(|e| GitError::InvalidRepository {
        path: path.to_path_buf(),
        error: e.to_string(),
    })?;

    let id = repo.head_id().map_err(|e| GitError::ResolveFailed {
        path: path.to_path_buf(),
        error: e.to_string(),
    })?;

    Ok(id.to_hex().to_string())
}

/// Whether `path` is the root of a git working tree
pub fn is_repository(path: &Path) -> bool {
    gix::open(path).is_ok()
}

/// [`VersionControl`] over the `git` command line
#[derive(Debug, Clone)]
pub struct GitCli {
    program: PathBuf,
    repo: PathBuf,
}

impl GitCli {
    /// Operate on the working tree at `repo` using `git` from PATH
    pub fn new(repo: &Path) -> Self {
        Self {
            program: PathBuf::from("git"),
            repo: repo.to_path_buf(),
        }
    }

    fn git(&self) -> ProcessCommand {
        ProcessCommand::new(&self.program).current_dir(&self.repo)
    }

    /// Version line reported by `git --version`
    pub async fn version(&self) -> Result<String, GitError> {
        let output = self.git().arg("--version").run().await?;
        Ok(output.stdout.trim().to_string())
    }

    /// Commit SHA that HEAD points at
    pub async fn rev_parse_head(&self) -> Result<String, GitError> {
        let cmd = self.git().args(["rev-parse", "HEAD"]);
        let output = cmd.run().await?;
        let sha = output.stdout.trim();
        if sha.len() >= 40 && sha.chars().all(|c| c.is_ascii_hexdigit()) {
            Ok(sha.to_string())
        } else {
            Err(GitError::UnexpectedOutput {
                command: cmd.display(),
                output: output.stdout,
            })
        }
    }
}

impl VersionControl for GitCli {
    async fn configure_identity(&self, identity: &Identity) -> Result<(), GitError> {
        self.git()
            .args(["config", "--local", "user.email"])
            .arg(&identity.email)
            .run()
            .await?;
        self.git()
            .args(["config", "--local", "user.name"])
            .arg(&identity.name)
            .run()
            .await?;
        Ok(())
    }

    async fn stage(&self, path: &Path) -> Result<(), GitError> {
        self.git().args(["add", "--"]).arg(path).run().await?;
        Ok(())
    }

    async fn commit(&self, path: &Path, message: &str) -> Result<CommitOutcome, GitError> {
        // 0: index matches HEAD for this path, 1: staged differences
        let diff = self
            .git()
            .args(["diff", "--cached", "--quiet", "--"])
            .arg(path);
        let output = diff.output().await?;
        match output.exit_code {
            Some(0) => {
                tracing::info!("{} unchanged, nothing to commit", path.display());
                return Ok(CommitOutcome::NothingToCommit);
            }
            Some(1) => {}
            _ => return Err(diff.failure(&output).into()),
        }

        let mut commit = self.git().args(["commit", "--quiet", "-m", message, "--"]).arg(path);
        for key in IDENTITY_OVERRIDES {
            commit = commit.env_remove(key);
        }
        commit.run().await?;

        let sha = self.rev_parse_head().await?;
        tracing::info!("Committed {} as {sha}", path.display());
        Ok(CommitOutcome::Committed { sha })
    }

    async fn push(&self, remote: &str, branch: Option<&str>) -> Result<(), GitError> {
        let refspec = match branch {
            Some(branch) => format!("HEAD:refs/heads/{branch}"),
            None => "HEAD".to_string(),
        };
        self.git().args(["push", remote, &refspec]).run().await?;
        tracing::info!("Pushed {refspec} to {remote}");
        Ok(())
    }
}
