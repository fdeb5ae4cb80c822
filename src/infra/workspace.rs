//! Working copies for a run
//!
//! A run either works in an existing checkout (in-place) or clones a remote
//! into a temporary directory that is removed when the [`Workspace`] drops.

use std::path::{Path, PathBuf};

use tempfile::TempDir;

use crate::error::PipelineError;
use crate::infra::dirs::CduDirs;
use crate::infra::git;

/// Where the repository comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    /// An existing working tree
    Local(PathBuf),
    /// A clone URL; HEAD of the default branch is checked out
    Remote(String),
}

/// A prepared checkout
#[derive(Debug)]
pub struct Workspace {
    root: PathBuf,
    revision: Option<String>,
    clone_dir: Option<TempDir>,
}

impl Workspace {
    /// Check out `source`, resolving HEAD
    pub async fn prepare(source: &Source, dirs: &CduDirs) -> Result<Self, PipelineError> {
        match source {
            Source::Local(path) => Self::local(path),
            Source::Remote(url) => Self::clone_remote(url, dirs).await,
        }
    }

    fn local(path: &Path) -> Result<Self, PipelineError> {
        if !path.is_dir() {
            return Err(PipelineError::provisioning(format!(
                "{} is not a directory",
                path.display()
            )));
        }
        if !git::is_repository(path) {
            return Err(PipelineError::provisioning(format!(
                "{} is not the root of a git repository",
                path.display()
            )));
        }

        // A repository without commits has no HEAD yet; the first commit creates it.
        let revision = match git::head_revision(path) {
            Ok(sha) => Some(sha),
            Err(e) => {
                tracing::warn!("{e}");
                None
            }
        };

        Ok(Self {
            root: path.to_path_buf(),
            revision,
            clone_dir: None,
        })
    }

    async fn clone_remote(url: &str, dirs: &CduDirs) -> Result<Self, PipelineError> {
        let parent = dirs.workspaces_dir();
        std::fs::create_dir_all(&parent).map_err(|e| {
            PipelineError::provisioning(format!("cannot create {}: {e}", parent.display()))
        })?;
        let temp = tempfile::Builder::new()
            .prefix("cdu-")
            .tempdir_in(&parent)
            .map_err(|e| PipelineError::provisioning(format!("cannot create workspace: {e}")))?;
        let root = temp.path().join("repo");

        let clone_url = url.to_string();
        let dest = root.clone();
        let sha = tokio::task::spawn_blocking(move || git::clone_repo(&clone_url, &dest))
            .await
            .map_err(|e| PipelineError::provisioning(format!("clone task failed: {e}")))?
            .map_err(PipelineError::provisioning)?;

        Ok(Self {
            root,
            revision: Some(sha),
            clone_dir: Some(temp),
        })
    }

    /// Repository root
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// HEAD at preparation time
    pub fn revision(&self) -> Option<&str> {
        self.revision.as_deref()
    }

    /// Whether the checkout is removed when the run ends
    pub fn is_ephemeral(&self) -> bool {
        self.clone_dir.is_some()
    }
}
