//! Publish outcomes
//!
//! Publishing has two terminal outcomes. A clean tree is its own success
//! variant so that a failed `git commit` is never mistaken for "nothing to do".

use serde::Serialize;

/// Result of the commit step
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CommitOutcome {
    /// A new commit was recorded
    Committed { sha: String },
    /// The staged lockfile matches HEAD
    NothingToCommit,
}

/// Result of the publish step
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PublishOutcome {
    /// The lockfile changed and was committed
    Changed {
        /// Commit recorded for the refreshed lockfile
        sha: String,
        /// Whether the commit was pushed to the remote
        pushed: bool,
    },
    /// The lockfile was already up to date
    Unchanged,
}

impl PublishOutcome {
    /// Whether a commit was created
    pub fn is_changed(&self) -> bool {
        matches!(self, Self::Changed { .. })
    }
}
