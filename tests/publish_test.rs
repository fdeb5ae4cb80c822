//! Publishing against real git repositories
//!
//! Each test builds a working copy tracking a bare remote in a temp
//! directory. Tests return early when git is not installed.

mod common;

use std::path::Path;

use cdu::core::publish::CommitOutcome;
use cdu::core::settings::Identity;
use cdu::core::tools::VersionControl;
use cdu::infra::git::{self, GitCli, GitError};
use common::{git, git_available, GitFixture, DEVELOPER_EMAIL};

const LOCKFILE: &str = "requirements.txt";

fn bot() -> Identity {
    Identity {
        name: "GitHub Action".to_string(),
        email: "action@github.com".to_string(),
    }
}

async fn publish(vcs: &GitCli, message: &str) -> Result<CommitOutcome, GitError> {
    vcs.configure_identity(&bot()).await?;
    vcs.stage(Path::new(LOCKFILE)).await?;
    vcs.commit(Path::new(LOCKFILE), message).await
}

macro_rules! require_git {
    () => {
        if !git_available() {
            eprintln!("git not installed, skipping");
            return;
        }
    };
}

#[tokio::test]
async fn test_changed_lockfile_is_committed_as_bot_and_pushed() {
    require_git!();
    let fixture = GitFixture::new("A==1.0\nB==2.0\n");
    let before = fixture.head();
    fixture.write_lockfile("A==1.1\nB==2.0\n");

    let vcs = GitCli::new(&fixture.work());
    let outcome = publish(&vcs, "Update dependencies via CDU").await.unwrap();
    let sha = match outcome {
        CommitOutcome::Committed { sha } => sha,
        CommitOutcome::NothingToCommit => panic!("Expected a commit"),
    };
    assert_ne!(sha, before);
    assert_eq!(sha, fixture.head());

    let authorship = git(
        &fixture.work(),
        &["log", "-1", "--format=%an|%ae|%cn|%ce|%s"],
    );
    assert_eq!(
        authorship,
        "GitHub Action|action@github.com|GitHub Action|action@github.com|Update dependencies via CDU"
    );

    vcs.push("origin", None).await.unwrap();
    assert_eq!(fixture.remote_head(), sha);
    assert_eq!(fixture.remote_lockfile(), "A==1.1\nB==2.0\n");
}

#[tokio::test]
async fn test_identity_is_local_to_the_repository() {
    require_git!();
    let fixture = GitFixture::new("A==1.0\n");
    let vcs = GitCli::new(&fixture.work());
    vcs.configure_identity(&bot()).await.unwrap();

    assert_eq!(
        git(&fixture.work(), &["config", "--local", "user.email"]),
        "action@github.com"
    );
    assert_eq!(
        git(&fixture.work(), &["config", "--local", "user.name"]),
        "GitHub Action"
    );
}

#[tokio::test]
async fn test_unchanged_lockfile_is_nothing_to_commit() {
    require_git!();
    let fixture = GitFixture::new("A==1.0\nB==2.0\n");
    let before = fixture.head();
    fixture.write_lockfile("A==1.0\nB==2.0\n");

    let outcome = publish(&GitCli::new(&fixture.work()), "Update dependencies via CDU")
        .await
        .unwrap();

    assert_eq!(outcome, CommitOutcome::NothingToCommit);
    assert_eq!(fixture.head(), before);
}

#[tokio::test]
async fn test_commit_leaves_other_staged_changes_alone() {
    require_git!();
    let fixture = GitFixture::new("A==1.0\n");
    std::fs::write(fixture.work().join("NOTES.md"), "work in progress\n").unwrap();
    git(&fixture.work(), &["add", "NOTES.md"]);
    fixture.write_lockfile("A==1.1\n");

    let outcome = publish(&GitCli::new(&fixture.work()), "Update dependencies via CDU")
        .await
        .unwrap();
    assert!(matches!(outcome, CommitOutcome::Committed { .. }));

    let committed = git(&fixture.work(), &["show", "--name-only", "--format=", "HEAD"]);
    assert_eq!(committed, LOCKFILE);
    let still_staged = git(&fixture.work(), &["diff", "--cached", "--name-only"]);
    assert_eq!(still_staged, "NOTES.md");
}

#[tokio::test]
async fn test_first_lockfile_in_new_repository() {
    require_git!();
    let fixture = GitFixture::new("A==1.0\n");
    git(&fixture.work(), &["rm", "--quiet", LOCKFILE]);
    common::developer_commit(&fixture.work(), "Drop pins");
    fixture.write_lockfile("A==1.0\n");

    let outcome = publish(&GitCli::new(&fixture.work()), "Update dependencies via CDU")
        .await
        .unwrap();
    assert!(matches!(outcome, CommitOutcome::Committed { .. }));
}

#[tokio::test]
async fn test_push_to_named_branch() {
    require_git!();
    let fixture = GitFixture::new("A==1.0\n");
    fixture.write_lockfile("A==1.1\n");
    let vcs = GitCli::new(&fixture.work());
    let CommitOutcome::Committed { sha } = publish(&vcs, "deps").await.unwrap() else {
        panic!("Expected a commit");
    };

    vcs.push("origin", Some("deps/refresh")).await.unwrap();
    assert_eq!(git(&fixture.remote(), &["rev-parse", "deps/refresh"]), sha);
    assert_ne!(fixture.remote_head(), sha);
}

#[tokio::test]
async fn test_rejected_push_is_an_error() {
    require_git!();
    let fixture = GitFixture::new("A==1.0\n");

    // Someone else moves the remote forward first
    let other = fixture.root.path().join("other");
    git(
        fixture.root.path(),
        &["clone", "--quiet", fixture.remote().to_str().unwrap(), "other"],
    );
    std::fs::write(other.join("README.md"), "hello\n").unwrap();
    git(&other, &["add", "README.md"]);
    common::developer_commit(&other, "Add readme");
    git(&other, &["push", "--quiet", "origin", "HEAD:main"]);

    fixture.write_lockfile("A==1.1\n");
    let vcs = GitCli::new(&fixture.work());
    publish(&vcs, "deps").await.unwrap();

    let err = vcs.push("origin", None).await.unwrap_err();
    assert!(matches!(err, GitError::Command(_)), "{err:?}");
    let author = git(&other, &["log", "-1", "--format=%ae"]);
    assert_eq!(author, DEVELOPER_EMAIL);
}

#[tokio::test]
async fn test_push_to_missing_remote_is_an_error() {
    require_git!();
    let fixture = GitFixture::new("A==1.0\n");
    let err = GitCli::new(&fixture.work())
        .push("nowhere", None)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("git push nowhere HEAD"), "{err}");
}

#[test]
fn test_head_revision_matches_git() {
    require_git!();
    let fixture = GitFixture::new("A==1.0\n");
    assert_eq!(git::head_revision(&fixture.work()).unwrap(), fixture.head());
    assert!(git::is_repository(&fixture.work()));
}

#[test]
fn test_clone_from_local_remote() {
    require_git!();
    let fixture = GitFixture::new("A==1.0\n");
    let dest = fixture.root.path().join("clone");
    let sha = git::clone_repo(fixture.remote().to_str().unwrap(), &dest).unwrap();
    assert_eq!(sha, fixture.remote_head());
    assert_eq!(
        std::fs::read_to_string(dest.join(LOCKFILE)).unwrap(),
        "A==1.0\n"
    );
}
