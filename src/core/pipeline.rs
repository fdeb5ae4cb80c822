//! Dependency refresh pipeline
//!
//! Runs the ordered refresh steps against a prepared checkout:
//!
//! 1. upgrade the installer
//! 2. install the pinned baseline
//! 3. eagerly upgrade everything installed
//! 4. freeze the result over the lockfile
//! 5. install the test runner and run the tests
//! 6. commit and push the lockfile if it changed
//!
//! Every step either succeeds or aborts the run. Nothing is published unless
//! all earlier steps succeeded. Checkout and interpreter provisioning happen
//! before the pipeline is built and are recorded into the same [`RunReport`].

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::core::lockfile::{self, Lockfile, LockfileDiff};
use crate::core::publish::{CommitOutcome, PublishOutcome};
use crate::core::schedule::Trigger;
use crate::core::settings::Settings;
use crate::core::tools::{PackageInstaller, TestRunner, VersionControl};
use crate::error::PipelineError;

/// Pipeline steps, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    /// Obtain the repository at HEAD
    Checkout,
    /// Find the interpreter and prepare the environment
    Provision,
    /// Upgrade the installer itself
    BootstrapInstaller,
    /// Install the currently pinned packages
    BaselineInstall,
    /// Upgrade every installed package and its dependencies
    EagerUpgrade,
    /// Regenerate the lockfile from the environment
    Freeze,
    /// Install the test runner and run the tests
    Verify,
    /// Commit and push the lockfile
    Publish,
}

impl Step {
    /// All steps in execution order
    pub const ALL: [Step; 8] = [
        Step::Checkout,
        Step::Provision,
        Step::BootstrapInstaller,
        Step::BaselineInstall,
        Step::EagerUpgrade,
        Step::Freeze,
        Step::Verify,
        Step::Publish,
    ];
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Checkout => "workspace preparation",
            Self::Provision => "runtime provisioning",
            Self::BootstrapInstaller => "installer bootstrap",
            Self::BaselineInstall => "baseline install",
            Self::EagerUpgrade => "eager upgrade",
            Self::Freeze => "lockfile regeneration",
            Self::Verify => "verification",
            Self::Publish => "publish",
        };
        f.write_str(label)
    }
}

/// How a step ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StepStatus {
    Succeeded,
    Skipped { reason: String },
    Failed { error: String },
}

/// One executed (or skipped) step
#[derive(Debug, Clone, Serialize)]
pub struct StepRecord {
    pub step: Step,
    #[serde(flatten)]
    pub status: StepStatus,
    pub duration_ms: u64,
}

/// Everything observed during one run
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    /// What started the run
    pub trigger: Trigger,
    /// When the run started
    pub started_at: DateTime<Utc>,
    /// HEAD before the run
    pub revision: Option<String>,
    /// Lockfile path relative to the repository root
    pub lockfile: PathBuf,
    /// Steps in execution order
    pub steps: Vec<StepRecord>,
    /// SHA-256 of the lockfile before the run, if it existed
    pub digest_before: Option<String>,
    /// SHA-256 of the regenerated lockfile
    pub digest_after: Option<String>,
    /// Version changes between the old and regenerated lockfile
    pub changes: Option<LockfileDiff>,
    /// Publish result, present only when the run reached the end
    pub outcome: Option<PublishOutcome>,
    /// Error that aborted the run
    pub error: Option<String>,
}

impl RunReport {
    /// Start a report for a run of `lockfile`
    pub fn new(trigger: Trigger, lockfile: &Path) -> Self {
        Self {
            trigger,
            started_at: Utc::now(),
            revision: None,
            lockfile: lockfile.to_path_buf(),
            steps: Vec::new(),
            digest_before: None,
            digest_after: None,
            changes: None,
            outcome: None,
            error: None,
        }
    }

    /// Record a step that completed
    pub fn succeed(&mut self, step: Step, started: Instant) {
        self.push(step, StepStatus::Succeeded, started);
    }

    /// Record a step that was not needed
    pub fn skip(&mut self, step: Step, reason: impl Into<String>) {
        let reason = reason.into();
        tracing::warn!("Skipping {step}: {reason}");
        self.steps.push(StepRecord {
            step,
            status: StepStatus::Skipped { reason },
            duration_ms: 0,
        });
    }

    /// Record a failed step and hand the error back for propagation
    pub fn fail(&mut self, step: Step, started: Instant, error: PipelineError) -> PipelineError {
        tracing::error!("{step} failed: {error}");
        self.push(
            step,
            StepStatus::Failed {
                error: error.to_string(),
            },
            started,
        );
        self.error = Some(error.to_string());
        error
    }

    /// Whether the run finished with a publish outcome
    pub fn succeeded(&self) -> bool {
        self.outcome.is_some() && self.error.is_none()
    }

    /// Record of `step`, if it ran
    pub fn step(&self, step: Step) -> Option<&StepRecord> {
        self.steps.iter().find(|record| record.step == step)
    }

    fn push(&mut self, step: Step, status: StepStatus, started: Instant) {
        let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        tracing::info!("Finished {step} in {duration_ms} ms");
        self.steps.push(StepRecord {
            step,
            status,
            duration_ms,
        });
    }
}

/// Lockfile as the run found it
struct Baseline {
    lockfile: Lockfile,
    /// Exact bytes on disk, `None` when there was no lockfile
    original: Option<String>,
}

type StepObserver<'a> = Box<dyn Fn(Step) + Send + Sync + 'a>;

/// The refresh pipeline over a prepared checkout
pub struct Pipeline<'a, I, T, V> {
    settings: &'a Settings,
    repo_root: PathBuf,
    installer: I,
    tests: T,
    vcs: V,
    observer: Option<StepObserver<'a>>,
}

impl<'a, I, T, V> Pipeline<'a, I, T, V>
where
    I: PackageInstaller,
    T: TestRunner,
    V: VersionControl,
{
    /// Create a pipeline for the checkout at `repo_root`
    pub fn new(settings: &'a Settings, repo_root: &Path, installer: I, tests: T, vcs: V) -> Self {
        Self {
            settings,
            repo_root: repo_root.to_path_buf(),
            installer,
            tests,
            vcs,
            observer: None,
        }
    }

    /// Call `observer` whenever a step starts
    #[must_use]
    pub fn with_observer(mut self, observer: impl Fn(Step) + Send + Sync + 'a) -> Self {
        self.observer = Some(Box::new(observer));
        self
    }

    /// Absolute path of the lockfile
    pub fn lockfile_path(&self) -> PathBuf {
        self.repo_root.join(&self.settings.lockfile)
    }

    /// Run every step after provisioning, recording into `report`
    pub async fn run(&self, report: &mut RunReport) -> Result<PublishOutcome, PipelineError> {
        self.bootstrap(report).await?;
        let baseline = self.baseline(report).await?;
        self.eager_upgrade(report).await?;
        self.regenerate(report, &baseline.lockfile).await?;
        if let Err(e) = self.verify(report).await {
            self.restore(baseline.original.as_deref());
            return Err(e);
        }
        let outcome = self.publish(report).await?;
        report.outcome = Some(outcome.clone());
        Ok(outcome)
    }

    fn begin(&self, step: Step) -> Instant {
        tracing::info!("Starting {step}");
        if let Some(observer) = &self.observer {
            observer(step);
        }
        Instant::now()
    }

    async fn bootstrap(&self, report: &mut RunReport) -> Result<(), PipelineError> {
        let step = Step::BootstrapInstaller;
        let started = self.begin(step);
        self.installer
            .upgrade_self()
            .await
            .map_err(|source| report.fail(step, started, PipelineError::Installer { step, source }))?;
        report.succeed(step, started);
        Ok(())
    }

    async fn baseline(&self, report: &mut RunReport) -> Result<Baseline, PipelineError> {
        let step = Step::BaselineInstall;
        let path = self.lockfile_path();
        let started = self.begin(step);

        let Some(content) = lockfile::read(&path).map_err(|e| report.fail(step, started, e.into()))? else {
            report.skip(
                step,
                format!("no lockfile at {}; it will be created", self.settings.lockfile.display()),
            );
            return Ok(Baseline {
                lockfile: Lockfile::default(),
                original: None,
            });
        };
        report.digest_before = Some(lockfile::digest(&content));

        let previous = Lockfile::parse(&content);
        if previous.is_empty() {
            tracing::warn!("{} has no entries", self.settings.lockfile.display());
        } else {
            tracing::info!("Installing {} pinned entries", previous.len());
        }

        self.installer
            .install_requirements(&path)
            .await
            .map_err(|source| report.fail(step, started, PipelineError::Installer { step, source }))?;
        report.succeed(step, started);
        Ok(Baseline {
            lockfile: previous,
            original: Some(content),
        })
    }

    async fn eager_upgrade(&self, report: &mut RunReport) -> Result<(), PipelineError> {
        let step = Step::EagerUpgrade;
        let started = self.begin(step);

        let installed = self
            .installer
            .freeze()
            .await
            .map_err(|source| report.fail(step, started, PipelineError::Installer { step, source }))?;
        let packages = Lockfile::parse(&installed).package_names();
        if packages.is_empty() {
            report.skip(step, "no installed packages to upgrade");
            return Ok(());
        }

        tracing::info!("Eagerly upgrading {} package(s)", packages.len());
        self.installer
            .eager_upgrade(&packages)
            .await
            .map_err(|source| report.fail(step, started, PipelineError::Installer { step, source }))?;
        report.succeed(step, started);
        Ok(())
    }

    async fn regenerate(&self, report: &mut RunReport, previous: &Lockfile) -> Result<(), PipelineError> {
        let step = Step::Freeze;
        let started = self.begin(step);

        let frozen = self
            .installer
            .freeze()
            .await
            .map_err(|source| report.fail(step, started, PipelineError::Installer { step, source }))?;
        lockfile::write(&self.lockfile_path(), &frozen)
            .map_err(|e| report.fail(step, started, e.into()))?;

        let regenerated = Lockfile::parse(&frozen);
        let changes = previous.diff(&regenerated);
        tracing::info!(
            "Lockfile regenerated: {} upgraded, {} added, {} removed, {} unchanged",
            changes.upgraded.len(),
            changes.added.len(),
            changes.removed.len(),
            changes.unchanged
        );
        report.digest_after = Some(lockfile::digest(&frozen));
        report.changes = Some(changes);
        report.succeed(step, started);
        Ok(())
    }

    /// Put the lockfile back as the run found it
    fn restore(&self, original: Option<&str>) {
        let path = self.lockfile_path();
        match lockfile::restore(&path, original) {
            Ok(()) => tracing::info!("Restored {}", self.settings.lockfile.display()),
            Err(e) => tracing::warn!("Could not restore lockfile: {e}"),
        }
    }

    async fn verify(&self, report: &mut RunReport) -> Result<(), PipelineError> {
        let step = Step::Verify;
        let started = self.begin(step);

        self.installer
            .install_package(&self.settings.test_runner)
            .await
            .map_err(|source| report.fail(step, started, PipelineError::Installer { step, source }))?;

        self.tests.run_tests().await.map_err(|e| {
            report.fail(
                step,
                started,
                PipelineError::TestsFailed {
                    exit_code: e.exit_code(),
                    output: e.stderr().to_string(),
                },
            )
        })?;
        report.succeed(step, started);
        Ok(())
    }

    async fn publish(&self, report: &mut RunReport) -> Result<PublishOutcome, PipelineError> {
        let step = Step::Publish;
        let started = self.begin(step);
        let settings = self.settings;

        self.vcs
            .configure_identity(&settings.identity)
            .await
            .map_err(|e| report.fail(step, started, PipelineError::Commit(e)))?;
        self.vcs
            .stage(&settings.lockfile)
            .await
            .map_err(|e| report.fail(step, started, PipelineError::Commit(e)))?;
        let commit = self
            .vcs
            .commit(&settings.lockfile, &settings.commit_message)
            .await
            .map_err(|e| report.fail(step, started, PipelineError::Commit(e)))?;

        let outcome = match commit {
            CommitOutcome::NothingToCommit => {
                tracing::info!("Lockfile unchanged, nothing to commit");
                PublishOutcome::Unchanged
            }
            CommitOutcome::Committed { sha } if settings.push => {
                self.vcs
                    .push(&settings.remote, settings.branch.as_deref())
                    .await
                    .map_err(|source| {
                        report.fail(
                            step,
                            started,
                            PipelineError::Push {
                                remote: settings.remote.clone(),
                                source,
                            },
                        )
                    })?;
                tracing::info!("Pushed {sha} to {}", settings.remote);
                PublishOutcome::Changed { sha, pushed: true }
            }
            CommitOutcome::Committed { sha } => {
                tracing::info!("Committed {sha}; push disabled");
                PublishOutcome::Changed { sha, pushed: false }
            }
        };
        report.succeed(step, started);
        Ok(outcome)
    }
}
