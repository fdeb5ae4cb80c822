//! CLI implementation for `cdu run`
//!
//! A manual run: prepare the workspace, provision Python, run the refresh
//! pipeline and print the report. `cdu schedule` reuses [`perform`] for every
//! scheduled run.

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Args;

use crate::cli::output::{
    create_spinner, is_json, is_quiet, print_detail, print_success, print_warning, status, verbosity,
};
use crate::config::defaults::{CONFIG_FILE_NAME, DEFAULT_LOCKFILE};
use crate::core::pipeline::{Pipeline, RunReport, Step, StepStatus};
use crate::core::publish::PublishOutcome;
use crate::core::schedule::Trigger;
use crate::core::settings::{Overrides, ProjectConfig, Settings};
use crate::error::PipelineError;
use crate::infra::dirs::CduDirs;
use crate::infra::git::GitCli;
use crate::infra::python::{self, ModuleTestRunner, Pip};
use crate::infra::workspace::{Source, Workspace};

/// Options shared by `cdu run` and `cdu schedule`
#[derive(Args, Debug, Clone, Default)]
pub struct RunArgs {
    /// Repository root to update in place
    #[arg(long, default_value = ".", value_name = "DIR")]
    pub path: PathBuf,

    /// Clone this repository into a temporary workspace instead of using --path
    #[arg(long, value_name = "URL", conflicts_with = "path")]
    pub repo: Option<String>,

    /// Config file [default: cdu.toml in the repository root]
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Required Python version, matched by prefix (e.g. 3.9)
    #[arg(long = "python", value_name = "VERSION", env = "CDU_PYTHON_VERSION")]
    pub python_version: Option<String>,

    /// Use this interpreter instead of searching PATH
    #[arg(long, value_name = "PATH", env = "CDU_PYTHON_BIN")]
    pub python_bin: Option<PathBuf>,

    /// Lockfile path relative to the repository root
    #[arg(long, value_name = "PATH", env = "CDU_LOCKFILE")]
    pub lockfile: Option<PathBuf>,

    /// Install into the interpreter directly instead of a throwaway venv
    #[arg(long)]
    pub no_venv: bool,

    /// Remote to push to
    #[arg(long, env = "CDU_REMOTE")]
    pub remote: Option<String>,

    /// Branch to push to [default: the current branch]
    #[arg(long, env = "CDU_BRANCH")]
    pub branch: Option<String>,

    /// Commit the refreshed lockfile but do not push it
    #[arg(long)]
    pub no_push: bool,
}

impl RunArgs {
    /// Command-line overrides for settings resolution
    pub fn overrides(&self, cron: Option<&str>) -> Overrides {
        Overrides {
            python_version: self.python_version.clone(),
            python_bin: self.python_bin.clone(),
            no_venv: self.no_venv,
            lockfile: self.lockfile.clone(),
            remote: self.remote.clone(),
            branch: self.branch.clone(),
            no_push: self.no_push,
            cron: cron.map(String::from),
        }
    }

    /// Where the repository for a run comes from
    pub fn source(&self) -> Source {
        match &self.repo {
            Some(url) => Source::Remote(url.clone()),
            None => Source::Local(self.path.clone()),
        }
    }

    /// Config file for a checkout rooted at `root`
    pub fn config_path(&self, root: &Path) -> PathBuf {
        self.config
            .clone()
            .unwrap_or_else(|| root.join(CONFIG_FILE_NAME))
    }

    /// Load and resolve settings for a checkout rooted at `root`
    pub fn settings(&self, root: &Path, cron: Option<&str>) -> Result<Settings> {
        let path = self.config_path(root);
        let config = ProjectConfig::load_from_path(&path)?;
        let settings = config
            .resolve(&self.overrides(cron))
            .with_context(|| format!("Invalid configuration in {}", path.display()))?;
        Ok(settings)
    }
}

/// A finished run: the report plus how it ended
#[derive(Debug)]
pub struct RunOutcome {
    pub report: RunReport,
    pub result: Result<PublishOutcome, PipelineError>,
}

/// Execute one run
///
/// Pipeline failures are captured in the returned [`RunOutcome`]; only
/// configuration errors surface as `Err`.
pub async fn perform(args: &RunArgs, trigger: Trigger, cron: Option<&str>) -> Result<RunOutcome> {
    let dirs = CduDirs::new();
    let lockfile = args.lockfile.as_deref().unwrap_or(Path::new(DEFAULT_LOCKFILE));
    let mut report = RunReport::new(trigger, lockfile);
    tracing::info!("Starting {trigger} run");

    let spinner = create_spinner("Preparing workspace...");
    let started = Instant::now();
    let workspace = match Workspace::prepare(&args.source(), &dirs).await {
        Ok(workspace) => workspace,
        Err(e) => {
            spinner.finish_and_clear();
            let error = report.fail(Step::Checkout, started, e);
            return Ok(RunOutcome {
                report,
                result: Err(error),
            });
        }
    };
    if workspace.is_ephemeral() {
        tracing::info!("Working in a fresh clone at {}", workspace.root().display());
    }
    report.revision = workspace.revision().map(String::from);
    report.succeed(Step::Checkout, started);

    let settings = match args.settings(workspace.root(), cron) {
        Ok(settings) => settings,
        Err(e) => {
            spinner.finish_and_clear();
            return Err(e);
        }
    };
    report.lockfile.clone_from(&settings.lockfile);

    spinner.set_message(format!("Provisioning Python {}...", settings.python_version));
    let started = Instant::now();
    let runtime = match python::provision(
        &settings.python_version,
        settings.python_bin.as_deref(),
        settings.use_venv,
        &dirs.envs_dir(),
    )
    .await
    {
        Ok(runtime) => runtime,
        Err(e) => {
            spinner.finish_and_clear();
            let error = report.fail(Step::Provision, started, e);
            return Ok(RunOutcome {
                report,
                result: Err(error),
            });
        }
    };
    tracing::info!(
        "Using Python {} at {} ({})",
        runtime.interpreter().version,
        runtime.python().display(),
        if runtime.is_isolated() { "virtual environment" } else { "interpreter environment" }
    );
    report.succeed(Step::Provision, started);

    let root = workspace.root();
    let python = runtime.python();
    let progress = spinner.clone();
    let pipeline = Pipeline::new(
        &settings,
        root,
        Pip::new(python, root),
        ModuleTestRunner::new(python, &settings.test_runner, &settings.test_args, root),
        GitCli::new(root),
    )
    .with_observer(move |step| progress.set_message(format!("Running {step}...")));

    let result = pipeline.run(&mut report).await;
    spinner.finish_and_clear();

    Ok(RunOutcome { report, result })
}

/// Print a report as text or JSON
pub fn print_report(outcome: &RunOutcome) -> Result<()> {
    let report = &outcome.report;
    if is_json() {
        println!(
            "{}",
            serde_json::to_string_pretty(report).context("Failed to serialize run report")?
        );
        return Ok(());
    }

    if !is_quiet() {
        for record in &report.steps {
            match &record.status {
                StepStatus::Succeeded => {
                    println!("  {} {} ({} ms)", status::SUCCESS, record.step, record.duration_ms);
                }
                StepStatus::Skipped { reason } => {
                    println!("  {} {} skipped: {reason}", status::WARNING, record.step);
                }
                StepStatus::Failed { error } => {
                    println!("  {} {}", status::ERROR, record.step);
                    if verbosity() > 0 {
                        print_detail(error);
                    }
                }
            }
        }
    }

    if let Some(changes) = &report.changes {
        if changes.is_empty() {
            print_detail(&format!("{} unchanged", report.lockfile.display()));
        } else {
            for change in &changes.upgraded {
                print_detail(&format!("{} {} -> {}", change.name, change.from, change.to));
            }
            for package in &changes.added {
                print_detail(&format!("+ {}=={}", package.name, package.version));
            }
            for package in &changes.removed {
                print_detail(&format!("- {}=={}", package.name, package.version));
            }
        }
    }

    match &outcome.result {
        Ok(PublishOutcome::Changed { sha, pushed: true }) => {
            print_success(&format!("Committed {} and pushed", short_sha(sha)));
        }
        Ok(PublishOutcome::Changed { sha, pushed: false }) => {
            print_success(&format!("Committed {} (push disabled)", short_sha(sha)));
        }
        Ok(PublishOutcome::Unchanged) => {
            print_success("Dependencies already up to date, nothing to commit");
        }
        Err(PipelineError::TestsFailed { output, .. }) if !output.trim().is_empty() => {
            print_warning("Test output (tail):");
            for line in output.lines() {
                eprintln!("    {line}");
            }
        }
        Err(_) => {}
    }
    Ok(())
}

fn short_sha(sha: &str) -> &str {
    sha.get(..7).unwrap_or(sha)
}

/// Turn a finished run into the command's exit status
pub fn into_result(outcome: RunOutcome) -> Result<()> {
    match outcome.result {
        Ok(_) => Ok(()),
        Err(e) => Err(anyhow::Error::new(e).context("Dependency update failed")),
    }
}

/// Execute the run command
pub async fn execute(args: &RunArgs) -> Result<()> {
    let outcome = perform(args, Trigger::Manual, None).await?;
    print_report(&outcome)?;
    into_result(outcome)
}
