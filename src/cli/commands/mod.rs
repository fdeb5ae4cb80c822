//! CLI command implementations
//!
//! Each command is implemented in its own submodule.

pub mod doctor;
pub mod init;
pub mod run;
pub mod schedule;

use std::path::PathBuf;

use anyhow::Result;
use clap::Subcommand;

use crate::core::settings::Overrides;
use run::RunArgs;

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Refresh the lockfile now (manual trigger)
    Run {
        #[command(flatten)]
        args: RunArgs,
    },

    /// Refresh the lockfile on a cron schedule
    Schedule {
        #[command(flatten)]
        args: RunArgs,

        /// Five-field cron expression, evaluated in UTC
        #[arg(long, env = "CDU_CRON")]
        cron: Option<String>,

        /// Print the next N fire times and exit
        #[arg(long, value_name = "N")]
        print_next: Option<usize>,

        /// Wait for the next fire time, run once and exit
        #[arg(long)]
        once: bool,
    },

    /// Check that git and the required Python are available
    Doctor {
        /// Repository root
        #[arg(long, default_value = ".", value_name = "DIR")]
        path: PathBuf,

        /// Config file [default: cdu.toml in the repository root]
        #[arg(long, value_name = "FILE")]
        config: Option<PathBuf>,

        /// Required Python version, matched by prefix (e.g. 3.9)
        #[arg(long = "python", value_name = "VERSION", env = "CDU_PYTHON_VERSION")]
        python_version: Option<String>,

        /// Use this interpreter instead of searching PATH
        #[arg(long, value_name = "PATH", env = "CDU_PYTHON_BIN")]
        python_bin: Option<PathBuf>,
    },

    /// Write a default cdu.toml
    Init {
        /// Repository root
        #[arg(long, default_value = ".", value_name = "DIR")]
        path: PathBuf,

        /// Overwrite an existing cdu.toml
        #[arg(short, long)]
        force: bool,
    },
}

impl Commands {
    /// Execute the command
    pub async fn run(self) -> Result<()> {
        match self {
            Self::Run { args } => run::execute(&args).await,
            Self::Schedule {
                args,
                cron,
                print_next,
                once,
            } => schedule::execute(&args, cron.as_deref(), print_next, once).await,
            Self::Doctor {
                path,
                config,
                python_version,
                python_bin,
            } => {
                let overrides = Overrides {
                    python_version,
                    python_bin,
                    ..Overrides::default()
                };
                doctor::execute(&path, config.as_deref(), &overrides).await
            }
            Self::Init { path, force } => init::execute(&path, force),
        }
    }
}
