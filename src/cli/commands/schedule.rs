//! CLI implementation for `cdu schedule`
//!
//! Sleeps until the next fire time of the cron expression, performs a run,
//! and repeats. Runs are strictly sequential: a run that overlaps the next
//! fire time simply delays it.

use anyhow::{Context, Result};
use chrono::Utc;

use crate::cli::commands::run::{into_result, perform, print_report, RunArgs};
use crate::cli::output::{is_json, print_info, print_warning};
use crate::core::schedule::{CronSchedule, Trigger};

/// Resolve the cron expression from `--cron`, the config file, or the default
fn resolve_schedule(args: &RunArgs, cron: Option<&str>) -> Result<CronSchedule> {
    // The config of an ephemeral clone is not available before the first run.
    let root = match &args.repo {
        Some(_) => std::env::current_dir().context("Failed to read current directory")?,
        None => args.path.clone(),
    };
    Ok(args.settings(&root, cron)?.schedule)
}

/// Print the next `count` fire times
fn print_upcoming(schedule: &CronSchedule, count: usize) -> Result<()> {
    let times = schedule.upcoming(Utc::now(), count);
    if is_json() {
        let json = serde_json::json!({
            "cron": schedule.expression(),
            "next": times.iter().map(chrono::DateTime::to_rfc3339).collect::<Vec<_>>(),
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&json).context("Failed to serialize schedule")?
        );
    } else {
        for time in times {
            println!("{}", time.to_rfc3339());
        }
    }
    Ok(())
}

/// Run one scheduled pipeline and print its report
async fn scheduled_run(args: &RunArgs, cron: Option<&str>) -> Result<()> {
    let outcome = perform(args, Trigger::Scheduled, cron).await?;
    print_report(&outcome)?;
    into_result(outcome)
}

/// Execute the schedule command
pub async fn execute(
    args: &RunArgs,
    cron: Option<&str>,
    print_next: Option<usize>,
    once: bool,
) -> Result<()> {
    let schedule = resolve_schedule(args, cron)?;

    if let Some(count) = print_next {
        return print_upcoming(&schedule, count);
    }

    print_info(&format!("Scheduling dependency updates at '{schedule}' (UTC)"));

    loop {
        let now = Utc::now();
        let next = schedule.require_next_after(now)?;
        let wait = (next - now).to_std().unwrap_or_default();
        print_info(&format!("Next run at {}", next.to_rfc3339()));
        tracing::info!("Sleeping {}s until {next}", wait.as_secs());

        tokio::select! {
            () = tokio::time::sleep(wait) => {}
            _ = tokio::signal::ctrl_c() => {
                print_info("Scheduler stopped");
                return Ok(());
            }
        }

        let result = tokio::select! {
            result = scheduled_run(args, cron) => result,
            _ = tokio::signal::ctrl_c() => {
                print_warning("Interrupted during a run");
                return Ok(());
            }
        };

        if once {
            return result;
        }
        if let Err(e) = result {
            tracing::error!("Scheduled run failed: {e:#}");
            print_warning(&format!("Scheduled run failed: {e:#}"));
        }
    }
}
