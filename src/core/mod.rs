//! Core business logic
//!
//! Lockfile handling, scheduling, settings resolution and the refresh
//! pipeline. External programs are reached only through the traits in
//! [`tools`]; their implementations live in [`crate::infra`].
//!
//! # Submodules
//!
//! - [`lockfile`] - Lockfile parsing, diffing and I/O
//! - [`schedule`] - Cron expressions and triggers
//! - [`settings`] - `cdu.toml` loading, overrides and validation
//! - [`tools`] - Installer, test runner and version-control interfaces
//! - [`pipeline`] - Ordered refresh steps and the run report
//! - [`publish`] - Commit and publish outcomes
//! - [`doctor`] - Environment checks

pub mod doctor;
pub mod lockfile;
pub mod pipeline;
pub mod publish;
pub mod schedule;
pub mod settings;
pub mod tools;
