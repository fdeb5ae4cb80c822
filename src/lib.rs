//! cdu - Continuous Dependency Updating
//!
//! Keeps a Python project's pinned dependency lockfile current: install the
//! pins, eagerly upgrade everything, re-freeze, run the tests, and commit and
//! push the lockfile only when the suite passes.
//!
//! # Architecture
//!
//! - [`cli`] - Command-line interface parsing and output formatting
//! - [`core`] - Lockfile model, scheduling, settings and the refresh pipeline
//! - [`infra`] - Infrastructure layer (processes, git, Python, directories)
//! - [`config`] - Constants and defaults
//! - [`error`] - Error types and handling

pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod infra;

#[cfg(test)]
pub mod test_utils;
