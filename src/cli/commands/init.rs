//! CLI implementation for `cdu init`
//!
//! Writes a commented `cdu.toml` holding the default settings.

use std::path::Path;

use anyhow::{Context, Result};

use crate::cli::output::{is_json, print_detail, print_success};
use crate::core::settings::write_default_config;

/// Execute the init command
pub fn execute(path: &Path, force: bool) -> Result<()> {
    let config_path = write_default_config(path, force)
        .with_context(|| format!("Failed to initialize cdu in {}", path.display()))?;

    if is_json() {
        let json = serde_json::json!({
            "status": "success",
            "config": config_path.display().to_string(),
        });
        println!("{}", serde_json::to_string_pretty(&json).unwrap_or_default());
        return Ok(());
    }

    print_success(&format!("Initialized cdu in {}", path.display()));
    print_detail(&format!("Created {}", config_path.display()));
    print_detail("Run 'cdu doctor' to check that git and Python are available.");
    Ok(())
}
