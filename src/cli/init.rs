//! Init command - write an example configuration file

use crate::config::{CONFIG_FILE_NAMES, EXAMPLE_CONFIG};
use anyhow::{Context, Result};
use console::style;
use std::path::Path;

/// Run the init command
pub fn run(path: &Path, force: bool) -> Result<()> {
    let root = super::workspace_root(path)?;
    let config_path = root.join(CONFIG_FILE_NAMES[0]);

    if config_path.exists() && !force {
        anyhow::bail!(
            "{} already exists (use --force to overwrite)",
            config_path.display()
        );
    }

    std::fs::write(&config_path, EXAMPLE_CONFIG)
        .with_context(|| format!("Failed to write {}", config_path.display()))?;
    println!(
        "{} Created {}",
        style("✓").green(),
        style(config_path.display()).cyan()
    );

    println!("\nNext steps:");
    println!("  {} Check external tools", style("fitness-gate doctor").cyan());
    println!("  {} Run the gate", style("fitness-gate run .").cyan());
    Ok(())
}
