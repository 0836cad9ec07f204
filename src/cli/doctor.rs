//! Doctor command - check configuration and external tools

use super::{load_config, workspace_root};
use crate::config::GateConfig;
use crate::external_tool::is_tool_installed;
use crate::gate::EXIT_PASS;
use crate::models::SignalCategory;
use anyhow::Result;
use console::style;
use std::path::Path;

fn check_tool(config: &GateConfig, category: SignalCategory, cmd: &[String], report: Option<&str>) {
    if !config.is_enabled(category) {
        println!("{} {}: disabled", style("○").dim(), category);
        return;
    }
    let label = cmd.join(" ");
    if is_tool_installed(cmd) {
        println!("{} {}: {}", style("✓").green(), category, label);
    } else {
        println!(
            "{} {}: {} not found (neutral default will be used)",
            style("○").yellow(),
            category,
            style(cmd.first().map(String::as_str).unwrap_or("<empty>")).yellow()
        );
    }
    if let Some(report) = report {
        println!("  report artifact: {}", style(report).dim());
    }
}

pub fn run(path: &Path, config: Option<&Path>) -> Result<u8> {
    println!("fitness-gate doctor\n");

    let root = workspace_root(path)?;
    let config = load_config(&root, config)?;
    println!(
        "{} Configuration: OK (threshold {:.2})",
        style("✓").green(),
        config.threshold
    );

    check_tool(
        &config,
        SignalCategory::Lint,
        &config.tools.lint_command,
        config.tools.lint_report.as_deref(),
    );
    check_tool(
        &config,
        SignalCategory::Tests,
        &config.tools.test_command,
        config.tools.test_report.as_deref(),
    );

    let session_dirs: Vec<&str> = config
        .session
        .dirs
        .iter()
        .filter(|d| root.join(d).is_dir())
        .map(String::as_str)
        .collect();
    if session_dirs.is_empty() {
        println!("{} sessions: no session log directory found", style("○").yellow());
    } else {
        println!("{} sessions: {}", style("✓").green(), session_dirs.join(", "));
    }

    println!("\nDone.");
    Ok(EXIT_PASS)
}
