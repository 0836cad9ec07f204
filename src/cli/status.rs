//! Status command - show the last persisted snapshot

use super::{load_config, workspace_root, OutputFormat};
use crate::models::Decision;
use crate::state::StateStore;
use anyhow::{Context, Result};
use console::style;
use std::path::Path;

/// Run the status command
pub fn run(path: &Path, config: Option<&Path>, format: OutputFormat) -> Result<()> {
    let root = workspace_root(path)?;
    let config = load_config(&root, config)?;
    let store = StateStore::new(&root, &config);
    let state = store
        .load()
        .with_context(|| format!("Failed to read {}", store.state_path().display()))?;
    let latest = state.latest();

    if format == OutputFormat::Json {
        let json = serde_json::to_string_pretty(&latest).context("Failed to serialize snapshot")?;
        println!("{}", json);
        return Ok(());
    }

    println!("\nfitness-gate status\n");
    println!("  Workspace: {}", style(root.display()).cyan());
    println!("  State: {}", style(store.state_path().display()).dim());
    println!();

    let Some(snapshot) = latest else {
        println!(
            "  {} No snapshot yet. Run {}",
            style("[--]").dim(),
            style("fitness-gate run").cyan()
        );
        println!();
        return Ok(());
    };

    let decision = match snapshot.decision {
        Decision::Pass => style("[PASS]").green(),
        Decision::Blocked => style("[BLOCKED]").red(),
    };
    println!(
        "  {} v{} at {} ({})",
        decision,
        snapshot.version,
        snapshot.timestamp.to_rfc3339(),
        snapshot.run_id
    );
    println!(
        "      score {:.2} vs threshold {:.2}",
        snapshot.score, snapshot.threshold
    );
    for signal in &snapshot.signals {
        let value = signal
            .value
            .map(|v| format!("{:.2}", v))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "      {:<13} {:>6}  {}",
            signal.category.to_string(),
            value,
            style(signal.provenance.tier).dim()
        );
    }

    let pruned = snapshot.pruned().count();
    if pruned > 0 {
        println!("      {} module(s) pruned", style(pruned).yellow());
    }
    println!();
    Ok(())
}
