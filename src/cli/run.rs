//! Run command - collect signals, score and enforce

use super::{load_config, workspace_root, OutputFormat};
use crate::gate::EXIT_BLOCKED;
use crate::models::{Decision, Mode, Signal, Tier};
use crate::pipeline::{Pipeline, RunOutcome};
use anyhow::{Context, Result};
use console::style;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::path::PathBuf;
use std::time::Duration;

pub(crate) struct RunArgs {
    pub path: PathBuf,
    pub config: Option<PathBuf>,
    pub format: OutputFormat,
    pub workers: usize,
    pub write_only: bool,
}

fn create_spinner(visible: bool) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    if !visible {
        spinner.set_draw_target(ProgressDrawTarget::hidden());
        return spinner;
    }
    if let Ok(style) = ProgressStyle::default_spinner()
        .tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ ")
        .template("{spinner:.green} {msg}")
    {
        spinner.set_style(style);
    }
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner
}

pub(crate) fn run(args: RunArgs) -> Result<u8> {
    let root = workspace_root(&args.path)?;
    let config = load_config(&root, args.config.as_deref())?;
    let mode = if args.write_only {
        Mode::WriteOnly
    } else {
        Mode::Enforce
    };

    let show_progress = args.format == OutputFormat::Text && console::Term::stderr().is_term();
    let spinner = create_spinner(show_progress);
    let progress = spinner.clone();

    let outcome = Pipeline::new(&root, config)
        .with_mode(mode)
        .with_workers(args.workers)
        .with_progress(Box::new(move |stage: &str| {
            progress.set_message(stage.to_string())
        }))
        .run();
    spinner.finish_and_clear();
    let outcome = outcome.with_context(|| format!("Gate run failed for {}", root.display()))?;

    match args.format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(&outcome.snapshot)
                .context("Failed to serialize snapshot")?;
            println!("{}", json);
        }
        OutputFormat::Text => print_summary(&outcome),
    }

    if outcome.enforcement.decision == Decision::Blocked {
        eprintln!(
            "{} score {:.2} is below threshold {:.2}",
            style("BLOCKED:").red().bold(),
            outcome.enforcement.score,
            outcome.enforcement.threshold
        );
        return Ok(EXIT_BLOCKED);
    }
    Ok(outcome.enforcement.exit_code())
}

fn format_signal(signal: &Signal, weight: f64) -> String {
    let value = match signal.value {
        Some(v) => format!("{:6.2}", v),
        None => "     -".to_string(),
    };
    let tier = match signal.provenance.tier {
        Tier::Primary => style(signal.provenance.tier.to_string()).green(),
        Tier::Secondary => style(signal.provenance.tier.to_string()).cyan(),
        Tier::Neutral => style(signal.provenance.tier.to_string()).yellow(),
        Tier::Disabled => style(signal.provenance.tier.to_string()).dim(),
    };
    format!(
        "  {:<13} {}  w={:.3}  {:<10} {}",
        signal.category.to_string(),
        value,
        weight,
        tier,
        style(&signal.provenance.source).dim()
    )
}

fn print_summary(outcome: &RunOutcome) {
    let snapshot = &outcome.snapshot;
    println!("\nfitness-gate snapshot v{}\n", snapshot.version);

    for signal in &snapshot.signals {
        let weight = snapshot.weights.active_weight(signal.category);
        println!("{}", format_signal(signal, weight));
        for note in &signal.provenance.notes {
            println!("      {}", style(note).dim());
        }
    }

    let pruned: Vec<_> = snapshot.pruned().collect();
    let adopted = snapshot.discovery.len() - pruned.len();
    println!(
        "\n  Modules: {} adopted, {} pruned",
        style(adopted).cyan(),
        style(pruned.len()).yellow()
    );
    if outcome.audit.errors > 0 {
        println!(
            "  {} error record(s) appended",
            style(outcome.audit.errors).yellow()
        );
    }

    let decision = match snapshot.decision {
        Decision::Pass => style(snapshot.decision.to_string()).green().bold(),
        Decision::Blocked => style(snapshot.decision.to_string()).red().bold(),
    };
    let overridden = if outcome.enforcement.overridden {
        format!(" {}", style("(write-only)").dim())
    } else {
        String::new()
    };
    println!(
        "\n  Score: {:.2} / threshold {:.2}  {}{}",
        snapshot.score, snapshot.threshold, decision, overridden
    );
    println!("  State: {}\n", style(outcome.state_path.display()).dim());
}
