//! fitness-gate - composite fitness scoring and compliance gate

use clap::error::ErrorKind;
use clap::Parser;
use fitness_gate::audit::{ErrorDocument, ErrorRecord};
use fitness_gate::cli::{self, Commands};
use fitness_gate::config::{load_gate_config, GateConfig};
use fitness_gate::gate::EXIT_INTERNAL;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Append the fault to the error document if the workspace is reachable
fn record_fatal(path: &Path, config: Option<&Path>, err: &anyhow::Error) {
    let Ok(root) = path.canonicalize() else {
        return;
    };
    if !root.is_dir() {
        return;
    }
    let config = load_gate_config(&root, config).unwrap_or_else(|_| GateConfig::default());
    let record = ErrorRecord::new(
        "X.X",
        "gate run",
        err.to_string(),
        format!("{:#}", err),
    );
    if let Err(e) = ErrorDocument::new(root.join(&config.paths.errors)).append(&[record]) {
        tracing::warn!("Could not record fatal error: {}", e);
    }
}

fn main() -> ExitCode {
    // Usage errors exit 1 so that 2 always means BLOCKED
    let cli = match cli::Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            return match err.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => ExitCode::SUCCESS,
                _ => ExitCode::from(EXIT_INTERNAL),
            };
        }
    };

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let path: PathBuf = cli.path.clone();
    let config = cli.config.clone();
    let is_gate_run = matches!(cli.command, None | Some(Commands::Run));
    match cli::run(cli) {
        Ok(code) => ExitCode::from(code),
        Err(err) => {
            eprintln!("[FATAL] {:#}", err);
            if is_gate_run {
                record_fatal(&path, config.as_deref(), &err);
            }
            ExitCode::from(EXIT_INTERNAL)
        }
    }
}
