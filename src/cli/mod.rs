//! CLI command definitions and handlers

mod doctor;
mod init;
mod run;
mod status;

use crate::config::{load_gate_config, GateConfig};
use crate::gate::EXIT_PASS;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

/// Parse and validate workers count (1-64)
fn parse_workers(s: &str) -> Result<usize, String> {
    let n: usize = s
        .parse()
        .map_err(|_| format!("'{}' is not a valid number", s))?;
    if n == 0 {
        Err("workers must be at least 1".to_string())
    } else if n > 64 {
        Err("workers cannot exceed 64".to_string())
    } else {
        Ok(n)
    }
}

/// fitness-gate - composite fitness scoring and compliance gate
#[derive(Parser, Debug)]
#[command(name = "fitness-gate")]
#[command(
    version,
    about = "Aggregate lint, test, placeholder and session signals into one score and gate on it",
    long_about = "fitness-gate discovers metric producer modules in a workspace, collects four \
quality signals with graceful fallbacks, folds them into a weighted 0-100 score and \
blocks when the score falls below the configured threshold.\n\n\
Every run persists a versioned snapshot and appends to an audit trail.\n\n\
Run without a subcommand to gate the current directory:\n  \
fitness-gate .",
    after_help = "\
Examples:
  fitness-gate .                        Gate the current directory
  fitness-gate . --format json          Print the snapshot as JSON
  fitness-gate . --write-only           Record the snapshot but never block
  fitness-gate status                   Show the last persisted decision
  fitness-gate doctor                   Check external tools

Exit codes: 0 = PASS, 2 = BLOCKED, 1 = internal error"
)]
pub struct Cli {
    /// Path to workspace (default: current directory)
    #[arg(global = true, default_value = ".")]
    pub path: PathBuf,

    /// Log level (error, warn, info, debug, trace); RUST_LOG takes precedence
    #[arg(long, global = true, default_value = "warn", value_parser = ["error", "warn", "info", "debug", "trace"])]
    pub log_level: String,

    /// Number of parallel workers (1-64)
    #[arg(long, global = true, default_value = "4", value_parser = parse_workers)]
    pub workers: usize,

    /// Config file (default: fitness-gate.toml or .fitness-gate.json in PATH)
    #[arg(long, global = true, env = "FITNESS_GATE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Output format: text or json
    #[arg(long, short = 'f', global = true, default_value = "text", value_parser = ["text", "json"])]
    pub format: String,

    /// Persist the snapshot but always report PASS
    #[arg(long, global = true)]
    pub write_only: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Compute signals, score and enforce the threshold (default)
    #[command(after_help = "\
Examples:
  fitness-gate run .                    Gate the current directory
  fitness-gate run . --format json      Snapshot as JSON on stdout
  fitness-gate run . --workers 8        More collector threads
  fitness-gate run . --write-only       Never exit with BLOCKED")]
    Run,

    /// Show the last persisted snapshot and enforcement decision
    #[command(after_help = "\
Examples:
  fitness-gate status                   Summary of the last run
  fitness-gate status --format json     Last snapshot as JSON")]
    Status,

    /// Write an example fitness-gate.toml
    Init {
        /// Overwrite an existing config file
        #[arg(long)]
        force: bool,
    },

    /// Check that configured external tools are available
    Doctor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

impl OutputFormat {
    fn parse(s: &str) -> Self {
        if s.eq_ignore_ascii_case("json") {
            OutputFormat::Json
        } else {
            OutputFormat::Text
        }
    }
}

/// Resolve the workspace root to an absolute directory
pub(crate) fn workspace_root(path: &Path) -> Result<PathBuf> {
    let root = path
        .canonicalize()
        .with_context(|| format!("Path does not exist: {}", path.display()))?;
    if !root.is_dir() {
        anyhow::bail!("Path is not a directory: {}", root.display());
    }
    Ok(root)
}

pub(crate) fn load_config(root: &Path, explicit: Option<&Path>) -> Result<GateConfig> {
    load_gate_config(root, explicit)
        .with_context(|| format!("Failed to load configuration for {}", root.display()))
}

/// Run the selected command, returning the process exit status
pub fn run(cli: Cli) -> Result<u8> {
    let format = OutputFormat::parse(&cli.format);
    match cli.command {
        Some(Commands::Status) => {
            status::run(&cli.path, cli.config.as_deref(), format)?;
            Ok(EXIT_PASS)
        }
        Some(Commands::Init { force }) => {
            init::run(&cli.path, force)?;
            Ok(EXIT_PASS)
        }
        Some(Commands::Doctor) => doctor::run(&cli.path, cli.config.as_deref()),
        Some(Commands::Run) | None => run::run(run::RunArgs {
            path: cli.path,
            config: cli.config,
            format,
            workers: cli.workers,
            write_only: cli.write_only,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_workers() {
        assert_eq!(parse_workers("1"), Ok(1));
        assert_eq!(parse_workers("64"), Ok(64));
        assert!(parse_workers("0").is_err());
        assert!(parse_workers("65").is_err());
        assert!(parse_workers("many").is_err());
    }

    #[test]
    fn test_default_command_is_run() {
        let cli = Cli::try_parse_from(["fitness-gate", "some/dir", "--write-only"]).unwrap();
        assert!(cli.command.is_none());
        assert!(cli.write_only);
        assert_eq!(cli.path, PathBuf::from("some/dir"));
        assert_eq!(cli.log_level, "warn");
    }

    #[test]
    fn test_subcommand_with_global_flags() {
        let cli =
            Cli::try_parse_from(["fitness-gate", "init", "--force", "--format", "json"]).unwrap();
        assert!(matches!(cli.command, Some(Commands::Init { force: true })));
        assert_eq!(OutputFormat::parse(&cli.format), OutputFormat::Json);
    }

    #[test]
    fn test_rejects_unknown_format() {
        assert!(Cli::try_parse_from(["fitness-gate", "--format", "xml"]).is_err());
    }
}
