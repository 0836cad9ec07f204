//! Signal collectors
//!
//! Every signal is produced by the same three-tier chain:
//!
//! 1. **Primary**: a value published by an adopted module (see `aliases`)
//! 2. **Secondary**: the collector's own source (tool, report, repo scan)
//! 3. **Neutral**: the configured default, so a run never fails just because
//!    a data source was unavailable
//!
//! Each tier reports a [`TierOutcome`]. `Degraded` moves on to the next tier
//! with a provenance note; `Fatal` aborts the run.
//!
//! The four collectors run concurrently on the rayon pool and only talk to
//! the outside world through the run context's audit queue.

mod aliases;
mod lint;
mod placeholder;
mod session;
mod test_runner;

pub use aliases::{aliases_for, numeric_value, resolve_primary, PrimaryValue, PrimaryValues};
pub use lint::{count_violations, LintCollector};
pub use placeholder::{count_lines, PlaceholderCollector};
pub use session::{entry_is_error_free, SessionCollector};
pub use test_runner::{parse_test_summary, TestCollector, TestSummary};

use crate::audit::ErrorRecord;
use crate::context::RunContext;
use crate::errors::{GateError, GateResult};
use crate::external_tool::{run_external_tool, ExternalToolResult};
use crate::models::{clamp_signal, Provenance, Signal, SignalCategory, Tier};
use rayon::prelude::*;
use std::collections::BTreeMap;
use tracing::debug;

/// A usable value from one tier
#[derive(Debug, Clone, PartialEq)]
pub struct Measurement {
    pub value: f64,
    pub source: String,
    pub raw: BTreeMap<String, f64>,
    pub notes: Vec<String>,
}

impl Measurement {
    pub fn new(value: f64, source: impl Into<String>) -> Self {
        Self {
            value: clamp_signal(value),
            source: source.into(),
            raw: BTreeMap::new(),
            notes: Vec::new(),
        }
    }

    pub fn with_raw(mut self, key: &str, value: f64) -> Self {
        self.raw.insert(key.to_string(), value);
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }
}

/// Result of one tier of the fallback chain
#[derive(Debug)]
pub enum TierOutcome {
    Ok(Measurement),
    /// Expected fallback; continue with the next tier
    Degraded(GateError),
    /// A genuine fault that must abort the run
    Fatal(GateError),
}

impl From<GateResult<Measurement>> for TierOutcome {
    fn from(result: GateResult<Measurement>) -> Self {
        match result {
            Ok(m) => TierOutcome::Ok(m),
            Err(e) if e.is_recoverable() => TierOutcome::Degraded(e),
            Err(e) => TierOutcome::Fatal(e),
        }
    }
}

/// A collector's own data source for one signal category
pub trait SignalCollector: Send + Sync {
    fn category(&self) -> SignalCategory;

    fn secondary(&self, ctx: &RunContext) -> TierOutcome;
}

pub fn default_collectors() -> Vec<Box<dyn SignalCollector>> {
    vec![
        Box::new(LintCollector),
        Box::new(TestCollector),
        Box::new(PlaceholderCollector),
        Box::new(SessionCollector),
    ]
}

/// Run the fallback chain for one collector
pub fn collect_signal(
    ctx: &RunContext,
    collector: &dyn SignalCollector,
    primary: Option<&PrimaryValue>,
) -> GateResult<Signal> {
    let category = collector.category();

    if !ctx.config().is_enabled(category) {
        debug!("{} disabled in configuration", category);
        return Ok(Signal {
            category,
            value: None,
            provenance: Provenance {
                source: "config".to_string(),
                tier: Tier::Disabled,
                raw: BTreeMap::new(),
                notes: vec!["disabled in configuration".to_string()],
            },
        });
    }

    if let Some(p) = primary {
        let mut raw = BTreeMap::new();
        raw.insert(p.key.clone(), p.value);
        return Ok(Signal {
            category,
            value: Some(p.value),
            provenance: Provenance {
                source: p.source.clone(),
                tier: Tier::Primary,
                raw,
                notes: Vec::new(),
            },
        });
    }

    let mut notes = vec![format!("no adopted module publishes {}", category)];

    match collector.secondary(ctx) {
        TierOutcome::Ok(m) => {
            notes.extend(m.notes);
            return Ok(Signal {
                category,
                value: Some(m.value),
                provenance: Provenance {
                    source: m.source,
                    tier: Tier::Secondary,
                    raw: m.raw,
                    notes,
                },
            });
        }
        TierOutcome::Degraded(err) => {
            if let GateError::ParseFailure { what, .. } = &err {
                ctx.record_error(ErrorRecord::new(
                    "2.2",
                    format!("parse {} output", category),
                    err.to_string(),
                    format!("collector={} source={}", category, what),
                ));
            }
            notes.push(err.to_string());
        }
        TierOutcome::Fatal(err) => return Err(err),
    }

    let value = clamp_signal(ctx.config().neutral.get(category));
    ctx.changelog(format!(
        "Fallback engaged for {}: neutral default {:.1} ({})",
        category,
        value,
        notes.last().map(String::as_str).unwrap_or("no source")
    ));

    Ok(Signal {
        category,
        value: Some(value),
        provenance: Provenance {
            source: "neutral-default".to_string(),
            tier: Tier::Neutral,
            raw: BTreeMap::new(),
            notes,
        },
    })
}

/// Run every collector concurrently; output follows `SignalCategory::ALL`
pub fn collect_all(
    ctx: &RunContext,
    collectors: &[Box<dyn SignalCollector>],
    primary: &PrimaryValues,
) -> GateResult<Vec<Signal>> {
    let mut signals: Vec<Signal> = collectors
        .par_iter()
        .map(|c| collect_signal(ctx, c.as_ref(), primary.get(&c.category())))
        .collect::<GateResult<Vec<_>>>()?;
    signals.sort_by_key(|s| s.category);
    Ok(signals)
}

/// Label used in error messages for a configured command
pub(crate) fn tool_label(cmd: &[String], fallback: &str) -> String {
    cmd.first()
        .and_then(|p| {
            std::path::Path::new(p)
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
        })
        .unwrap_or_else(|| fallback.to_string())
}

/// Run a configured tool from the workspace root.
///
/// A run that exits non-zero without printing anything is `ToolFailed`.
pub(crate) fn run_configured_tool(
    ctx: &RunContext,
    cmd: &[String],
    fallback_name: &str,
) -> GateResult<ExternalToolResult> {
    let label = tool_label(cmd, fallback_name);
    let timeout = ctx.config().tools.timeout_secs;
    let result = run_external_tool(cmd, &label, timeout, ctx.root(), ctx.root(), ctx.protected())?
        .into_gate_result(&label, timeout)?;

    let code = result.return_code.unwrap_or(-1);
    if code != 0 && result.stdout.trim().is_empty() {
        return Err(GateError::ToolFailed {
            tool: label,
            code: result.return_code,
            stderr: result.stderr.trim().chars().take(500).collect(),
        });
    }
    Ok(result)
}
