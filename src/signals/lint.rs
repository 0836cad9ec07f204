//! Lint signal: `max(0, 100 - k × violations)`

use super::{run_configured_tool, Measurement, SignalCollector, TierOutcome};
use crate::audit::ErrorRecord;
use crate::context::RunContext;
use crate::errors::{GateError, GateResult};
use crate::models::SignalCategory;
use serde_json::Value as JsonValue;
use tracing::debug;

pub struct LintCollector;

/// Violation count from a linter's JSON output.
///
/// Accepts a findings array, an object carrying a `violations`, `count`,
/// `issues` or `total` field (number or array), or a bare number.
pub fn count_violations(output: &JsonValue) -> Option<f64> {
    let count = match output {
        JsonValue::Array(items) => Some(items.len() as f64),
        JsonValue::Number(n) => n.as_f64(),
        JsonValue::Object(map) => ["violations", "count", "issues", "total"]
            .iter()
            .find_map(|key| match map.get(*key)? {
                JsonValue::Array(items) => Some(items.len() as f64),
                JsonValue::Number(n) => n.as_f64(),
                _ => None,
            }),
        _ => None,
    };
    count.filter(|n| n.is_finite() && *n >= 0.0)
}

fn parse_output(text: &str) -> Option<f64> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    match serde_json::from_str::<JsonValue>(trimmed) {
        Ok(json) => count_violations(&json),
        Err(_) => trimmed.parse::<u64>().ok().map(|n| n as f64),
    }
}

impl LintCollector {
    fn score(ctx: &RunContext, violations: f64, source: String) -> Measurement {
        let k = ctx.config().lint.penalty_per_violation;
        Measurement::new((100.0 - k * violations).max(0.0), source).with_raw("violations", violations)
    }

    /// Pre-generated report, if one is configured and present
    fn from_report(&self, ctx: &RunContext) -> Option<Measurement> {
        let rel = ctx.config().tools.lint_report.as_deref()?;
        let path = ctx.resolve(rel);
        if !path.is_file() {
            return None;
        }
        let parsed = std::fs::read_to_string(&path)
            .map_err(|e| e.to_string())
            .and_then(|text| parse_output(&text).ok_or_else(|| "no violation count found".to_string()));

        match parsed {
            Ok(violations) => {
                debug!("Lint report {}: {} violations", rel, violations);
                Some(Self::score(ctx, violations, rel.to_string()))
            }
            Err(detail) => {
                ctx.record_error(ErrorRecord::new(
                    "2.2",
                    "parse lint report",
                    detail,
                    format!("report={}", rel),
                ));
                None
            }
        }
    }

    fn from_tool(&self, ctx: &RunContext) -> GateResult<Measurement> {
        let cmd = &ctx.config().tools.lint_command;
        let result = run_configured_tool(ctx, cmd, "lint")?;
        let source = super::tool_label(cmd, "lint");
        let violations = parse_output(&result.stdout).ok_or_else(|| GateError::ParseFailure {
            what: source.clone(),
            detail: format!(
                "unrecognized output: {}",
                result.stdout.trim().chars().take(200).collect::<String>()
            ),
        })?;
        Ok(Self::score(ctx, violations, source))
    }
}

impl SignalCollector for LintCollector {
    fn category(&self) -> SignalCategory {
        SignalCategory::Lint
    }

    fn secondary(&self, ctx: &RunContext) -> TierOutcome {
        if let Some(m) = self.from_report(ctx) {
            return TierOutcome::Ok(m);
        }
        self.from_tool(ctx).into()
    }
}
