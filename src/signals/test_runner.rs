//! Test signal: `100 × passed / total`

use super::{run_configured_tool, tool_label, Measurement, SignalCollector, TierOutcome};
use crate::audit::ErrorRecord;
use crate::context::RunContext;
use crate::errors::{GateError, GateResult};
use crate::models::SignalCategory;
use regex::Regex;
use serde_json::Value as JsonValue;
use std::sync::OnceLock;

fn pytest_count() -> &'static Regex {
    static PYTEST_COUNT: OnceLock<Regex> = OnceLock::new();
    PYTEST_COUNT
        .get_or_init(|| Regex::new(r"(\d+) (passed|failed|errors?)\b").expect("valid regex"))
}

fn libtest_result() -> &'static Regex {
    static LIBTEST_RESULT: OnceLock<Regex> = OnceLock::new();
    LIBTEST_RESULT.get_or_init(|| {
        Regex::new(r"test result: \w+\. (\d+) passed; (\d+) failed;").expect("valid regex")
    })
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TestSummary {
    pub passed: u64,
    pub failed: u64,
    pub errors: u64,
    pub total: u64,
}

impl TestSummary {
    fn from_counts(passed: u64, failed: u64, errors: u64) -> Self {
        Self {
            passed,
            failed,
            errors,
            total: passed + failed + errors,
        }
    }

    /// Pass percentage; an empty run scores 0
    pub fn score(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        100.0 * self.passed as f64 / self.total as f64
    }
}

/// Parse a test runner's console output.
///
/// Rust libtest `test result:` lines are summed; otherwise the last pytest
/// summary line is used.
pub fn parse_test_summary(output: &str) -> Option<TestSummary> {
    let mut libtest: Option<TestSummary> = None;
    for caps in libtest_result().captures_iter(output) {
        let passed: u64 = caps[1].parse().unwrap_or(0);
        let failed: u64 = caps[2].parse().unwrap_or(0);
        let acc = libtest.get_or_insert_with(TestSummary::default);
        *acc = TestSummary::from_counts(acc.passed + passed, acc.failed + failed, 0);
    }
    if libtest.is_some() {
        return libtest;
    }

    let summary_line = output
        .lines()
        .rev()
        .find(|line| pytest_count().is_match(line));
    if let Some(line) = summary_line {
        let (mut passed, mut failed, mut errors) = (0, 0, 0);
        for caps in pytest_count().captures_iter(line) {
            let n: u64 = caps[1].parse().unwrap_or(0);
            match &caps[2] {
                "passed" => passed += n,
                "failed" => failed += n,
                _ => errors += n,
            }
        }
        return Some(TestSummary::from_counts(passed, failed, errors));
    }

    if output.contains("no tests ran") {
        return Some(TestSummary::default());
    }
    None
}

/// pytest-json-report `summary` object
fn summary_from_report(json: &JsonValue) -> Option<TestSummary> {
    let summary = json.get("summary")?.as_object()?;
    let count = |key: &str| summary.get(key).and_then(JsonValue::as_u64).unwrap_or(0);
    let (passed, failed) = (count("passed"), count("failed"));
    let errors = count("error") + count("errors");
    let total = summary
        .get("total")
        .and_then(JsonValue::as_u64)
        .unwrap_or(passed + failed + errors);
    Some(TestSummary {
        passed,
        failed,
        errors,
        total,
    })
}

fn measurement(summary: TestSummary, source: String) -> Measurement {
    Measurement::new(summary.score(), source)
        .with_raw("passed", summary.passed as f64)
        .with_raw("failed", summary.failed as f64)
        .with_raw("errors", summary.errors as f64)
        .with_raw("total", summary.total as f64)
}

pub struct TestCollector;

impl TestCollector {
    fn from_report(&self, ctx: &RunContext) -> Option<Measurement> {
        let rel = ctx.config().tools.test_report.as_deref()?;
        let path = ctx.resolve(rel);
        if !path.is_file() {
            return None;
        }
        let parsed = std::fs::read_to_string(&path)
            .map_err(|e| e.to_string())
            .and_then(|text| serde_json::from_str::<JsonValue>(&text).map_err(|e| e.to_string()))
            .and_then(|json| {
                summary_from_report(&json).ok_or_else(|| "missing `summary` object".to_string())
            });

        match parsed {
            Ok(summary) => Some(measurement(summary, rel.to_string())),
            Err(detail) => {
                ctx.record_error(ErrorRecord::new(
                    "2.2",
                    "parse test report",
                    detail,
                    format!("report={}", rel),
                ));
                None
            }
        }
    }

    fn from_tool(&self, ctx: &RunContext) -> GateResult<Measurement> {
        let cmd = &ctx.config().tools.test_command;
        let result = run_configured_tool(ctx, cmd, "tests")?;
        let source = tool_label(cmd, "tests");
        let combined = format!("{}\n{}", result.stdout, result.stderr);

        if let Some(summary) = parse_test_summary(&combined) {
            return Ok(measurement(summary, source));
        }
        if result.return_code == Some(0) {
            return Ok(Measurement::new(100.0, source)
                .with_note("exit status 0 without a parsable summary"));
        }
        Err(GateError::ParseFailure {
            what: source,
            detail: format!("no test summary in output (exit {:?})", result.return_code),
        })
    }
}

impl SignalCollector for TestCollector {
    fn category(&self) -> SignalCategory {
        SignalCategory::Tests
    }

    fn secondary(&self, ctx: &RunContext) -> TierOutcome {
        if let Some(m) = self.from_report(ctx) {
            return TierOutcome::Ok(m);
        }
        self.from_tool(ctx).into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GateConfig;
    use crate::models::Mode;

    fn ctx_with(config: GateConfig) -> (tempfile::TempDir, RunContext) {
        let dir = tempfile::tempdir().unwrap();
        let ctx = RunContext::new(dir.path(), config, Mode::Enforce);
        (dir, ctx)
    }

    #[test]
    fn test_pytest_summary() {
        let out = "....F.\nFAILED tests/test_a.py::test_x - assert 1 == 2\n1 failed, 5 passed, 2 errors in 0.42s\n";
        let s = parse_test_summary(out).unwrap();
        assert_eq!(s, TestSummary { passed: 5, failed: 1, errors: 2, total: 8 });
        assert!((s.score() - 62.5).abs() < 1e-9);
    }

    #[test]
    fn test_libtest_results_are_summed() {
        let out = "\
running 3 tests
test result: ok. 3 passed; 0 failed; 0 ignored; 0 measured; 0 filtered out
running 2 tests
test result: FAILED. 1 passed; 1 failed; 0 ignored; 0 measured; 0 filtered out
";
        let s = parse_test_summary(out).unwrap();
        assert_eq!(s.passed, 4);
        assert_eq!(s.failed, 1);
        assert_eq!(s.total, 5);
    }

    #[test]
    fn test_no_tests_ran_scores_zero() {
        let s = parse_test_summary("\nno tests ran in 0.01s\n").unwrap();
        assert_eq!(s.total, 0);
        assert_eq!(s.score(), 0.0);
        assert!(parse_test_summary("random noise").is_none());
    }

    #[test]
    fn test_report_artifact() {
        let mut config = GateConfig::default();
        config.tools.test_command = vec!["fitness-gate-no-runner-77aa".into()];
        let (dir, ctx) = ctx_with(config);
        std::fs::write(
            dir.path().join(".report.json"),
            r#"{"summary": {"passed": 19, "failed": 1, "total": 20, "collected": 20}}"#,
        )
        .unwrap();
        match TestCollector.secondary(&ctx) {
            TierOutcome::Ok(m) => {
                assert_eq!(m.value, 95.0);
                assert_eq!(m.source, ".report.json");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_corrupt_report_falls_through_to_runner() {
        let mut config = GateConfig::default();
        config.tools.test_command = vec!["fitness-gate-no-runner-77aa".into()];
        let (dir, ctx) = ctx_with(config);
        std::fs::write(dir.path().join(".report.json"), "not json").unwrap();

        assert!(matches!(
            TestCollector.secondary(&ctx),
            TierOutcome::Degraded(GateError::ToolUnavailable { .. })
        ));
        assert_eq!(ctx.drain_audit().len(), 1);
    }

    #[cfg(unix)]
    #[test]
    fn test_clean_exit_without_summary_is_full_marks() {
        let mut config = GateConfig::default();
        config.tools.test_report = None;
        config.tools.test_command = vec!["sh".into(), "-c".into(), "echo done".into()];
        let (_dir, ctx) = ctx_with(config);
        match TestCollector.secondary(&ctx) {
            TierOutcome::Ok(m) => assert_eq!(m.value, 100.0),
            other => panic!("unexpected {:?}", other),
        }
    }
}
