//! Gate pipeline
//!
//! Orchestrates one full run:
//! 1. Scan for candidate modules, adopt or prune them
//! 2. Invoke adopted entrypoints for primary values
//! 3. Run the signal collectors in parallel
//! 4. Renormalize weights and compute the composite score
//! 5. Enforce the threshold
//! 6. Persist the snapshot and flush the audit log

use crate::audit::{AuditLog, ErrorRecord, FlushSummary};
use crate::config::GateConfig;
use crate::context::RunContext;
use crate::discovery::{discover_modules, invoke_adopted};
use crate::errors::GateResult;
use crate::gate::{evaluate, Enforcement};
use crate::models::{Mode, RunSnapshot, SignalCategory};
use crate::scoring::{composite_score, WeightSet};
use crate::signals::{collect_all, default_collectors, resolve_primary, SignalCollector};
use crate::state::StateStore;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Progress callback, called with a short stage description
pub type ProgressCallback = Box<dyn Fn(&str) + Send + Sync>;

/// Everything a finished run produced
#[derive(Debug)]
pub struct RunOutcome {
    pub snapshot: RunSnapshot,
    pub enforcement: Enforcement,
    pub state_path: PathBuf,
    pub audit: FlushSummary,
}

pub struct Pipeline {
    root: PathBuf,
    config: GateConfig,
    mode: Mode,
    workers: usize,
    collectors: Vec<Box<dyn SignalCollector>>,
    progress_callback: Option<ProgressCallback>,
}

impl Pipeline {
    pub fn new(root: &Path, config: GateConfig) -> Self {
        Self {
            root: root.to_path_buf(),
            config,
            mode: Mode::Enforce,
            workers: 4,
            collectors: default_collectors(),
            progress_callback: None,
        }
    }

    pub fn with_mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    /// Threads used for the collectors
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn with_collectors(mut self, collectors: Vec<Box<dyn SignalCollector>>) -> Self {
        self.collectors = collectors;
        self
    }

    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.progress_callback = Some(callback);
        self
    }

    fn progress(&self, stage: &str) {
        if let Some(ref callback) = self.progress_callback {
            callback(stage);
        }
    }

    /// Run every stage. Audit events are flushed even when a stage fails.
    pub fn run(self) -> GateResult<RunOutcome> {
        let ctx = RunContext::new(&self.root, self.config.clone(), self.mode);
        let audit = AuditLog::new(ctx.root(), ctx.config());
        info!("Gate run {} in {:?} mode", ctx.run_id(), ctx.mode());

        let mut flushed = FlushSummary::default();
        let result = self.run_stages(&ctx, &audit, &mut flushed);

        match audit.flush(ctx.drain_audit()) {
            Ok(summary) => {
                flushed.errors += summary.errors;
                flushed.changelog_lines += summary.changelog_lines;
            }
            Err(e) if result.is_err() => warn!("Could not flush audit log: {}", e),
            Err(e) => return Err(e),
        }

        let mut outcome = result?;
        outcome.audit = flushed;
        Ok(outcome)
    }

    fn run_stages(
        &self,
        ctx: &RunContext,
        audit: &AuditLog,
        flushed: &mut FlushSummary,
    ) -> GateResult<RunOutcome> {
        let store = StateStore::new(ctx.root(), ctx.config());
        let state = store.load()?;
        if let Some(aside) = &state.recovered_from {
            ctx.record_error(ErrorRecord::new(
                "3.1",
                "load state document",
                "state document could not be parsed",
                format!("moved to {}", ctx.rel(aside)),
            ));
        }

        self.progress("Discovering candidate modules...");
        let discovery = discover_modules(ctx)?;
        *flushed = audit.flush(ctx.drain_audit())?;

        let outputs = invoke_adopted(ctx, &discovery.adopted);
        let primary = resolve_primary(&outputs);
        debug!("Primary values for {} categories", primary.len());

        self.progress("Collecting signals...");
        let signals = match rayon::ThreadPoolBuilder::new()
            .num_threads(self.workers)
            .build()
        {
            Ok(pool) => pool.install(|| collect_all(ctx, &self.collectors, &primary))?,
            Err(e) => {
                warn!("Falling back to the global thread pool: {}", e);
                collect_all(ctx, &self.collectors, &primary)?
            }
        };

        self.progress("Scoring...");
        let present: BTreeSet<SignalCategory> = signals
            .iter()
            .filter(|s| s.is_present())
            .map(|s| s.category)
            .collect();
        let weights = WeightSet::for_present(&ctx.config().weights, &present);
        let raw_score = composite_score(&signals, &weights);
        let enforcement = evaluate(raw_score, ctx.config().threshold, ctx.mode());

        let version = store.next_version(&state);
        let snapshot = RunSnapshot {
            version,
            run_id: ctx.run_id().to_string(),
            timestamp: ctx.started_at(),
            mode: ctx.mode(),
            signals,
            weights,
            score: enforcement.score,
            threshold: enforcement.threshold,
            decision: enforcement.decision,
            discovery: discovery.results,
        };

        self.progress("Persisting snapshot...");
        store.persist(state, &snapshot)?;
        ctx.changelog(format!(
            "ENFORCEMENT {}: score {:.2} vs threshold {:.2} (snapshot v{}{})",
            enforcement.decision,
            enforcement.score,
            enforcement.threshold,
            version,
            if enforcement.overridden {
                ", write-only override"
            } else {
                ""
            }
        ));
        info!(
            "Snapshot v{} persisted: {:.2} -> {}",
            version, enforcement.score, enforcement.decision
        );

        Ok(RunOutcome {
            snapshot,
            enforcement,
            state_path: store.state_path().to_path_buf(),
            audit: FlushSummary::default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Decision, Tier};
    use std::fs;

    /// Config whose external tools can never be found
    fn offline_config() -> GateConfig {
        let mut config = GateConfig::default();
        config.tools.lint_command = vec!["fitness-gate-absent-linter-0e1f".into()];
        config.tools.test_command = vec!["fitness-gate-absent-runner-0e1f".into()];
        config
    }

    #[test]
    fn test_all_neutral_run_persists_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let outcome = Pipeline::new(dir.path(), offline_config())
            .with_workers(2)
            .run()
            .unwrap();

        // lint 80, tests 50, placeholders 80, sessions 80
        assert!((outcome.snapshot.score - 68.0).abs() < 1e-9);
        assert_eq!(outcome.enforcement.decision, Decision::Blocked);
        assert_eq!(outcome.snapshot.version, 1);
        assert!(outcome.state_path.exists());
        for signal in &outcome.snapshot.signals {
            assert_eq!(signal.provenance.tier, Tier::Neutral);
        }
        assert!(outcome.audit.changelog_lines >= 5);
    }

    #[test]
    fn test_primary_values_from_adopted_module() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("metrics_ingestion.toml"),
            "[entrypoints.compute_compliance_metrics]\n\
             values = { lint = 90, tests = 95, placeholders = 80, sessions = 100 }\n",
        )
        .unwrap();

        let outcome = Pipeline::new(dir.path(), offline_config()).run().unwrap();
        assert!((outcome.snapshot.score - 92.0).abs() < 1e-9);
        assert_eq!(outcome.enforcement.decision, Decision::Pass);
        assert!(outcome
            .snapshot
            .signals
            .iter()
            .all(|s| s.provenance.tier == Tier::Primary));
    }

    #[test]
    fn test_write_only_mode_passes() {
        let dir = tempfile::tempdir().unwrap();
        let outcome = Pipeline::new(dir.path(), offline_config())
            .with_mode(Mode::WriteOnly)
            .run()
            .unwrap();
        assert_eq!(outcome.enforcement.decision, Decision::Pass);
        assert!(outcome.enforcement.overridden);
        assert_eq!(outcome.snapshot.mode, Mode::WriteOnly);
    }

    #[test]
    fn test_versions_increase_across_runs() {
        let dir = tempfile::tempdir().unwrap();
        let first = Pipeline::new(dir.path(), offline_config()).run().unwrap();
        let second = Pipeline::new(dir.path(), offline_config()).run().unwrap();
        assert_eq!(first.snapshot.version, 1);
        assert_eq!(second.snapshot.version, 2);
        assert_eq!(first.snapshot.score, second.snapshot.score);
    }

    #[test]
    fn test_failed_persist_records_no_enforcement_line() {
        let dir = tempfile::tempdir().unwrap();
        let config = offline_config();
        fs::create_dir_all(dir.path().join("docs")).unwrap();
        fs::write(dir.path().join(&config.paths.snapshots), "not a directory").unwrap();
        let changelog = dir.path().join(&config.paths.changelog);

        let err = Pipeline::new(dir.path(), config).run().unwrap_err();
        assert!(matches!(err, crate::errors::GateError::StateWrite { .. }), "{:?}", err);

        let lines = fs::read_to_string(changelog).unwrap_or_default();
        assert!(lines.contains("Fallback engaged"));
        assert!(!lines.contains("ENFORCEMENT"));
    }
}
