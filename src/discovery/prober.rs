//! Dynamic module prober
//!
//! Loads each candidate manifest, checks it for a well-known entrypoint and
//! sorts it into the adopted or pruned set. Pruned candidates are moved to
//! quarantine with a changelog line each.

use super::manifest::{load_manifest, Entrypoint};
use super::quarantine::quarantine_module;
use crate::audit::ErrorRecord;
use crate::context::RunContext;
use crate::errors::{GateError, GateResult};
use crate::models::{DiscoveryResult, ModuleOutcome, PruneReason};
use crate::scanner::WorkspaceScanner;
use serde_json::{Map, Value as JsonValue};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// A candidate that exposes a usable entrypoint
#[derive(Debug, Clone)]
pub struct AdoptedModule {
    pub path: PathBuf,
    pub rel_path: String,
    pub entrypoint_name: String,
    pub entrypoint: Entrypoint,
}

/// Output of one module's entrypoint
#[derive(Debug, Clone)]
pub struct ModuleOutput {
    /// `<rel path>::<entrypoint>`
    pub source: String,
    pub values: Map<String, JsonValue>,
}

#[derive(Debug, Default)]
pub struct Discovery {
    /// One entry per candidate, in scan order
    pub results: Vec<DiscoveryResult>,
    pub adopted: Vec<AdoptedModule>,
}

impl Discovery {
    pub fn pruned_count(&self) -> usize {
        self.results.len() - self.adopted.len()
    }
}

/// Scan, probe and prune.
///
/// Only a protected-path violation is fatal; load and quarantine failures
/// are recorded and the run continues.
pub fn discover_modules(ctx: &RunContext) -> GateResult<Discovery> {
    let config = ctx.config();
    let scanner = WorkspaceScanner::new(ctx.root(), config)
        .excluding(&config.session.dirs)
        .excluding(config.owned_paths(ctx.root()));
    let candidates = scanner.scan_candidates(&config.scan.keywords, &config.scan.extensions);

    let mut discovery = Discovery::default();
    for path in candidates.paths {
        let rel = ctx.rel(&path);
        match load_manifest(&path) {
            Err(err) => {
                ctx.record_error(ErrorRecord::new(
                    "1.1",
                    "module load",
                    err.to_string(),
                    format!("candidate={}", rel),
                ));
                let result = prune(ctx, &path, &rel, PruneReason::LoadFailure, err.to_string())?;
                discovery.results.push(result);
            }
            Ok(manifest) => match manifest.select_entrypoint() {
                Some((name, entrypoint)) => {
                    debug!("Adopted {} via {}", rel, name);
                    discovery.results.push(DiscoveryResult {
                        path: rel.clone(),
                        outcome: ModuleOutcome::Adopted {
                            entrypoint: name.to_string(),
                        },
                    });
                    discovery.adopted.push(AdoptedModule {
                        path: path.clone(),
                        rel_path: rel,
                        entrypoint_name: name.to_string(),
                        entrypoint: entrypoint.clone(),
                    });
                }
                None => {
                    let declared: Vec<&str> =
                        manifest.entrypoints.keys().map(String::as_str).collect();
                    let detail = if declared.is_empty() {
                        "declares no entrypoints".to_string()
                    } else {
                        format!("declares only [{}]", declared.join(", "))
                    };
                    let result = prune(ctx, &path, &rel, PruneReason::NoEntrypoint, detail)?;
                    discovery.results.push(result);
                }
            },
        }
    }

    info!(
        "Discovery: {} adopted, {} pruned",
        discovery.adopted.len(),
        discovery.pruned_count()
    );
    Ok(discovery)
}

fn prune(
    ctx: &RunContext,
    path: &Path,
    rel: &str,
    reason: PruneReason,
    detail: String,
) -> GateResult<DiscoveryResult> {
    let quarantined_to = match quarantine_module(ctx, path) {
        Ok(dest) => {
            let dest_rel = ctx.rel(&dest);
            ctx.changelog(format!("Pruned {} -> {} ({})", rel, dest_rel, reason));
            Some(dest_rel)
        }
        Err(err @ GateError::ProtectedPath(_)) => return Err(err),
        Err(err) => {
            ctx.record_error(ErrorRecord::new(
                "1.2",
                "quarantine module",
                err.to_string(),
                format!("candidate={} reason={}", rel, reason),
            ));
            None
        }
    };

    Ok(DiscoveryResult {
        path: rel.to_string(),
        outcome: ModuleOutcome::Pruned {
            reason,
            detail,
            quarantined_to,
        },
    })
}

/// Invoke every adopted entrypoint once, in scan order. Failures are
/// recorded and the module contributes nothing.
pub fn invoke_adopted(ctx: &RunContext, adopted: &[AdoptedModule]) -> Vec<ModuleOutput> {
    adopted
        .iter()
        .filter_map(|module| {
            match module.entrypoint.invoke(ctx, &module.entrypoint_name) {
                Ok(values) => Some(ModuleOutput {
                    source: format!("{}::{}", module.rel_path, module.entrypoint_name),
                    values,
                }),
                Err(err) => {
                    ctx.record_error(ErrorRecord::new(
                        "2.1",
                        "invoke module entrypoint",
                        err.to_string(),
                        format!("module={} entrypoint={}", module.rel_path, module.entrypoint_name),
                    ));
                    None
                }
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::AuditEvent;
    use crate::config::GateConfig;
    use crate::models::Mode;
    use std::fs;

    fn ctx(root: &Path) -> RunContext {
        RunContext::new(root, GateConfig::default(), Mode::Enforce)
    }

    #[test]
    fn test_adopts_and_prunes() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::write(
            root.join("metrics_ingestion.toml"),
            "[entrypoints.collect_metrics]\nvalues = { lint = 90 }\n",
        )
        .unwrap();
        fs::write(
            root.join("collect_helpers.toml"),
            "[entrypoints.helper]\nvalues = { lint = 10 }\n",
        )
        .unwrap();

        let ctx = ctx(root);
        let discovery = discover_modules(&ctx).unwrap();

        assert_eq!(discovery.adopted.len(), 1);
        assert_eq!(discovery.adopted[0].rel_path, "metrics_ingestion.toml");
        assert_eq!(discovery.pruned_count(), 1);
        assert!(root.join("quarantine/collect_helpers.toml").exists());
        assert!(!root.join("collect_helpers.toml").exists());

        let pruned = &discovery.results[0];
        assert_eq!(pruned.path, "collect_helpers.toml");
        assert!(matches!(
            &pruned.outcome,
            ModuleOutcome::Pruned { reason: PruneReason::NoEntrypoint, quarantined_to: Some(q), .. }
                if q == "quarantine/collect_helpers.toml"
        ));
    }

    #[test]
    fn test_unparsable_candidate_records_one_error_and_one_line() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::write(root.join("update_stats.json"), "{ broken").unwrap();

        let ctx = ctx(root);
        let discovery = discover_modules(&ctx).unwrap();
        assert!(matches!(
            &discovery.results[0].outcome,
            ModuleOutcome::Pruned { reason: PruneReason::LoadFailure, .. }
        ));

        let events = ctx.drain_audit();
        let errors: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                AuditEvent::Error(r) => Some(r),
                _ => None,
            })
            .collect();
        let lines: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                AuditEvent::Changelog { text, .. } => Some(text),
                _ => None,
            })
            .collect();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].step, "1.1");
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains("update_stats.json -> quarantine/update_stats.json"));
    }

    #[test]
    fn test_session_dirs_are_not_candidates() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("logs/session")).unwrap();
        fs::write(root.join("logs/session/metrics_run.json"), "[]").unwrap();

        let discovery = discover_modules(&ctx(root)).unwrap();
        assert!(discovery.results.is_empty());
        assert!(root.join("logs/session/metrics_run.json").exists());
    }

    #[test]
    fn test_gate_owned_files_are_not_candidates() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("docs")).unwrap();
        fs::create_dir_all(root.join("ci")).unwrap();
        fs::write(root.join("docs/metrics_status.json"), "{}").unwrap();
        fs::write(root.join("collect_report.json"), r#"{"summary": {"passed": 3}}"#).unwrap();
        fs::write(root.join("ci/metrics_gate.json"), r#"{"threshold": 50.0}"#).unwrap();

        let mut config = GateConfig::default();
        config.paths.state = "docs/metrics_status.json".to_string();
        config.tools.test_report = Some("collect_report.json".to_string());
        config.source = Some(root.join("ci/metrics_gate.json"));
        let ctx = RunContext::new(root, config, Mode::Enforce);

        let discovery = discover_modules(&ctx).unwrap();
        assert!(discovery.results.is_empty(), "{:?}", discovery.results);
        assert!(root.join("docs/metrics_status.json").exists());
        assert!(root.join("collect_report.json").exists());
        assert!(root.join("ci/metrics_gate.json").exists());
        assert!(!root.join("quarantine").exists());
    }

    #[test]
    fn test_invoke_adopted_records_failures() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        let ctx = ctx(root);
        let adopted = vec![AdoptedModule {
            path: root.join("metrics.toml"),
            rel_path: "metrics.toml".into(),
            entrypoint_name: "main".into(),
            entrypoint: Entrypoint {
                command: Some(vec!["fitness-gate-missing-producer-9c2e".into()]),
                ..Default::default()
            },
        }];
        assert!(invoke_adopted(&ctx, &adopted).is_empty());
        let events = ctx.drain_audit();
        assert!(matches!(&events[0], AuditEvent::Error(r) if r.step == "2.1"));
    }
}
