//! Placeholder signal: unresolved-marker density across the repository
//!
//! `Placeholder = max(0, 100 - c × hits / kloc)` with `kloc = max(1, loc / 1000)`

use super::{Measurement, SignalCollector, TierOutcome};
use crate::context::RunContext;
use crate::errors::{GateError, GateResult};
use crate::models::SignalCategory;
use crate::scanner::{normalize_rel, WorkspaceScanner};
use rayon::prelude::*;
use regex::Regex;
use std::path::Path;
use tracing::{debug, warn};

/// Bytes inspected for a NUL when sniffing binary content
const BINARY_SNIFF_LEN: usize = 8192;

/// Number of lines in `bytes` (a trailing partial line counts)
pub fn count_lines(bytes: &[u8]) -> usize {
    if bytes.is_empty() {
        return 0;
    }
    let newlines = memchr::memchr_iter(b'\n', bytes).count();
    if bytes.last() == Some(&b'\n') {
        newlines
    } else {
        newlines + 1
    }
}

fn marker_regex(markers: &[String]) -> GateResult<Option<Regex>> {
    let alternatives: Vec<String> = markers
        .iter()
        .map(|m| m.trim())
        .filter(|m| !m.is_empty())
        .map(regex::escape)
        .collect();
    if alternatives.is_empty() {
        return Ok(None);
    }
    Regex::new(&format!(r"(?i)\b(?:{})\b", alternatives.join("|")))
        .map(Some)
        .map_err(|e| GateError::Config(format!("invalid placeholder markers: {}", e)))
}

#[derive(Debug, Default, Clone, Copy)]
struct ScanTotals {
    files: usize,
    loc: usize,
    hits: usize,
}

impl ScanTotals {
    fn merge(self, other: Self) -> Self {
        Self {
            files: self.files + other.files,
            loc: self.loc + other.loc,
            hits: self.hits + other.hits,
        }
    }
}

pub struct PlaceholderCollector;

impl PlaceholderCollector {
    fn scan_file(path: &Path, max_bytes: u64, skip_ext: &[String], re: Option<&Regex>) -> ScanTotals {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();
        if skip_ext.iter().any(|s| s.eq_ignore_ascii_case(&ext)) {
            return ScanTotals::default();
        }
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() <= max_bytes => {}
            Ok(_) => {
                debug!("Skipping large file {}", path.display());
                return ScanTotals::default();
            }
            Err(e) => {
                warn!("Cannot stat {}: {}", path.display(), e);
                return ScanTotals::default();
            }
        }

        let bytes = match std::fs::read(path) {
            Ok(b) => b,
            Err(e) => {
                warn!("Cannot read {}: {}", path.display(), e);
                return ScanTotals::default();
            }
        };
        let sniff = &bytes[..bytes.len().min(BINARY_SNIFF_LEN)];
        if memchr::memchr(0, sniff).is_some() {
            return ScanTotals::default();
        }

        let text = String::from_utf8_lossy(&bytes);
        ScanTotals {
            files: 1,
            loc: count_lines(&bytes),
            hits: re.map(|r| r.find_iter(&text).count()).unwrap_or(0),
        }
    }

    fn scan(&self, ctx: &RunContext) -> GateResult<Measurement> {
        let config = ctx.config();
        let re = marker_regex(&config.placeholder.markers)?;

        // The gate's own artifacts and config would otherwise feed back
        // into the next run, and so would a state document moved aside
        // as `<state>.corrupt-<timestamp>`
        let scanner = WorkspaceScanner::new(ctx.root(), config)
            .excluding(config.owned_paths(ctx.root()));
        let corrupt_prefix = format!("{}.corrupt-", normalize_rel(&config.paths.state));
        let files: Vec<_> = scanner
            .walk_files()
            .paths
            .into_iter()
            .filter(|p| !ctx.rel(p).starts_with(&corrupt_prefix))
            .collect();

        let totals = files
            .par_iter()
            .map(|p| {
                Self::scan_file(
                    p,
                    config.placeholder.max_file_bytes,
                    &config.placeholder.skip_extensions,
                    re.as_ref(),
                )
            })
            .reduce(ScanTotals::default, ScanTotals::merge);

        if totals.files == 0 {
            return Err(GateError::NoSource("no readable text files in workspace".to_string()));
        }

        let kloc = (totals.loc as f64 / 1000.0).max(1.0);
        let c = config.placeholder.penalty_per_kloc;
        let value = (100.0 - c * totals.hits as f64 / kloc).max(0.0);
        debug!(
            "Placeholder scan: {} hits in {} lines across {} files",
            totals.hits, totals.loc, totals.files
        );

        Ok(Measurement::new(value, "repository-scan")
            .with_raw("files", totals.files as f64)
            .with_raw("loc", totals.loc as f64)
            .with_raw("hits", totals.hits as f64))
    }
}

impl SignalCollector for PlaceholderCollector {
    fn category(&self) -> SignalCategory {
        SignalCategory::Placeholders
    }

    fn secondary(&self, ctx: &RunContext) -> TierOutcome {
        self.scan(ctx).into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GateConfig;
    use crate::models::Mode;
    use std::fs;

    fn measure(root: &Path) -> TierOutcome {
        let ctx = RunContext::new(root, GateConfig::default(), Mode::Enforce);
        PlaceholderCollector.secondary(&ctx)
    }

    #[test]
    fn test_count_lines() {
        assert_eq!(count_lines(b""), 0);
        assert_eq!(count_lines(b"a"), 1);
        assert_eq!(count_lines(b"a\nb\n"), 2);
        assert_eq!(count_lines(b"a\nb"), 2);
    }

    #[test]
    fn test_markers_whole_word_case_insensitive() {
        let re = marker_regex(&["TODO".into(), "XXX".into()]).unwrap().unwrap();
        let text = "// todo: fix\n// TODOS are fine\n# xxx\nlet mastodon = 1;";
        assert_eq!(re.find_iter(text).count(), 2);
        assert!(marker_regex(&[]).unwrap().is_none());
    }

    #[test]
    fn test_density_penalty() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        let mut body = String::new();
        for i in 0..2000 {
            if i < 3 {
                body.push_str("# TODO: tidy\n");
            } else {
                body.push_str("x = 1\n");
            }
        }
        fs::write(root.join("app.py"), body).unwrap();

        match measure(root) {
            TierOutcome::Ok(m) => {
                // 3 hits over 2 kloc at c = 10
                assert!((m.value - 85.0).abs() < 1e-9);
                assert_eq!(m.raw["hits"], 3.0);
                assert_eq!(m.raw["loc"], 2000.0);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_small_repo_uses_one_kloc_floor() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.rs"), "// FIXME\nfn main() {}\n").unwrap();
        match measure(dir.path()) {
            TierOutcome::Ok(m) => assert!((m.value - 90.0).abs() < 1e-9),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_gate_artifacts_and_binaries_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::write(root.join("main.py"), "print('ok')\n").unwrap();
        fs::write(root.join("CHANGELOG_COMPLIANCE.md"), "- TODO TODO TODO\n").unwrap();
        fs::write(root.join("fitness-gate.toml"), "markers = [\"TODO\"]\n").unwrap();
        fs::write(root.join("logo.png"), "TODO").unwrap();
        fs::write(root.join("blob.dat"), b"TODO\0TODO").unwrap();

        match measure(root) {
            TierOutcome::Ok(m) => {
                assert_eq!(m.value, 100.0);
                assert_eq!(m.raw["files"], 1.0);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_moved_aside_state_document_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("docs")).unwrap();
        fs::write(
            root.join("docs/status_index.json.corrupt-20260101T000000Z"),
            "{ \"note\": \"TODO FIXME TODO\"",
        )
        .unwrap();
        fs::write(root.join("main.py"), "print('ok')\n").unwrap();

        match measure(root) {
            TierOutcome::Ok(m) => {
                assert_eq!(m.value, 100.0);
                assert_eq!(m.raw["files"], 1.0);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_empty_workspace_has_no_source() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            measure(dir.path()),
            TierOutcome::Degraded(GateError::NoSource(_))
        ));
    }
}
