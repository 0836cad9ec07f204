//! Session signal: share of error-free runtime session entries
//!
//! Reads `*.json` and `*.jsonl` files under the configured session
//! directories. A JSON document is an array of entries, an object with an
//! `events` or `sessions` array, or a single entry object.

use super::{Measurement, SignalCollector, TierOutcome};
use crate::audit::ErrorRecord;
use crate::context::RunContext;
use crate::errors::{GateError, GateResult};
use crate::models::SignalCategory;
use ignore::WalkBuilder;
use serde_json::Value as JsonValue;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// An entry is error-free when its `error` field is absent, null, false or empty
pub fn entry_is_error_free(entry: &JsonValue) -> bool {
    let Some(obj) = entry.as_object() else {
        return false;
    };
    match obj.get("error") {
        None | Some(JsonValue::Null) | Some(JsonValue::Bool(false)) => true,
        Some(JsonValue::String(s)) => s.trim().is_empty(),
        Some(JsonValue::Array(a)) => a.is_empty(),
        Some(JsonValue::Object(o)) => o.is_empty(),
        Some(_) => false,
    }
}

fn entries_of(doc: JsonValue) -> Vec<JsonValue> {
    match doc {
        JsonValue::Array(items) => items,
        JsonValue::Object(mut obj) => {
            for key in ["events", "sessions"] {
                if matches!(obj.get(key), Some(JsonValue::Array(_))) {
                    if let Some(JsonValue::Array(items)) = obj.remove(key) {
                        return items;
                    }
                }
            }
            vec![JsonValue::Object(obj)]
        }
        other => vec![other],
    }
}

fn parse_session_file(path: &Path) -> Result<Vec<JsonValue>, String> {
    let text = std::fs::read_to_string(path).map_err(|e| e.to_string())?;
    let is_jsonl = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("jsonl"));

    if is_jsonl {
        text.lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(i, line)| {
                serde_json::from_str::<JsonValue>(line).map_err(|e| format!("line {}: {}", i + 1, e))
            })
            .collect()
    } else {
        serde_json::from_str::<JsonValue>(&text)
            .map(entries_of)
            .map_err(|e| e.to_string())
    }
}

pub struct SessionCollector;

impl SessionCollector {
    fn session_files(ctx: &RunContext) -> Vec<PathBuf> {
        let mut files = Vec::new();
        for dir in &ctx.config().session.dirs {
            let base = ctx.resolve(dir);
            if !base.is_dir() || ctx.protected().contains(ctx.root(), &base) {
                continue;
            }
            // Log directories are usually git-ignored, so no standard filters
            let walker = WalkBuilder::new(&base).standard_filters(false).build();
            for entry in walker {
                let entry = match entry {
                    Ok(e) => e,
                    Err(err) => {
                        warn!("Skipping unreadable session entry: {}", err);
                        continue;
                    }
                };
                let path = entry.path();
                if !entry.file_type().is_some_and(|t| t.is_file()) {
                    continue;
                }
                let rel = ctx.rel(path);
                if rel.to_lowercase().contains("workflow") || ctx.protected().contains_rel(&rel) {
                    continue;
                }
                let is_log = path
                    .extension()
                    .and_then(|e| e.to_str())
                    .is_some_and(|e| e.eq_ignore_ascii_case("json") || e.eq_ignore_ascii_case("jsonl"));
                if is_log {
                    files.push(path.to_path_buf());
                }
            }
        }
        files.sort();
        files.dedup();
        files
    }

    fn measure(&self, ctx: &RunContext) -> GateResult<Measurement> {
        let files = Self::session_files(ctx);
        if files.is_empty() {
            return Err(GateError::NoSource("no session logs found".to_string()));
        }

        let (mut total, mut error_free, mut parsed_files) = (0usize, 0usize, 0usize);
        for path in &files {
            match parse_session_file(path) {
                Ok(entries) => {
                    parsed_files += 1;
                    total += entries.len();
                    error_free += entries.iter().filter(|e| entry_is_error_free(e)).count();
                }
                Err(detail) => {
                    ctx.record_error(ErrorRecord::new(
                        "2.2",
                        "parse session log",
                        detail,
                        format!("file={}", ctx.rel(path)),
                    ));
                }
            }
        }

        if total == 0 {
            return Err(GateError::NoSource(format!(
                "{} session log(s) contained no entries",
                files.len()
            )));
        }

        debug!("Sessions: {}/{} error-free", error_free, total);
        Ok(
            Measurement::new(100.0 * error_free as f64 / total as f64, "session-logs")
                .with_raw("files", parsed_files as f64)
                .with_raw("entries", total as f64)
                .with_raw("error_free", error_free as f64),
        )
    }
}

impl SignalCollector for SessionCollector {
    fn category(&self) -> SignalCategory {
        SignalCategory::Sessions
    }

    fn secondary(&self, ctx: &RunContext) -> TierOutcome {
        self.measure(ctx).into()
    }
}
