//! Append-only compliance changelog

use super::error_doc::append_text;
use crate::errors::GateResult;
use chrono::{DateTime, SecondsFormat, Utc};
use std::path::{Path, PathBuf};

pub fn format_changelog_line(at: DateTime<Utc>, text: &str) -> String {
    // Keep one event per line even if the text carries newlines
    let flat = text.replace(['\r', '\n'], " ");
    format!(
        "- {}: {}\n",
        at.to_rfc3339_opts(SecondsFormat::Secs, true),
        flat
    )
}

#[derive(Debug, Clone)]
pub struct Changelog {
    path: PathBuf,
}

impl Changelog {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append_lines(&self, lines: &[String]) -> GateResult<()> {
        if lines.is_empty() {
            return Ok(());
        }
        append_text(&self.path, &lines.concat())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_line_format() {
        let at = Utc.with_ymd_and_hms(2026, 10, 19, 8, 30, 0).unwrap();
        assert_eq!(
            format_changelog_line(at, "ENFORCEMENT PASS"),
            "- 2026-10-19T08:30:00Z: ENFORCEMENT PASS\n"
        );
        assert_eq!(
            format_changelog_line(at, "a\nb"),
            "- 2026-10-19T08:30:00Z: a b\n"
        );
    }

    #[test]
    fn test_existing_content_is_kept() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("CHANGELOG_COMPLIANCE.md");
        std::fs::write(&path, "# Compliance changelog\n").unwrap();

        let log = Changelog::new(path.clone());
        log.append_lines(&["- t: one\n".to_string()]).unwrap();
        log.append_lines(&["- t: two\n".to_string()]).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text, "# Compliance changelog\n- t: one\n- t: two\n");
    }
}
