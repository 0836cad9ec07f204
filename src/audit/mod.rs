//! Error sink and audit log
//!
//! Every stage reports failures and notable events through an [`AuditSink`].
//! Events go into a single-writer queue and are appended to disk by
//! [`AuditLog::flush`] once the concurrent stages have finished, so parallel
//! collectors never interleave writes to the same file.
//!
//! - `error_doc`: Q&A-formatted error blocks for later triage
//! - `changelog`: one timestamped bullet per pruning, fallback or decision

mod changelog;
mod error_doc;

pub use changelog::{format_changelog_line, Changelog};
pub use error_doc::{render_error_block, ErrorDocument, ErrorRecord, MAX_CONTEXT_CHARS};

use crate::config::GateConfig;
use crate::errors::GateResult;
use chrono::{DateTime, Utc};
use crossbeam_channel::{unbounded, Receiver, Sender};
use std::path::Path;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub enum AuditEvent {
    Error(ErrorRecord),
    Changelog { at: DateTime<Utc>, text: String },
}

/// Cloneable producer handle for audit events
#[derive(Debug, Clone)]
pub struct AuditSink {
    tx: Sender<AuditEvent>,
}

impl AuditSink {
    pub fn record_error(&self, record: ErrorRecord) {
        warn!(
            "[{}:{}] {}",
            record.step, record.description, record.error
        );
        // The receiver is owned by the run context and outlives every sink
        let _ = self.tx.send(AuditEvent::Error(record));
    }

    pub fn changelog(&self, text: impl Into<String>) {
        let text = text.into();
        info!("{}", text);
        let _ = self.tx.send(AuditEvent::Changelog {
            at: Utc::now(),
            text,
        });
    }
}

/// Owner of the audit queue
#[derive(Debug)]
pub struct AuditQueue {
    tx: Sender<AuditEvent>,
    rx: Receiver<AuditEvent>,
}

impl Default for AuditQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl AuditQueue {
    pub fn new() -> Self {
        let (tx, rx) = unbounded();
        Self { tx, rx }
    }

    pub fn sink(&self) -> AuditSink {
        AuditSink {
            tx: self.tx.clone(),
        }
    }

    /// Take every queued event in submission order
    pub fn drain(&self) -> Vec<AuditEvent> {
        self.rx.try_iter().collect()
    }
}

/// Counts of what one flush appended
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FlushSummary {
    pub errors: usize,
    pub changelog_lines: usize,
}

/// Append-only writer for the error document and the changelog
#[derive(Debug, Clone)]
pub struct AuditLog {
    errors: ErrorDocument,
    changelog: Changelog,
}

impl AuditLog {
    pub fn new(root: &Path, config: &GateConfig) -> Self {
        Self {
            errors: ErrorDocument::new(root.join(&config.paths.errors)),
            changelog: Changelog::new(root.join(&config.paths.changelog)),
        }
    }

    pub fn flush(&self, events: Vec<AuditEvent>) -> GateResult<FlushSummary> {
        let mut records = Vec::new();
        let mut lines = Vec::new();
        for event in events {
            match event {
                AuditEvent::Error(record) => records.push(record),
                AuditEvent::Changelog { at, text } => lines.push(format_changelog_line(at, &text)),
            }
        }

        self.errors.append(&records)?;
        self.changelog.append_lines(&lines)?;

        Ok(FlushSummary {
            errors: records.len(),
            changelog_lines: lines.len(),
        })
    }

    pub fn errors(&self) -> &ErrorDocument {
        &self.errors
    }

    pub fn changelog(&self) -> &Changelog {
        &self.changelog
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_preserves_order() {
        let queue = AuditQueue::new();
        let sink = queue.sink();
        sink.changelog("first");
        sink.record_error(ErrorRecord::new("1.1", "module load", "boom", "file=a.toml"));
        sink.changelog("second");

        let events = queue.drain();
        assert_eq!(events.len(), 3);
        assert!(matches!(&events[0], AuditEvent::Changelog { text, .. } if text == "first"));
        assert!(matches!(&events[1], AuditEvent::Error(r) if r.step == "1.1"));
        assert!(queue.drain().is_empty());
    }

    #[test]
    fn test_sink_is_usable_across_threads() {
        let queue = AuditQueue::new();
        std::thread::scope(|s| {
            for i in 0..4 {
                let sink = queue.sink();
                s.spawn(move || sink.changelog(format!("event {}", i)));
            }
        });
        assert_eq!(queue.drain().len(), 4);
    }

    #[test]
    fn test_flush_writes_both_documents() {
        let dir = tempfile::tempdir().unwrap();
        let config = GateConfig::default();
        let log = AuditLog::new(dir.path(), &config);

        let queue = AuditQueue::new();
        let sink = queue.sink();
        sink.changelog("Pruned a.toml -> quarantine/a.toml (no recognized entrypoint)");
        sink.record_error(ErrorRecord::new("2.2", "Parse session log", "bad json", "file=x.json"));

        let summary = log.flush(queue.drain()).unwrap();
        assert_eq!(
            summary,
            FlushSummary {
                errors: 1,
                changelog_lines: 1
            }
        );

        let changelog = std::fs::read_to_string(dir.path().join("CHANGELOG_COMPLIANCE.md")).unwrap();
        assert!(changelog.contains("Pruned a.toml"));
        let errors =
            std::fs::read_to_string(dir.path().join("docs/compliance_errors.md")).unwrap();
        assert!(errors.contains("[2.2:Parse session log]"));
    }
}
