//! Per-run context
//!
//! Carries everything a stage needs (workspace root, configuration, mode,
//! protected paths and the audit queue) explicitly instead of through
//! process-wide state. Shared by reference across the collector threads.

use crate::audit::{AuditEvent, AuditQueue, AuditSink, ErrorRecord};
use crate::config::GateConfig;
use crate::models::Mode;
use crate::scanner::{rel_key, ProtectedPaths};
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};

#[derive(Debug)]
pub struct RunContext {
    root: PathBuf,
    config: GateConfig,
    mode: Mode,
    protected: ProtectedPaths,
    queue: AuditQueue,
    sink: AuditSink,
    run_id: String,
    started_at: DateTime<Utc>,
}

impl RunContext {
    pub fn new(root: &Path, config: GateConfig, mode: Mode) -> Self {
        let protected = ProtectedPaths::new(&config.scan.protected);
        let queue = AuditQueue::new();
        let sink = queue.sink();
        Self {
            root: root.to_path_buf(),
            config,
            mode,
            protected,
            queue,
            sink,
            run_id: uuid::Uuid::new_v4().to_string(),
            started_at: Utc::now(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> &GateConfig {
        &self.config
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn protected(&self) -> &ProtectedPaths {
        &self.protected
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Absolute path for a root-relative artifact location
    pub fn resolve(&self, rel: &str) -> PathBuf {
        self.root.join(rel)
    }

    /// Root-relative display form of `path`
    pub fn rel(&self, path: &Path) -> String {
        rel_key(&self.root, path)
    }

    pub fn audit(&self) -> &AuditSink {
        &self.sink
    }

    pub fn record_error(&self, record: ErrorRecord) {
        self.sink.record_error(record);
    }

    pub fn changelog(&self, text: impl Into<String>) {
        self.sink.changelog(text);
    }

    /// Take the audit events queued so far
    pub fn drain_audit(&self) -> Vec<AuditEvent> {
        self.queue.drain()
    }
}
