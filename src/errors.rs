//! Error taxonomy for the gate
//!
//! Recoverable variants describe an expected degradation (a collector falls
//! through to its next tier, a candidate module gets pruned). Fatal variants
//! are the ones that would corrupt auditability and map to exit code 1.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GateError {
    #[error("tool unavailable: {tool} not found")]
    ToolUnavailable { tool: String },

    #[error("tool timeout: {tool} exceeded {timeout_secs}s")]
    ToolTimeout { tool: String, timeout_secs: u64 },

    #[error("tool failed: {tool} exited with {code:?}: {stderr}")]
    ToolFailed {
        tool: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("parse failure in {what}: {detail}")]
    ParseFailure { what: String, detail: String },

    #[error("no source: {0}")]
    NoSource(String),

    #[error("module load failed for {path}: {detail}")]
    ModuleLoad { path: PathBuf, detail: String },

    #[error("quarantine of {path} failed: {detail}")]
    Quarantine { path: PathBuf, detail: String },

    #[error("refusing to touch protected path {0}")]
    ProtectedPath(PathBuf),

    #[error("failed to write state to {path}: {source}")]
    StateWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to append audit record to {path}: {source}")]
    AuditWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl GateError {
    /// Whether a collector or the prober may recover from this locally.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            GateError::ToolUnavailable { .. }
                | GateError::ToolTimeout { .. }
                | GateError::ToolFailed { .. }
                | GateError::ParseFailure { .. }
                | GateError::NoSource(_)
                | GateError::ModuleLoad { .. }
                | GateError::Quarantine { .. }
        )
    }

    /// Short stable label used in provenance and snapshots.
    pub fn kind(&self) -> &'static str {
        match self {
            GateError::ToolUnavailable { .. } => "tool-unavailable",
            GateError::ToolTimeout { .. } => "tool-timeout",
            GateError::ToolFailed { .. } => "tool-failed",
            GateError::ParseFailure { .. } => "parse-failure",
            GateError::NoSource(_) => "no-source",
            GateError::ModuleLoad { .. } => "module-load",
            GateError::Quarantine { .. } => "quarantine",
            GateError::ProtectedPath(_) => "protected-path",
            GateError::StateWrite { .. } => "state-write",
            GateError::AuditWrite { .. } => "audit-write",
            GateError::Config(_) => "config",
        }
    }
}

pub type GateResult<T> = std::result::Result<T, GateError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recoverable_split() {
        assert!(GateError::ToolUnavailable { tool: "ruff".into() }.is_recoverable());
        assert!(GateError::NoSource("x".into()).is_recoverable());
        assert!(!GateError::ProtectedPath(PathBuf::from(".github/workflows")).is_recoverable());
        assert!(!GateError::Config("bad".into()).is_recoverable());
    }

    #[test]
    fn test_tool_unavailable_message() {
        let err = GateError::ToolUnavailable {
            tool: "pytest".into(),
        };
        assert!(err.to_string().starts_with("tool unavailable"));
        assert_eq!(err.kind(), "tool-unavailable");
    }
}
