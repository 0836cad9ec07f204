//! Q&A-formatted error document
//!
//! Each failure becomes an independent block that a human or an automated
//! triager can answer on its own. The document is only ever appended to.

use crate::errors::{GateError, GateResult};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Context excerpts longer than this are cut
pub const MAX_CONTEXT_CHARS: usize = 2000;

const TRAILING_PROMPT: &str = "What are the possible causes, and how can this be resolved while preserving intended functionality?";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorRecord {
    /// Pipeline step id, e.g. `1.1` for module load
    pub step: String,
    pub description: String,
    pub error: String,
    /// Bounded excerpt of the surrounding state
    pub context: String,
}

impl ErrorRecord {
    pub fn new(
        step: impl Into<String>,
        description: impl Into<String>,
        error: impl Into<String>,
        context: impl AsRef<str>,
    ) -> Self {
        Self {
            step: step.into(),
            description: description.into(),
            error: error.into(),
            context: bound_context(context.as_ref()),
        }
    }
}

fn bound_context(context: &str) -> String {
    if context.chars().count() <= MAX_CONTEXT_CHARS {
        return context.to_string();
    }
    let mut cut: String = context.chars().take(MAX_CONTEXT_CHARS).collect();
    cut.push_str(" ...(truncated)");
    cut
}

pub fn render_error_block(record: &ErrorRecord) -> String {
    format!(
        "### Question\n\
         While performing [{}:{}], encountered the following error:\n\
         {}\n\
         Context: {}\n\
         {}\n\n",
        record.step, record.description, record.error, record.context, TRAILING_PROMPT
    )
}

#[derive(Debug, Clone)]
pub struct ErrorDocument {
    path: PathBuf,
}

impl ErrorDocument {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, records: &[ErrorRecord]) -> GateResult<()> {
        if records.is_empty() {
            return Ok(());
        }
        let body: String = records.iter().map(render_error_block).collect();
        append_text(&self.path, &body)
    }
}

pub(super) fn append_text(path: &Path, text: &str) -> GateResult<()> {
    let wrap = |source| GateError::AuditWrite {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(wrap)?;
    }
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(wrap)?;
    file.write_all(text.as_bytes()).map_err(wrap)?;
    Ok(())
}
