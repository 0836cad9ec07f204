//! Persistent state store
//!
//! The state document (`docs/status_index.json` by default) holds the latest
//! snapshot under `compliance`. Unknown fields anywhere in the document are
//! carried over unchanged. Every snapshot is also written once to its own
//! versioned file, which is never touched again.
//!
//! The document is replaced with write-temp-then-rename, so a crash leaves
//! either the old or the new version on disk. A document that fails to
//! parse is moved aside rather than overwritten.

use crate::config::GateConfig;
use crate::errors::{GateError, GateResult};
use crate::models::{Decision, RunSnapshot};
use chrono::Utc;
use serde_json::{json, Map, Value as JsonValue};
use std::fs::{self, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const SNAPSHOT_PREFIX: &str = "snapshot-v";
const SNAPSHOT_SUFFIX: &str = ".json";

/// The state document as read from disk
#[derive(Debug, Default)]
pub struct LoadedState {
    pub document: Map<String, JsonValue>,
    /// Where an unreadable document was moved to
    pub recovered_from: Option<PathBuf>,
}

impl LoadedState {
    fn compliance(&self) -> Option<&Map<String, JsonValue>> {
        self.document.get("compliance")?.as_object()
    }

    pub fn version(&self) -> u64 {
        self.compliance()
            .and_then(|c| c.get("version"))
            .and_then(JsonValue::as_u64)
            .unwrap_or(0)
    }

    /// Latest persisted snapshot, if present and well-formed
    pub fn latest(&self) -> Option<RunSnapshot> {
        let latest = self.compliance()?.get("latest")?;
        match serde_json::from_value(latest.clone()) {
            Ok(snapshot) => Some(snapshot),
            Err(e) => {
                warn!("Ignoring malformed latest snapshot: {}", e);
                None
            }
        }
    }
}

pub struct StateStore {
    state_path: PathBuf,
    snapshots_dir: PathBuf,
}

impl StateStore {
    pub fn new(root: &Path, config: &GateConfig) -> Self {
        Self {
            state_path: root.join(&config.paths.state),
            snapshots_dir: root.join(&config.paths.snapshots),
        }
    }

    pub fn state_path(&self) -> &Path {
        &self.state_path
    }

    pub fn snapshot_path(&self, version: u64) -> PathBuf {
        self.snapshots_dir
            .join(format!("{}{:06}{}", SNAPSHOT_PREFIX, version, SNAPSHOT_SUFFIX))
    }

    fn write_err(&self, path: &Path) -> impl Fn(io::Error) -> GateError {
        let path = path.to_path_buf();
        move |source| GateError::StateWrite {
            path: path.clone(),
            source,
        }
    }

    /// Read the state document. A missing document is empty; an unreadable
    /// one is moved to `<name>.corrupt-<timestamp>` and treated as empty.
    pub fn load(&self) -> GateResult<LoadedState> {
        let text = match fs::read_to_string(&self.state_path) {
            Ok(t) => t,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(LoadedState::default()),
            Err(e) => return Err(self.write_err(&self.state_path)(e)),
        };

        match serde_json::from_str::<JsonValue>(&text) {
            Ok(JsonValue::Object(document)) => Ok(LoadedState {
                document,
                recovered_from: None,
            }),
            Ok(_) | Err(_) => {
                let aside = self.state_path.with_file_name(format!(
                    "{}.corrupt-{}",
                    self.state_path
                        .file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_else(|| "state".to_string()),
                    Utc::now().format("%Y%m%dT%H%M%SZ")
                ));
                warn!(
                    "State document {} is unreadable, moving it to {}",
                    self.state_path.display(),
                    aside.display()
                );
                fs::rename(&self.state_path, &aside).map_err(self.write_err(&self.state_path))?;
                Ok(LoadedState {
                    document: Map::new(),
                    recovered_from: Some(aside),
                })
            }
        }
    }

    /// Highest version among the per-version snapshot files
    pub fn highest_snapshot_version(&self) -> u64 {
        let Ok(entries) = fs::read_dir(&self.snapshots_dir) else {
            return 0;
        };
        entries
            .filter_map(|e| e.ok())
            .filter_map(|e| {
                let name = e.file_name().to_string_lossy().into_owned();
                name.strip_prefix(SNAPSHOT_PREFIX)?
                    .strip_suffix(SNAPSHOT_SUFFIX)?
                    .parse::<u64>()
                    .ok()
            })
            .max()
            .unwrap_or(0)
    }

    pub fn next_version(&self, state: &LoadedState) -> u64 {
        state.version().max(self.highest_snapshot_version()) + 1
    }

    /// Write the immutable snapshot file, then fold the snapshot into the
    /// state document.
    pub fn persist(&self, mut state: LoadedState, snapshot: &RunSnapshot) -> GateResult<()> {
        self.write_snapshot_file(snapshot)?;

        let snapshot_json =
            serde_json::to_value(snapshot).map_err(|e| self.write_err(&self.state_path)(io::Error::other(e)))?;

        let compliance = state
            .document
            .entry("compliance")
            .or_insert_with(|| JsonValue::Object(Map::new()));
        if !compliance.is_object() {
            warn!("Replacing non-object `compliance` field in state document");
            *compliance = JsonValue::Object(Map::new());
        }
        if let JsonValue::Object(c) = compliance {
            c.insert("latest".to_string(), snapshot_json);
            c.insert("version".to_string(), json!(snapshot.version));

            let enforcement = c
                .entry("enforcement")
                .or_insert_with(|| JsonValue::Object(Map::new()));
            if !enforcement.is_object() {
                *enforcement = JsonValue::Object(Map::new());
            }
            if let JsonValue::Object(e) = enforcement {
                e.insert("blocked".into(), json!(snapshot.decision == Decision::Blocked));
                e.insert("decision".into(), json!(snapshot.decision.to_string()));
                e.insert("threshold".into(), json!(snapshot.threshold));
                e.insert("score".into(), json!(snapshot.score));
                e.insert("timestamp".into(), json!(snapshot.timestamp.to_rfc3339()));
            }
        }

        self.write_document(&JsonValue::Object(state.document))
    }

    fn write_snapshot_file(&self, snapshot: &RunSnapshot) -> GateResult<()> {
        let path = self.snapshot_path(snapshot.version);
        let err = self.write_err(&path);
        fs::create_dir_all(&self.snapshots_dir).map_err(&err)?;

        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(&err)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, snapshot).map_err(|e| err(io::Error::other(e)))?;
        writer.flush().map_err(&err)?;
        debug!("Wrote snapshot {}", path.display());
        Ok(())
    }

    fn write_document(&self, document: &JsonValue) -> GateResult<()> {
        let err = self.write_err(&self.state_path);
        if let Some(parent) = self.state_path.parent() {
            fs::create_dir_all(parent).map_err(&err)?;
        }

        // Write to temp file first, then rename (atomic on POSIX)
        let tmp = self.state_path.with_extension("json.tmp");
        {
            let file = fs::File::create(&tmp).map_err(&err)?;
            let mut writer = BufWriter::new(file);
            serde_json::to_writer_pretty(&mut writer, document).map_err(|e| err(io::Error::other(e)))?;
            writer.write_all(b"\n").map_err(&err)?;
            writer.flush().map_err(&err)?;
        }
        fs::rename(&tmp, &self.state_path).map_err(&err)?;
        debug!("Updated state document {}", self.state_path.display());
        Ok(())
    }
}
