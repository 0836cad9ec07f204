//! Producer manifests
//!
//! A candidate module declares the operations it exposes in a TOML or JSON
//! document:
//!
//! ```toml
//! [entrypoints.collect_metrics]
//! values = { lint = 92.0, code_quality = 90 }
//!
//! [entrypoints.compute_compliance_metrics]
//! command = ["python", "scripts/compliance_metrics.py"]
//! ```
//!
//! `values` are returned as-is. A `command` is run from the workspace root
//! and must print one JSON object on stdout.

use crate::context::RunContext;
use crate::errors::{GateError, GateResult};
use crate::external_tool::run_external_tool;
use serde::Deserialize;
use serde_json::{Map, Value as JsonValue};
use std::collections::BTreeMap;
use std::path::Path;

/// Recognized entrypoint names, in priority order
pub const WELL_KNOWN_ENTRYPOINTS: &[&str] = &["compute_compliance_metrics", "collect_metrics", "main"];

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProducerManifest {
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub entrypoints: BTreeMap<String, Entrypoint>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Entrypoint {
    /// Static metric values
    #[serde(default)]
    pub values: Option<Map<String, JsonValue>>,
    /// Command printing a JSON object of metric values
    #[serde(default)]
    pub command: Option<Vec<String>>,
    /// Overrides `tools.timeout_secs` for this command
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl Entrypoint {
    /// Declares something the gate can evaluate
    pub fn is_capable(&self) -> bool {
        self.values.is_some() || self.command.as_ref().is_some_and(|c| !c.is_empty())
    }

    /// Produce the raw metric map
    pub fn invoke(&self, ctx: &RunContext, name: &str) -> GateResult<Map<String, JsonValue>> {
        if let Some(values) = &self.values {
            return Ok(values.clone());
        }

        let cmd = self.command.clone().unwrap_or_default();
        let timeout = self
            .timeout_secs
            .unwrap_or(ctx.config().tools.timeout_secs);
        let result = run_external_tool(&cmd, name, timeout, ctx.root(), ctx.root(), ctx.protected())?
            .into_gate_result(name, timeout)?;

        match result.json_output() {
            Some(JsonValue::Object(map)) => Ok(map),
            Some(other) => Err(GateError::ParseFailure {
                what: format!("{} output", name),
                detail: format!("expected a JSON object, got {}", json_kind(&other)),
            }),
            None => Err(GateError::ParseFailure {
                what: format!("{} output", name),
                detail: "stdout is not valid JSON".to_string(),
            }),
        }
    }
}

fn json_kind(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "a boolean",
        JsonValue::Number(_) => "a number",
        JsonValue::String(_) => "a string",
        JsonValue::Array(_) => "an array",
        JsonValue::Object(_) => "an object",
    }
}

impl ProducerManifest {
    /// First well-known entrypoint that declares a capability
    pub fn select_entrypoint(&self) -> Option<(&'static str, &Entrypoint)> {
        WELL_KNOWN_ENTRYPOINTS.iter().find_map(|name| {
            self.entrypoints
                .get(*name)
                .filter(|ep| ep.is_capable())
                .map(|ep| (*name, ep))
        })
    }
}

/// Read and parse a manifest according to its extension
pub fn load_manifest(path: &Path) -> GateResult<ProducerManifest> {
    let load_err = |detail: String| GateError::ModuleLoad {
        path: path.to_path_buf(),
        detail,
    };

    let content = std::fs::read_to_string(path).map_err(|e| load_err(e.to_string()))?;
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "toml" => toml::from_str(&content).map_err(|e| load_err(e.to_string())),
        "json" => serde_json::from_str(&content).map_err(|e| load_err(e.to_string())),
        other => Err(load_err(format!("unsupported manifest format '{}'", other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GateConfig;
    use crate::models::Mode;

    fn write(dir: &Path, name: &str, content: &str) -> std::path::PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_toml_manifest_with_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "metrics_ingestion.toml",
            "[entrypoints.collect_metrics]\nvalues = { lint = 92.0, code_quality = 90 }\n",
        );
        let manifest = load_manifest(&path).unwrap();
        let (name, ep) = manifest.select_entrypoint().unwrap();
        assert_eq!(name, "collect_metrics");
        assert_eq!(ep.values.as_ref().unwrap()["lint"], 92.0);
    }

    #[test]
    fn test_priority_order() {
        let json = r#"{"entrypoints": {
            "main": {"values": {"lint": 1}},
            "compute_compliance_metrics": {"values": {"lint": 2}},
            "helper": {"values": {"lint": 3}}
        }}"#;
        let manifest: ProducerManifest = serde_json::from_str(json).unwrap();
        assert_eq!(manifest.select_entrypoint().unwrap().0, "compute_compliance_metrics");
    }

    #[test]
    fn test_unrecognized_or_empty_entrypoints_are_not_capabilities() {
        let json = r#"{"entrypoints": {
            "helper": {"values": {"lint": 3}},
            "main": {"command": []}
        }}"#;
        let manifest: ProducerManifest = serde_json::from_str(json).unwrap();
        assert!(manifest.select_entrypoint().is_none());
    }

    #[test]
    fn test_unparsable_manifest_is_module_load_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "collect_broken.json", "{ not json");
        assert!(matches!(
            load_manifest(&path),
            Err(GateError::ModuleLoad { .. })
        ));
    }

    #[test]
    fn test_invoke_static_values() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = RunContext::new(dir.path(), GateConfig::default(), Mode::Enforce);
        let mut values = Map::new();
        values.insert("tests".into(), JsonValue::from(88));
        let ep = Entrypoint {
            values: Some(values),
            ..Default::default()
        };
        assert_eq!(ep.invoke(&ctx, "collect_metrics").unwrap()["tests"], 88);
    }

    #[cfg(unix)]
    #[test]
    fn test_invoke_command_requires_json_object() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = RunContext::new(dir.path(), GateConfig::default(), Mode::Enforce);

        let ok = Entrypoint {
            command: Some(vec!["sh".into(), "-c".into(), r#"echo '{"lint": 77}'"#.into()]),
            ..Default::default()
        };
        assert_eq!(ok.invoke(&ctx, "main").unwrap()["lint"], 77);

        let bad = Entrypoint {
            command: Some(vec!["sh".into(), "-c".into(), "echo '[1, 2]'".into()]),
            ..Default::default()
        };
        assert!(matches!(
            bad.invoke(&ctx, "main"),
            Err(GateError::ParseFailure { .. })
        ));
    }
}
