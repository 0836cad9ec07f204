//! Configuration module for the gate
//!
//! This module handles:
//! - Workspace-level configuration (fitness-gate.toml)
//! - Signal weights, neutral defaults and per-signal toggles
//! - Artifact locations, scan keywords and exclusions
//! - External tool commands and timeouts

mod gate_config;

pub use gate_config::{
    load_gate_config, ArtifactPaths, ExcludeConfig, GateConfig, LintConfig, NeutralDefaults,
    PlaceholderConfig, ScanConfig, SessionConfig, SignalToggle, SignalWeights, ToolsConfig,
    CONFIG_FILE_NAMES, DEFAULT_THRESHOLD, EXAMPLE_CONFIG,
};
