//! Workspace-level configuration support
//!
//! Loads configuration from `fitness-gate.toml` or `.fitness-gate.json` in the
//! workspace root, or from an explicit `--config` path.
//!
//! # Configuration Format
//!
//! ```toml
//! # fitness-gate.toml
//! threshold = 85.0
//!
//! [weights]
//! lint = 0.30
//! tests = 0.40
//! placeholders = 0.15
//! sessions = 0.15
//!
//! [signals.sessions]
//! enabled = false
//!
//! [tools]
//! timeout_secs = 120
//! test_command = ["cargo", "test", "--quiet"]
//! ```

use crate::errors::{GateError, GateResult};
use crate::models::SignalCategory;
use crate::scanner::{normalize_rel, ProtectedPaths};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Enforcement threshold: a composite score at or above this passes.
pub const DEFAULT_THRESHOLD: f64 = 85.0;

/// Files searched in the workspace root, in order
pub const CONFIG_FILE_NAMES: &[&str] = &["fitness-gate.toml", ".fitness-gate.json"];

/// Directory names never descended into, at any depth
pub const DEFAULT_EXCLUDED_DIRS: &[&str] = &[
    ".git",
    ".venv",
    ".mypy_cache",
    ".pytest_cache",
    "__pycache__",
    "node_modules",
    "target",
];

/// Written by `fitness-gate init`
pub const EXAMPLE_CONFIG: &str = r#"# fitness-gate configuration

# Composite score needed to pass (0-100)
threshold = 85.0

# Base weights, renormalized over whichever signals are present
[weights]
lint = 0.30
tests = 0.40
placeholders = 0.15
sessions = 0.15

# Values used when no data source is available
[neutral]
lint = 80.0
tests = 50.0
placeholders = 80.0
sessions = 80.0

# Disable a signal entirely (its weight is redistributed)
# [signals.sessions]
# enabled = false

[paths]
state = "docs/status_index.json"
snapshots = "docs/compliance_snapshots"
changelog = "CHANGELOG_COMPLIANCE.md"
errors = "docs/compliance_errors.md"
quarantine = "quarantine"

[scan]
keywords = ["ingestion", "metrics", "collect", "update_"]
extensions = ["toml", "json"]
protected = [".github/workflows"]

[exclude]
paths = []

[tools]
timeout_secs = 120
lint_command = ["ruff", "check", "--exit-zero", "--output-format=json", "."]
lint_report = "ruff_report.json"
test_command = ["pytest", "-q"]
test_report = ".report.json"

[lint]
penalty_per_violation = 1.0

[placeholder]
markers = ["TODO", "FIXME", "PLACEHOLDER", "XXX"]
penalty_per_kloc = 10.0

[session]
dirs = ["logs/session", "logs/sessions", "docs/sessions", "metrics", "docs/metrics"]
"#;

/// Gate configuration loaded from fitness-gate.toml or similar
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GateConfig {
    /// Pass threshold (default: 85.0)
    #[serde(default = "default_threshold")]
    pub threshold: f64,

    #[serde(default)]
    pub weights: SignalWeights,

    #[serde(default)]
    pub neutral: NeutralDefaults,

    /// Per-signal toggles keyed by category name
    #[serde(default)]
    pub signals: BTreeMap<String, SignalToggle>,

    #[serde(default)]
    pub paths: ArtifactPaths,

    #[serde(default)]
    pub scan: ScanConfig,

    #[serde(default)]
    pub exclude: ExcludeConfig,

    #[serde(default)]
    pub tools: ToolsConfig,

    #[serde(default)]
    pub lint: LintConfig,

    #[serde(default)]
    pub placeholder: PlaceholderConfig,

    #[serde(default)]
    pub session: SessionConfig,

    /// File this configuration was loaded from
    #[serde(skip)]
    pub source: Option<PathBuf>,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            weights: SignalWeights::default(),
            neutral: NeutralDefaults::default(),
            signals: BTreeMap::new(),
            paths: ArtifactPaths::default(),
            scan: ScanConfig::default(),
            exclude: ExcludeConfig::default(),
            tools: ToolsConfig::default(),
            lint: LintConfig::default(),
            placeholder: PlaceholderConfig::default(),
            session: SessionConfig::default(),
            source: None,
        }
    }
}

fn default_threshold() -> f64 {
    DEFAULT_THRESHOLD
}

/// Base weights for the four signals (must sum to 1.0)
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SignalWeights {
    #[serde(default = "default_lint_weight")]
    pub lint: f64,
    #[serde(default = "default_tests_weight")]
    pub tests: f64,
    #[serde(default = "default_placeholders_weight")]
    pub placeholders: f64,
    #[serde(default = "default_sessions_weight")]
    pub sessions: f64,
}

impl Default for SignalWeights {
    fn default() -> Self {
        Self {
            lint: default_lint_weight(),
            tests: default_tests_weight(),
            placeholders: default_placeholders_weight(),
            sessions: default_sessions_weight(),
        }
    }
}

fn default_lint_weight() -> f64 {
    0.30
}
fn default_tests_weight() -> f64 {
    0.40
}
fn default_placeholders_weight() -> f64 {
    0.15
}
fn default_sessions_weight() -> f64 {
    0.15
}

impl SignalWeights {
    pub fn get(&self, category: SignalCategory) -> f64 {
        match category {
            SignalCategory::Lint => self.lint,
            SignalCategory::Tests => self.tests,
            SignalCategory::Placeholders => self.placeholders,
            SignalCategory::Sessions => self.sessions,
        }
    }

    pub fn as_map(&self) -> BTreeMap<SignalCategory, f64> {
        SignalCategory::ALL
            .iter()
            .map(|c| (*c, self.get(*c)))
            .collect()
    }

    fn sum(&self) -> f64 {
        self.lint + self.tests + self.placeholders + self.sessions
    }

    /// Validate that weights sum to 1.0 (with tolerance)
    pub fn is_valid(&self) -> bool {
        (self.sum() - 1.0).abs() < 0.001
    }

    /// Normalize weights to sum to 1.0
    pub fn normalize(&mut self) {
        let sum = self.sum();
        if sum > 0.0 {
            self.lint /= sum;
            self.tests /= sum;
            self.placeholders /= sum;
            self.sessions /= sum;
        }
    }
}

/// Fallback value per signal when every data source is unavailable
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NeutralDefaults {
    #[serde(default = "default_neutral_lint")]
    pub lint: f64,
    #[serde(default = "default_neutral_tests")]
    pub tests: f64,
    #[serde(default = "default_neutral_placeholders")]
    pub placeholders: f64,
    #[serde(default = "default_neutral_sessions")]
    pub sessions: f64,
}

impl Default for NeutralDefaults {
    fn default() -> Self {
        Self {
            lint: default_neutral_lint(),
            tests: default_neutral_tests(),
            placeholders: default_neutral_placeholders(),
            sessions: default_neutral_sessions(),
        }
    }
}

fn default_neutral_lint() -> f64 {
    80.0
}
fn default_neutral_tests() -> f64 {
    50.0
}
fn default_neutral_placeholders() -> f64 {
    80.0
}
fn default_neutral_sessions() -> f64 {
    80.0
}

impl NeutralDefaults {
    pub fn get(&self, category: SignalCategory) -> f64 {
        match category {
            SignalCategory::Lint => self.lint,
            SignalCategory::Tests => self.tests,
            SignalCategory::Placeholders => self.placeholders,
            SignalCategory::Sessions => self.sessions,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SignalToggle {
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

/// Where the gate writes its artifacts, relative to the workspace root
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ArtifactPaths {
    #[serde(default = "default_state_path")]
    pub state: String,
    #[serde(default = "default_snapshots_path")]
    pub snapshots: String,
    #[serde(default = "default_changelog_path")]
    pub changelog: String,
    #[serde(default = "default_errors_path")]
    pub errors: String,
    #[serde(default = "default_quarantine_path")]
    pub quarantine: String,
}

impl Default for ArtifactPaths {
    fn default() -> Self {
        Self {
            state: default_state_path(),
            snapshots: default_snapshots_path(),
            changelog: default_changelog_path(),
            errors: default_errors_path(),
            quarantine: default_quarantine_path(),
        }
    }
}

fn default_state_path() -> String {
    "docs/status_index.json".to_string()
}
fn default_snapshots_path() -> String {
    "docs/compliance_snapshots".to_string()
}
fn default_changelog_path() -> String {
    "CHANGELOG_COMPLIANCE.md".to_string()
}
fn default_errors_path() -> String {
    "docs/compliance_errors.md".to_string()
}
fn default_quarantine_path() -> String {
    "quarantine".to_string()
}

impl ArtifactPaths {
    /// Every artifact location, for exclusion and protected-path checks
    pub fn all(&self) -> [&str; 5] {
        [
            &self.state,
            &self.snapshots,
            &self.changelog,
            &self.errors,
            &self.quarantine,
        ]
    }
}

/// Candidate module discovery settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ScanConfig {
    /// Substrings matched (case-insensitively) against file names
    #[serde(default = "default_keywords")]
    pub keywords: Vec<String>,

    /// Manifest extensions considered as candidates
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,

    /// Directories the gate must never scan, write into or run tools from
    #[serde(default = "default_protected")]
    pub protected: Vec<String>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            keywords: default_keywords(),
            extensions: default_extensions(),
            protected: default_protected(),
        }
    }
}

fn default_keywords() -> Vec<String> {
    ["ingestion", "metrics", "collect", "update_"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}
fn default_extensions() -> Vec<String> {
    vec!["toml".to_string(), "json".to_string()]
}
fn default_protected() -> Vec<String> {
    vec![".github/workflows".to_string()]
}

/// Path exclusion configuration
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct ExcludeConfig {
    /// Extra directory names skipped at any depth
    #[serde(default)]
    pub dirs: Vec<String>,

    /// Root-relative path prefixes skipped by every walk
    #[serde(default)]
    pub paths: Vec<String>,

    /// If true, disable the built-in directory exclusions
    #[serde(default)]
    pub skip_defaults: bool,
}

impl ExcludeConfig {
    /// Returns effective excluded directory names (defaults + user names).
    pub fn effective_dirs(&self) -> Vec<String> {
        let mut dirs: Vec<String> = Vec::new();
        if !self.skip_defaults {
            dirs.extend(DEFAULT_EXCLUDED_DIRS.iter().map(|s| s.to_string()));
        }
        for d in &self.dirs {
            if !dirs.contains(d) {
                dirs.push(d.clone());
            }
        }
        dirs
    }
}

/// External tool commands
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ToolsConfig {
    /// Per-invocation timeout in seconds (0 = no timeout)
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_lint_command")]
    pub lint_command: Vec<String>,

    /// Pre-generated lint report consulted before running the linter
    #[serde(default = "default_lint_report")]
    pub lint_report: Option<String>,

    #[serde(default = "default_test_command")]
    pub test_command: Vec<String>,

    /// Pre-generated test report consulted before running the test runner
    #[serde(default = "default_test_report")]
    pub test_report: Option<String>,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            lint_command: default_lint_command(),
            lint_report: default_lint_report(),
            test_command: default_test_command(),
            test_report: default_test_report(),
        }
    }
}

fn default_timeout_secs() -> u64 {
    120
}
fn default_lint_command() -> Vec<String> {
    ["ruff", "check", "--exit-zero", "--output-format=json", "."]
        .iter()
        .map(|s| s.to_string())
        .collect()
}
fn default_lint_report() -> Option<String> {
    Some("ruff_report.json".to_string())
}
fn default_test_command() -> Vec<String> {
    vec!["pytest".to_string(), "-q".to_string()]
}
fn default_test_report() -> Option<String> {
    Some(".report.json".to_string())
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LintConfig {
    /// Points deducted per violation (k)
    #[serde(default = "default_penalty_per_violation")]
    pub penalty_per_violation: f64,
}

impl Default for LintConfig {
    fn default() -> Self {
        Self {
            penalty_per_violation: default_penalty_per_violation(),
        }
    }
}

fn default_penalty_per_violation() -> f64 {
    1.0
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PlaceholderConfig {
    /// Unresolved-marker keywords (whole word, case-insensitive)
    #[serde(default = "default_markers")]
    pub markers: Vec<String>,

    /// Points deducted per marker hit per thousand lines (c)
    #[serde(default = "default_penalty_per_kloc")]
    pub penalty_per_kloc: f64,

    /// Files larger than this are skipped
    #[serde(default = "default_max_file_bytes")]
    pub max_file_bytes: u64,

    /// Extensions never read (binary, lock files, images)
    #[serde(default = "default_skip_extensions")]
    pub skip_extensions: Vec<String>,
}

impl Default for PlaceholderConfig {
    fn default() -> Self {
        Self {
            markers: default_markers(),
            penalty_per_kloc: default_penalty_per_kloc(),
            max_file_bytes: default_max_file_bytes(),
            skip_extensions: default_skip_extensions(),
        }
    }
}

fn default_markers() -> Vec<String> {
    ["TODO", "FIXME", "PLACEHOLDER", "XXX"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}
fn default_penalty_per_kloc() -> f64 {
    10.0
}
fn default_max_file_bytes() -> u64 {
    2 * 1024 * 1024
}
fn default_skip_extensions() -> Vec<String> {
    [
        "png", "jpg", "jpeg", "gif", "pdf", "ico", "lock", "db", "sqlite", "sqlite3", "zip",
        "gz", "tar", "so", "dylib", "dll", "exe", "bin", "wasm",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SessionConfig {
    /// Directories holding session/runtime log artifacts
    #[serde(default = "default_session_dirs")]
    pub dirs: Vec<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            dirs: default_session_dirs(),
        }
    }
}

fn default_session_dirs() -> Vec<String> {
    [
        "logs/session",
        "logs/sessions",
        "docs/sessions",
        "metrics",
        "docs/metrics",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

impl GateConfig {
    pub fn is_enabled(&self, category: SignalCategory) -> bool {
        self.signals
            .get(category.key())
            .map(|t| t.enabled)
            .unwrap_or(true)
    }

    /// Root-relative files the gate writes, reads as reports or loads
    /// configuration from. None of them is ever a metric producer.
    pub fn owned_paths(&self, root: &Path) -> Vec<String> {
        let mut owned: Vec<String> = self.paths.all().iter().map(|p| p.to_string()).collect();
        owned.extend(CONFIG_FILE_NAMES.iter().map(|n| n.to_string()));
        owned.extend(self.tools.lint_report.iter().cloned());
        owned.extend(self.tools.test_report.iter().cloned());
        if let Some(rel) = self
            .source
            .as_deref()
            .and_then(|p| p.strip_prefix(root).ok())
        {
            owned.push(rel.to_string_lossy().into_owned());
        }
        owned
    }

    /// Check invariants and repair what can be repaired.
    pub fn validate(&mut self) -> GateResult<()> {
        if !(0.0..=100.0).contains(&self.threshold) {
            return Err(GateError::Config(format!(
                "threshold must be within 0..=100, got {}",
                self.threshold
            )));
        }

        for category in SignalCategory::ALL {
            let w = self.weights.get(category);
            if !w.is_finite() || w < 0.0 {
                return Err(GateError::Config(format!(
                    "weight for {} must be a non-negative number, got {}",
                    category, w
                )));
            }
        }
        if self.weights.sum() <= 0.0 {
            return Err(GateError::Config("weights sum to zero".to_string()));
        }
        if !self.weights.is_valid() {
            warn!(
                "Signal weights sum to {:.3}, normalizing to 1.0",
                self.weights.sum()
            );
            self.weights.normalize();
        }

        for key in self.signals.keys() {
            if !SignalCategory::ALL.iter().any(|c| c.key() == key) {
                warn!("Unknown signal '{}' in [signals], ignoring", key);
            }
        }

        let protected = ProtectedPaths::new(&self.scan.protected);
        for artifact in self.paths.all() {
            if protected.contains_rel(&normalize_rel(artifact)) {
                return Err(GateError::ProtectedPath(artifact.into()));
            }
        }

        Ok(())
    }
}

/// Load gate configuration from the workspace root.
///
/// Searches `fitness-gate.toml` then `.fitness-gate.json` unless an explicit
/// path is given. Returns defaults if no configuration file is found.
pub fn load_gate_config(root: &Path, explicit: Option<&Path>) -> GateResult<GateConfig> {
    let mut config = match explicit {
        Some(path) => {
            let path = if path.is_absolute() {
                path.to_path_buf()
            } else {
                root.join(path)
            };
            if !path.exists() {
                return Err(GateError::Config(format!(
                    "config file not found: {}",
                    path.display()
                )));
            }
            let mut config = load_config_file(&path)?;
            config.source = Some(path);
            config
        }
        None => {
            let found = CONFIG_FILE_NAMES
                .iter()
                .map(|name| root.join(name))
                .find(|p| p.exists());
            match found {
                Some(path) => {
                    let mut config = load_config_file(&path)?;
                    config.source = Some(path);
                    config
                }
                None => {
                    debug!("No gate config found, using defaults");
                    GateConfig::default()
                }
            }
        }
    };

    config.validate()?;
    Ok(config)
}

fn load_config_file(path: &Path) -> GateResult<GateConfig> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| GateError::Config(format!("failed to read {}: {}", path.display(), e)))?;

    let is_json = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let parsed = if is_json {
        serde_json::from_str::<GateConfig>(&content).map_err(|e| e.to_string())
    } else {
        toml::from_str::<GateConfig>(&content).map_err(|e| e.to_string())
    };

    let config = parsed
        .map_err(|e| GateError::Config(format!("failed to parse {}: {}", path.display(), e)))?;
    debug!("Loaded gate config from {}", path.display());
    Ok(config)
}
