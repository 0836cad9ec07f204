//! Core data models for the gate
//!
//! Signals, provenance, discovery outcomes and the run snapshot that gets
//! persisted at the end of every run.

use crate::scoring::WeightSet;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Quality dimension measured by one collector
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum SignalCategory {
    Lint,
    Tests,
    Placeholders,
    Sessions,
}

impl SignalCategory {
    pub const ALL: [SignalCategory; 4] = [
        SignalCategory::Lint,
        SignalCategory::Tests,
        SignalCategory::Placeholders,
        SignalCategory::Sessions,
    ];

    /// Stable key used in config tables and the state document
    pub fn key(&self) -> &'static str {
        match self {
            SignalCategory::Lint => "lint",
            SignalCategory::Tests => "tests",
            SignalCategory::Placeholders => "placeholders",
            SignalCategory::Sessions => "sessions",
        }
    }
}

impl std::fmt::Display for SignalCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.key())
    }
}

/// Which link of the fallback chain produced a value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Primary,
    Secondary,
    Neutral,
    Disabled,
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Tier::Primary => write!(f, "primary"),
            Tier::Secondary => write!(f, "secondary"),
            Tier::Neutral => write!(f, "neutral"),
            Tier::Disabled => write!(f, "disabled"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Provenance {
    /// Module path, tool name or artifact the value came from
    pub source: String,
    pub tier: Tier,
    /// Raw counts behind the value (violations, passed, hits, loc, ...)
    #[serde(default)]
    pub raw: BTreeMap<String, f64>,
    /// One note per degradation along the chain
    #[serde(default)]
    pub notes: Vec<String>,
}

/// One normalized 0-100 measurement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub category: SignalCategory,
    /// `None` only when the signal is disabled in config
    pub value: Option<f64>,
    pub provenance: Provenance,
}

impl Signal {
    pub fn is_present(&self) -> bool {
        self.value.is_some()
    }
}

/// Clamp into the signal range, mapping NaN to 0
pub fn clamp_signal(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 100.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Pass,
    Blocked,
}

impl std::fmt::Display for Decision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Decision::Pass => write!(f, "PASS"),
            Decision::Blocked => write!(f, "BLOCKED"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Mode {
    Enforce,
    WriteOnly,
}

/// Why a candidate module was pruned
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PruneReason {
    /// The file could not be read or parsed as a producer manifest
    LoadFailure,
    /// Loaded fine but exposes none of the well-known entrypoints
    NoEntrypoint,
}

impl std::fmt::Display for PruneReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PruneReason::LoadFailure => write!(f, "module load failure"),
            PruneReason::NoEntrypoint => write!(f, "no recognized entrypoint"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "kebab-case")]
pub enum ModuleOutcome {
    Adopted {
        entrypoint: String,
    },
    Pruned {
        reason: PruneReason,
        detail: String,
        /// `None` when the quarantine move itself failed
        quarantined_to: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveryResult {
    /// Path relative to the workspace root, at scan time
    pub path: String,
    #[serde(flatten)]
    pub outcome: ModuleOutcome,
}

impl DiscoveryResult {
    pub fn is_adopted(&self) -> bool {
        matches!(self.outcome, ModuleOutcome::Adopted { .. })
    }
}

/// Everything one run computed, persisted once per version
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSnapshot {
    pub version: u64,
    pub run_id: String,
    pub timestamp: DateTime<Utc>,
    pub mode: Mode,
    pub signals: Vec<Signal>,
    pub weights: WeightSet,
    pub score: f64,
    pub threshold: f64,
    pub decision: Decision,
    pub discovery: Vec<DiscoveryResult>,
}

impl RunSnapshot {
    pub fn signal(&self, category: SignalCategory) -> Option<&Signal> {
        self.signals.iter().find(|s| s.category == category)
    }

    pub fn pruned(&self) -> impl Iterator<Item = &DiscoveryResult> {
        self.discovery.iter().filter(|d| !d.is_adopted())
    }
}
