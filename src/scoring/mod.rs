//! Composite Fitness Scoring
//!
//! Turns the per-signal values of one run into a single 0-100 score.
//!
//! # Scoring Formula
//!
//! ```text
//! Score = 100 × Σ active[s] × value[s] / 100      (over present signals s)
//!
//! Where:
//!   active[s] = base[s] / Σ base[p]                 (p ranges over present signals)
//!   no signal present  → active = 0.25 for every category
//!   present base sum 0 → equal weights over the present subset
//! ```
//!
//! # Base Weights
//!
//! - Lint: 0.30
//! - Tests: 0.40
//! - Placeholders: 0.15
//! - Sessions: 0.15
//!
//! # Example
//!
//! Only Lint (70) and Tests (60) present:
//! - active = {lint: 0.30/0.70, tests: 0.40/0.70} = {0.4286, 0.5714}
//! - Score = 0.4286 × 70 + 0.5714 × 60 ≈ 64.29

mod composite;
mod weights;

pub use composite::{composite_score, round_to_precision, SCORE_PRECISION};
pub use weights::{normalize_weights, WeightSet};
