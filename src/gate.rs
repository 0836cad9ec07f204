//! Enforcement gate
//!
//! The score is rounded to the precision unit before the comparison, so a
//! score of exactly the threshold passes and one unit below is blocked.

use crate::models::{Decision, Mode};
use crate::scoring::round_to_precision;

/// Process exit status for a passing run
pub const EXIT_PASS: u8 = 0;
/// Internal or unexpected failure
pub const EXIT_INTERNAL: u8 = 1;
/// Composite score below threshold
pub const EXIT_BLOCKED: u8 = 2;

/// Outcome of one enforcement check
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Enforcement {
    /// Score after rounding to the precision unit
    pub score: f64,
    pub threshold: f64,
    pub decision: Decision,
    /// True if a failing score was let through by write-only mode
    pub overridden: bool,
}

impl Enforcement {
    pub fn exit_code(&self) -> u8 {
        match self.decision {
            Decision::Pass => EXIT_PASS,
            Decision::Blocked => EXIT_BLOCKED,
        }
    }
}

pub fn evaluate(score: f64, threshold: f64, mode: Mode) -> Enforcement {
    let rounded = round_to_precision(score);
    let passes = rounded >= threshold;
    let (decision, overridden) = match (passes, mode) {
        (true, _) => (Decision::Pass, false),
        (false, Mode::WriteOnly) => (Decision::Pass, true),
        (false, Mode::Enforce) => (Decision::Blocked, false),
    };
    Enforcement {
        score: rounded,
        threshold,
        decision,
        overridden,
    }
}
