//! Composite score

use super::WeightSet;
use crate::models::Signal;

/// Smallest score difference the gate distinguishes
pub const SCORE_PRECISION: f64 = 0.01;

/// Weighted aggregate of the present signals. Pure; no clamping beyond
/// what the inputs already guarantee.
pub fn composite_score(signals: &[Signal], weights: &WeightSet) -> f64 {
    let sum: f64 = signals
        .iter()
        .filter_map(|s| s.value.map(|v| weights.active_weight(s.category) * v / 100.0))
        .sum();
    100.0 * sum
}

/// Round to the score precision unit
pub fn round_to_precision(score: f64) -> f64 {
    let units = 1.0 / SCORE_PRECISION;
    (score * units).round() / units
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SignalWeights;
    use crate::models::{Provenance, SignalCategory, Tier};
    use std::collections::{BTreeMap, BTreeSet};

    fn signal(category: SignalCategory, value: Option<f64>) -> Signal {
        Signal {
            category,
            value,
            provenance: Provenance {
                source: "test".into(),
                tier: Tier::Secondary,
                raw: BTreeMap::new(),
                notes: Vec::new(),
            },
        }
    }

    fn score_of(values: [Option<f64>; 4]) -> f64 {
        let signals: Vec<Signal> = SignalCategory::ALL
            .iter()
            .zip(values)
            .map(|(c, v)| signal(*c, v))
            .collect();
        let present: BTreeSet<_> = signals
            .iter()
            .filter(|s| s.is_present())
            .map(|s| s.category)
            .collect();
        let weights = WeightSet::for_present(&SignalWeights::default(), &present);
        composite_score(&signals, &weights)
    }

    #[test]
    fn test_all_four_signals() {
        let score = score_of([Some(90.0), Some(95.0), Some(80.0), Some(100.0)]);
        // 27 + 38 + 12 + 15
        assert!((score - 92.0).abs() < 1e-9);
    }

    #[test]
    fn test_two_signals_renormalized() {
        let score = score_of([Some(70.0), Some(60.0), None, None]);
        assert!((score - 64.2857).abs() < 1e-3);
        assert_eq!(round_to_precision(score), 64.29);
    }

    #[test]
    fn test_no_signals_scores_zero() {
        assert_eq!(score_of([None, None, None, None]), 0.0);
    }

    #[test]
    fn test_bounds() {
        let grid = [0.0, 12.5, 50.0, 99.99, 100.0];
        for a in grid {
            for b in grid {
                let score = score_of([Some(a), Some(b), Some(b), Some(a)]);
                assert!((0.0..=100.0 + 1e-9).contains(&score), "{}", score);
            }
        }
        assert!((score_of([Some(100.0); 4]) - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_monotonic_in_each_signal() {
        let baseline = [Some(60.0), Some(70.0), Some(80.0), Some(90.0)];
        for i in 0..4 {
            let mut prev = f64::MIN;
            for step in 0..=20 {
                let mut values = baseline;
                values[i] = Some(step as f64 * 5.0);
                let score = score_of(values);
                assert!(score >= prev - 1e-12, "signal {} not monotonic", i);
                prev = score;
            }
        }
    }

    #[test]
    fn test_round_to_precision() {
        assert_eq!(round_to_precision(84.994), 84.99);
        assert_eq!(round_to_precision(84.996), 85.0);
    }
}
