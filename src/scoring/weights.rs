//! Weight normalization over the subset of present signals

use crate::config::SignalWeights;
use crate::models::SignalCategory;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Base weights plus the active weights recomputed for one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightSet {
    pub base: BTreeMap<SignalCategory, f64>,
    pub active: BTreeMap<SignalCategory, f64>,
}

impl WeightSet {
    pub fn for_present(base: &SignalWeights, present: &BTreeSet<SignalCategory>) -> Self {
        let base = base.as_map();
        let active = normalize_weights(&base, present);
        Self { base, active }
    }

    pub fn active_weight(&self, category: SignalCategory) -> f64 {
        self.active.get(&category).copied().unwrap_or(0.0)
    }
}

/// Restrict `base` to `present` and rescale so the result sums to 1.0.
///
/// An empty subset yields equal weights across all four categories. A
/// subset whose base weights sum to zero gets equal weights over itself.
pub fn normalize_weights(
    base: &BTreeMap<SignalCategory, f64>,
    present: &BTreeSet<SignalCategory>,
) -> BTreeMap<SignalCategory, f64> {
    if present.is_empty() {
        let equal = 1.0 / SignalCategory::ALL.len() as f64;
        return SignalCategory::ALL.iter().map(|c| (*c, equal)).collect();
    }

    let subset_sum: f64 = present
        .iter()
        .map(|c| base.get(c).copied().unwrap_or(0.0).max(0.0))
        .sum();

    if subset_sum <= 0.0 {
        let equal = 1.0 / present.len() as f64;
        return present.iter().map(|c| (*c, equal)).collect();
    }

    present
        .iter()
        .map(|c| {
            let w = base.get(c).copied().unwrap_or(0.0).max(0.0);
            (*c, w / subset_sum)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use SignalCategory::*;

    fn default_base() -> BTreeMap<SignalCategory, f64> {
        SignalWeights::default().as_map()
    }

    /// Every subset of the four categories
    fn all_subsets() -> Vec<BTreeSet<SignalCategory>> {
        (0u8..16)
            .map(|mask| {
                SignalCategory::ALL
                    .iter()
                    .enumerate()
                    .filter(|(i, _)| mask & (1 << i) != 0)
                    .map(|(_, c)| *c)
                    .collect()
            })
            .collect()
    }

    #[test]
    fn test_active_weights_sum_to_one_for_every_subset() {
        let base = default_base();
        for subset in all_subsets() {
            let active = normalize_weights(&base, &subset);
            let sum: f64 = active.values().sum();
            assert!((sum - 1.0).abs() < 1e-6, "subset {:?} sums to {}", subset, sum);
            if !subset.is_empty() {
                assert_eq!(active.keys().copied().collect::<BTreeSet<_>>(), subset);
            }
        }
    }

    #[test]
    fn test_empty_subset_is_equal_weights() {
        let active = normalize_weights(&default_base(), &BTreeSet::new());
        assert_eq!(active.len(), 4);
        for w in active.values() {
            assert!((w - 0.25).abs() < 1e-12);
        }
    }

    #[test]
    fn test_lint_and_tests_only() {
        let present: BTreeSet<_> = [Lint, Tests].into_iter().collect();
        let active = normalize_weights(&default_base(), &present);
        assert!((active[&Lint] - 0.4286).abs() < 1e-4);
        assert!((active[&Tests] - 0.5714).abs() < 1e-4);
    }

    #[test]
    fn test_zero_weight_subset_falls_back_to_equal() {
        let mut base = default_base();
        base.insert(Placeholders, 0.0);
        base.insert(Sessions, 0.0);
        let present: BTreeSet<_> = [Placeholders, Sessions].into_iter().collect();
        let active = normalize_weights(&base, &present);
        assert_eq!(active[&Placeholders], 0.5);
        assert_eq!(active[&Sessions], 0.5);
    }

    #[test]
    fn test_weight_set_serializes_category_keys() {
        let present: BTreeSet<_> = SignalCategory::ALL.into_iter().collect();
        let set = WeightSet::for_present(&SignalWeights::default(), &present);
        let json = serde_json::to_value(&set).unwrap();
        assert_eq!(json["base"]["tests"], 0.40);
        let back: WeightSet = serde_json::from_value(json).unwrap();
        assert_eq!(back, set);
    }
}
