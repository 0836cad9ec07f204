//! Mapping of module-published metric keys onto signal categories

use crate::discovery::ModuleOutput;
use crate::models::{clamp_signal, SignalCategory};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;

const LINT_ALIASES: &[&str] = &["lint", "lints", "ruff", "code_quality"];
const TEST_ALIASES: &[&str] = &["tests", "test", "pytest", "coverage_pct", "test_pass_pct"];
const PLACEHOLDER_ALIASES: &[&str] = &["placeholders", "todo", "todos", "fixme", "tech_debt"];
const SESSION_ALIASES: &[&str] = &["sessions", "session", "runtime_sessions", "stability"];

pub fn aliases_for(category: SignalCategory) -> &'static [&'static str] {
    match category {
        SignalCategory::Lint => LINT_ALIASES,
        SignalCategory::Tests => TEST_ALIASES,
        SignalCategory::Placeholders => PLACEHOLDER_ALIASES,
        SignalCategory::Sessions => SESSION_ALIASES,
    }
}

/// A value taken from an adopted module
#[derive(Debug, Clone, PartialEq)]
pub struct PrimaryValue {
    pub value: f64,
    /// `<module>::<entrypoint>`
    pub source: String,
    /// Key the value was published under
    pub key: String,
}

pub type PrimaryValues = BTreeMap<SignalCategory, PrimaryValue>;

/// Numbers, or strings that parse as numbers
pub fn numeric_value(value: &JsonValue) -> Option<f64> {
    let n = match value {
        JsonValue::Number(n) => n.as_f64(),
        JsonValue::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    n.is_finite().then_some(n)
}

/// First adopted module (in scan order) to publish a category wins. Within
/// one module, aliases are tried in table order.
pub fn resolve_primary(outputs: &[ModuleOutput]) -> PrimaryValues {
    let mut resolved = PrimaryValues::new();
    for output in outputs {
        for category in SignalCategory::ALL {
            if resolved.contains_key(&category) {
                continue;
            }
            let hit = aliases_for(category).iter().find_map(|alias| {
                output
                    .values
                    .iter()
                    .find(|(k, _)| k.eq_ignore_ascii_case(alias))
                    .and_then(|(k, v)| numeric_value(v).map(|n| (k.clone(), n)))
            });
            if let Some((key, value)) = hit {
                resolved.insert(
                    category,
                    PrimaryValue {
                        value: clamp_signal(value),
                        source: output.source.clone(),
                        key,
                    },
                );
            }
        }
    }
    resolved
}
