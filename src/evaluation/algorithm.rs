use serde_json::{Map, Value};
use tracing::warn;

use super::bucket::Bucketer;
use super::context::Context;
use super::registry::Variant;

pub const PERCENTAGE_ROLLOUT: &str = "percentage_rollout";

/// Everything an algorithm may look at when picking a variant.
pub struct DecisionInput<'a> {
    pub flag_id: &'a str,
    pub context: &'a Context,
    pub variants: &'a [Variant],
    /// Whether decisions persist, which asks for deterministic bucketing.
    pub persist: bool,
    pub bucketer: &'a dyn Bucketer,
}

/// Strategy that maps a context onto one of a flag's variants.
pub trait DecisionAlgorithm: Send + Sync {
    /// `None` lets the walk continue to the next algorithm.
    fn decide<'a>(&self, input: &DecisionInput<'a>) -> Option<&'a Variant>;
}

/// Splits subjects across variants by configured percentages.
#[derive(Debug, Clone, Default)]
pub struct PercentageRollout {
    percentages: Vec<(String, u32)>,
}

impl PercentageRollout {
    pub fn new(percentages: Vec<(String, u32)>) -> Self {
        Self { percentages }
    }

    pub fn from_config(configuration: &Map<String, Value>) -> Self {
        Self::new(
            percentages(configuration)
                .into_iter()
                .map(|(uuid, percentage)| (uuid.to_string(), percentage))
                .collect(),
        )
    }

    /// First variant whose cumulative percentage exceeds `bucket`.
    fn select(&self, bucket: u32) -> Option<&str> {
        let mut cumulative = 0u32;
        self.percentages.iter().find_map(|(uuid, percentage)| {
            cumulative = cumulative.saturating_add(*percentage);
            (bucket < cumulative).then_some(uuid.as_str())
        })
    }
}

impl DecisionAlgorithm for PercentageRollout {
    fn decide<'a>(&self, input: &DecisionInput<'a>) -> Option<&'a Variant> {
        let subject = if input.persist { input.context.subject_key() } else { None };
        let bucket = match subject {
            Some(key) => input.bucketer.bucket(&key),
            None => input.bucketer.random_bucket(),
        };

        match self.select(bucket) {
            Some(uuid) => input.variants.iter().find(|v| v.uuid == uuid),
            // percentages short of 100: fail open to the flag's first variant
            None => input.variants.first(),
        }
    }
}

// HELPER FUNCTIONS

/// `configuration.percentages` in insertion order. Values may be integers
/// or numeric strings; anything else counts as zero.
pub fn percentages(configuration: &Map<String, Value>) -> Vec<(&str, u32)> {
    let Some(entries) = configuration.get("percentages").and_then(Value::as_object) else {
        return Vec::new();
    };

    entries
        .iter()
        .map(|(uuid, raw)| {
            let percentage = match raw {
                Value::Number(n) => n.as_u64().or_else(|| whole_float(n.as_f64()?)).map(|p| p.min(u64::from(u32::MAX)) as u32),
                Value::String(s) => s.trim().parse::<u32>().ok(),
                _ => None,
            };
            if percentage.is_none() {
                warn!(variant_uuid = %uuid, value = %raw, "ignoring invalid rollout percentage");
            }
            (uuid.as_str(), percentage.unwrap_or(0))
        })
        .collect()
}

// 50.0 counts as 50, 12.5 is invalid
fn whole_float(f: f64) -> Option<u64> {
    (f >= 0.0 && f.fract() == 0.0 && f <= u64::MAX as f64).then_some(f as u64)
}
