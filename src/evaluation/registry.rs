use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

use super::algorithm::{percentages, PERCENTAGE_ROLLOUT};
use super::condition::Operator;
use crate::error::SnapshotError;

// MODELS

/// One possible outcome of a flag. `value` holds the serialized payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variant {
    pub uuid: String,
    pub label: String,
    pub value: String,
}

impl Variant {
    pub fn parse_value(&self) -> Result<Value, serde_json::Error> {
        serde_json::from_str(&self.value)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionConfig {
    pub uuid: String,
    pub plugin_id: String,
    #[serde(default)]
    pub operator: Operator,
    #[serde(default)]
    pub configuration: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlgorithmConfig {
    pub uuid: String,
    pub plugin_id: String,
    #[serde(default)]
    pub weight: i32,
    #[serde(default)]
    pub configuration: Map<String, Value>,
    #[serde(default)]
    pub conditions: Vec<ConditionConfig>,
}

impl AlgorithmConfig {
    pub fn is_catch_all(&self) -> bool {
        self.conditions.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Flag {
    pub id: String,
    pub label: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "status", default = "enabled_by_default")]
    pub enabled: bool,
    pub variants: Vec<Variant>,
    #[serde(default)]
    pub algorithms: Vec<AlgorithmConfig>,
}

fn enabled_by_default() -> bool {
    true
}

impl Flag {
    pub fn variant(&self, uuid: &str) -> Option<&Variant> {
        self.variants.iter().find(|v| v.uuid == uuid)
    }

    /// Algorithms in evaluation order.
    pub fn algorithms(&self) -> &[AlgorithmConfig] {
        &self.algorithms
    }
}

#[derive(Debug, Deserialize)]
struct Snapshot {
    flags: Vec<Flag>,
}

// REGISTRY

/// Immutable snapshot of every enabled flag. Replaced wholesale on reload.
#[derive(Debug, Default)]
pub struct FlagRegistry {
    flags: HashMap<String, Arc<Flag>>,
}

impl FlagRegistry {
    /// Validate and index a set of flags. Disabled flags are left out.
    pub fn new(flags: Vec<Flag>) -> Result<Self, SnapshotError> {
        let mut indexed = HashMap::with_capacity(flags.len());

        for mut flag in flags {
            if !flag.enabled {
                debug!(flag_id = %flag.id, "skipping disabled feature flag");
                continue;
            }

            // stable, so equal weights keep their declared order
            flag.algorithms.sort_by_key(|algorithm| algorithm.weight);
            validate_flag(&flag)?;

            if indexed.contains_key(&flag.id) {
                return Err(SnapshotError::DuplicateFlag(flag.id));
            }
            indexed.insert(flag.id.clone(), Arc::new(flag));
        }

        Ok(Self { flags: indexed })
    }

    pub fn from_json(json: &str) -> Result<Self, SnapshotError> {
        let snapshot: Snapshot = serde_json::from_str(json)?;
        Self::new(snapshot.flags)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, SnapshotError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)?;
        let registry = Self::from_json(&json)?;
        info!(path = %path.display(), flags = registry.len(), "loaded feature flag snapshot");
        Ok(registry)
    }

    pub fn get(&self, flag_id: &str) -> Option<Arc<Flag>> {
        self.flags.get(flag_id).cloned()
    }

    /// All flags, ordered by id.
    pub fn flags(&self) -> Vec<Arc<Flag>> {
        let mut flags: Vec<_> = self.flags.values().cloned().collect();
        flags.sort_by(|a, b| a.id.cmp(&b.id));
        flags
    }

    pub fn len(&self) -> usize {
        self.flags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flags.is_empty()
    }
}

// HELPER FUNCTIONS

/// Load-time invariants: two or more distinct variants, percentage keys that
/// name real variants, and at least one catch-all algorithm.
pub fn validate_flag(flag: &Flag) -> Result<(), SnapshotError> {
    if flag.variants.len() < 2 {
        return Err(SnapshotError::TooFewVariants {
            flag_id: flag.id.clone(),
            count: flag.variants.len(),
        });
    }

    let mut seen = HashSet::new();
    for variant in &flag.variants {
        if !seen.insert(variant.uuid.as_str()) {
            return Err(SnapshotError::DuplicateVariant {
                flag_id: flag.id.clone(),
                uuid: variant.uuid.clone(),
            });
        }
    }

    for algorithm in &flag.algorithms {
        if algorithm.plugin_id != PERCENTAGE_ROLLOUT {
            continue;
        }
        for (variant_uuid, _) in percentages(&algorithm.configuration) {
            if !seen.contains(variant_uuid) {
                return Err(SnapshotError::UnknownVariantReference {
                    flag_id: flag.id.clone(),
                    algorithm_uuid: algorithm.uuid.clone(),
                    variant_uuid: variant_uuid.to_string(),
                });
            }
        }
    }

    if !flag.algorithms.iter().any(AlgorithmConfig::is_catch_all) {
        return Err(SnapshotError::MissingCatchAll(flag.id.clone()));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn snapshot(flags: Value) -> String {
        json!({ "flags": flags }).to_string()
    }

    fn rollout_flag(id: &str) -> Value {
        json!({
            "id": id,
            "label": "Checkout redesign",
            "variants": [
                { "uuid": "a", "label": "Control", "value": "{\"enabled\":false}" },
                { "uuid": "b", "label": "Treatment", "value": "{\"enabled\":true}" }
            ],
            "algorithms": [
                {
                    "uuid": "alg-late",
                    "plugin_id": "percentage_rollout",
                    "weight": 5,
                    "configuration": { "percentages": { "a": 50, "b": 50 } }
                },
                {
                    "uuid": "alg-early",
                    "plugin_id": "percentage_rollout",
                    "weight": -1,
                    "configuration": { "percentages": { "b": 100 } },
                    "conditions": [
                        { "uuid": "c1", "plugin_id": "user_id", "operator": "OR",
                          "configuration": { "values": ["u1"] } }
                    ]
                }
            ]
        })
    }

    #[test]
    fn test_loads_and_sorts_by_weight() {
        let registry = FlagRegistry::from_json(&snapshot(json!([rollout_flag("checkout")]))).unwrap();

        let flag = registry.get("checkout").unwrap();
        let order: Vec<_> = flag.algorithms().iter().map(|a| a.uuid.as_str()).collect();
        assert_eq!(order, ["alg-early", "alg-late"]);
        assert_eq!(flag.algorithms()[0].conditions[0].operator, Operator::Or);
        assert!(flag.enabled);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_equal_weights_keep_declared_order() {
        let mut flag = rollout_flag("ties");
        flag["algorithms"][1]["weight"] = json!(5);
        flag["algorithms"][1]["conditions"] = json!([]);

        let registry = FlagRegistry::from_json(&snapshot(json!([flag]))).unwrap();
        let order: Vec<_> = registry.get("ties").unwrap().algorithms().iter().map(|a| a.uuid.clone()).collect();
        assert_eq!(order, ["alg-late", "alg-early"]);
    }

    #[test]
    fn test_disabled_flags_are_excluded() {
        let mut flag = rollout_flag("dark");
        flag["status"] = json!(false);

        let registry = FlagRegistry::from_json(&snapshot(json!([flag, rollout_flag("live")]))).unwrap();
        assert!(registry.get("dark").is_none());
        assert!(registry.get("live").is_some());
    }

    #[test]
    fn test_status_is_the_only_enabled_key() {
        let mut flag = rollout_flag("dark");
        flag["status"] = json!(false);
        flag["enabled"] = json!(true);

        let registry = FlagRegistry::from_json(&snapshot(json!([flag]))).unwrap();
        assert!(registry.is_empty());

        let live = FlagRegistry::from_json(&snapshot(json!([rollout_flag("live")]))).unwrap();
        let serialized = serde_json::to_value(live.get("live").unwrap().as_ref()).unwrap();
        assert_eq!(serialized["status"], json!(true));
        assert!(serialized.get("enabled").is_none());
    }

    #[test]
    fn test_rejects_duplicate_flags() {
        let err = FlagRegistry::from_json(&snapshot(json!([rollout_flag("x"), rollout_flag("x")]))).unwrap_err();
        assert!(matches!(err, SnapshotError::DuplicateFlag(id) if id == "x"));
    }

    #[test]
    fn test_rejects_single_variant() {
        let mut flag = rollout_flag("lonely");
        flag["variants"] = json!([{ "uuid": "a", "label": "Only", "value": "1" }]);
        flag["algorithms"] = json!([{ "uuid": "alg", "plugin_id": "percentage_rollout",
            "configuration": { "percentages": { "a": 100 } } }]);

        let err = FlagRegistry::from_json(&snapshot(json!([flag]))).unwrap_err();
        assert!(matches!(err, SnapshotError::TooFewVariants { count: 1, .. }));
    }

    #[test]
    fn test_rejects_duplicate_variant_uuid() {
        let mut flag = rollout_flag("dupe");
        flag["variants"][1]["uuid"] = json!("a");

        let err = FlagRegistry::from_json(&snapshot(json!([flag]))).unwrap_err();
        assert!(matches!(err, SnapshotError::DuplicateVariant { uuid, .. } if uuid == "a"));
    }

    #[test]
    fn test_rejects_unknown_variant_reference() {
        let mut flag = rollout_flag("stale");
        flag["algorithms"][0]["configuration"]["percentages"] = json!({ "a": 50, "ghost": 50 });

        let err = FlagRegistry::from_json(&snapshot(json!([flag]))).unwrap_err();
        match err {
            SnapshotError::UnknownVariantReference { flag_id, algorithm_uuid, variant_uuid } => {
                assert_eq!(flag_id, "stale");
                assert_eq!(algorithm_uuid, "alg-late");
                assert_eq!(variant_uuid, "ghost");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_rejects_missing_catch_all() {
        let mut flag = rollout_flag("gated");
        flag["algorithms"] = json!([flag["algorithms"][1].clone()]);

        let err = FlagRegistry::from_json(&snapshot(json!([flag]))).unwrap_err();
        assert!(matches!(err, SnapshotError::MissingCatchAll(id) if id == "gated"));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("flags.json");
        std::fs::write(&path, snapshot(json!([rollout_flag("filed")]))).unwrap();

        let registry = FlagRegistry::load(&path).unwrap();
        assert_eq!(registry.flags().len(), 1);

        let missing = FlagRegistry::load(dir.path().join("absent.json")).unwrap_err();
        assert!(matches!(missing, SnapshotError::Io(_)));
    }

    #[test]
    fn test_variant_value_parsing() {
        let variant = Variant { uuid: "a".into(), label: "A".into(), value: "{\"enabled\":true}".into() };
        assert_eq!(variant.parse_value().unwrap(), json!({ "enabled": true }));

        let raw = Variant { uuid: "b".into(), label: "B".into(), value: "not json".into() };
        assert!(raw.parse_value().is_err());
    }
}
