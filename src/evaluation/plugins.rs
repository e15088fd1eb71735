use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

use super::algorithm::{DecisionAlgorithm, PercentageRollout, PERCENTAGE_ROLLOUT};
use super::condition::{ConditionEvaluator, ContextValueCondition, Operator};

pub const USER_ID: &str = "user_id";
pub const USER_TIER: &str = "user_tier";

pub type AlgorithmFactory =
    Arc<dyn Fn(&Map<String, Value>) -> Box<dyn DecisionAlgorithm> + Send + Sync>;
pub type ConditionFactory =
    Arc<dyn Fn(&Map<String, Value>, Operator) -> Box<dyn ConditionEvaluator> + Send + Sync>;

/// Maps plugin ids from the flag snapshot to the code that runs them.
///
/// Built once at startup and handed to the engine; nothing registers itself.
#[derive(Clone, Default)]
pub struct PluginRegistry {
    algorithms: HashMap<String, AlgorithmFactory>,
    conditions: HashMap<String, ConditionFactory>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the bundled plugins: `percentage_rollout`, `user_id`
    /// and `user_tier`.
    pub fn with_defaults() -> Self {
        Self::new()
            .register_algorithm(PERCENTAGE_ROLLOUT, |config| {
                Box::new(PercentageRollout::from_config(config))
            })
            .register_condition(USER_ID, |config, operator| {
                Box::new(ContextValueCondition::from_config(USER_ID, config, operator))
            })
            .register_condition(USER_TIER, |config, operator| {
                Box::new(ContextValueCondition::from_config(USER_TIER, config, operator))
            })
    }

    pub fn register_algorithm<F>(mut self, plugin_id: impl Into<String>, factory: F) -> Self
    where
        F: Fn(&Map<String, Value>) -> Box<dyn DecisionAlgorithm> + Send + Sync + 'static,
    {
        self.algorithms.insert(plugin_id.into(), Arc::new(factory));
        self
    }

    pub fn register_condition<F>(mut self, plugin_id: impl Into<String>, factory: F) -> Self
    where
        F: Fn(&Map<String, Value>, Operator) -> Box<dyn ConditionEvaluator> + Send + Sync + 'static,
    {
        self.conditions.insert(plugin_id.into(), Arc::new(factory));
        self
    }

    /// `None` when no algorithm is registered under `plugin_id`.
    pub fn algorithm(&self, plugin_id: &str, configuration: &Map<String, Value>) -> Option<Box<dyn DecisionAlgorithm>> {
        self.algorithms.get(plugin_id).map(|factory| factory(configuration))
    }

    /// `None` when no condition is registered under `plugin_id`.
    pub fn condition(
        &self,
        plugin_id: &str,
        configuration: &Map<String, Value>,
        operator: Operator,
    ) -> Option<Box<dyn ConditionEvaluator>> {
        self.conditions
            .get(plugin_id)
            .map(|factory| factory(configuration, operator))
    }

    pub fn has_algorithm(&self, plugin_id: &str) -> bool {
        self.algorithms.contains_key(plugin_id)
    }

    pub fn has_condition(&self, plugin_id: &str) -> bool {
        self.conditions.contains_key(plugin_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluation::context::Context;
    use serde_json::json;

    struct Always(bool);

    impl ConditionEvaluator for Always {
        fn evaluate(&self, _context: &Context) -> bool {
            self.0
        }
    }

    fn config(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected an object"),
        }
    }

    #[test]
    fn test_defaults_are_registered() {
        let plugins = PluginRegistry::with_defaults();
        assert!(plugins.has_algorithm(PERCENTAGE_ROLLOUT));
        assert!(plugins.has_condition(USER_ID));
        assert!(plugins.has_condition(USER_TIER));
        assert!(!plugins.has_condition("geo_ip"));
        assert!(plugins.algorithm("bandit", &Map::new()).is_none());
    }

    #[test]
    fn test_bundled_conditions_read_their_own_key() {
        let plugins = PluginRegistry::with_defaults();
        let values = config(json!({ "values": ["gold"] }));
        let context = match json!({ "user_id": "gold", "user_tier": "silver" }) {
            Value::Object(map) => Context::new(map),
            _ => unreachable!(),
        };

        let by_id = plugins.condition(USER_ID, &values, Operator::Or).unwrap();
        let by_tier = plugins.condition(USER_TIER, &values, Operator::Or).unwrap();
        assert!(by_id.evaluate(&context));
        assert!(!by_tier.evaluate(&context));
    }

    #[test]
    fn test_custom_registration() {
        let plugins = PluginRegistry::new().register_condition("always", |_, _| Box::new(Always(true)));
        let condition = plugins.condition("always", &Map::new(), Operator::Not).unwrap();
        assert!(condition.evaluate(&Context::default()));
        assert!(!plugins.has_algorithm(PERCENTAGE_ROLLOUT));
    }
}
