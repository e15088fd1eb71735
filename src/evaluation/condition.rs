use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use super::context::{value_to_string, Context};

/// Logical operator attached to a condition.
///
/// The bundled conditions check a single context value, so `And` behaves
/// like `Or` for them. The operator stays a first-class field so conditions
/// over several values can tell the two apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Operator {
    And,
    #[default]
    Or,
    Not,
}

impl Operator {
    pub fn apply(self, matches: bool) -> bool {
        match self {
            Operator::Not => !matches,
            Operator::And | Operator::Or => matches,
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operator::And => f.write_str("AND"),
            Operator::Or => f.write_str("OR"),
            Operator::Not => f.write_str("NOT"),
        }
    }
}

/// Gate deciding whether an algorithm applies to a context.
pub trait ConditionEvaluator: Send + Sync {
    fn evaluate(&self, context: &Context) -> bool;
}

/// Matches one context key against a configured list of allowed values.
///
/// Both sides are compared as strings, so numeric and string configuration
/// are interchangeable. Matching is case-sensitive.
#[derive(Debug, Clone)]
pub struct ContextValueCondition {
    context_key: String,
    values: Vec<String>,
    operator: Operator,
}

impl ContextValueCondition {
    pub fn new(context_key: impl Into<String>, values: Vec<String>, operator: Operator) -> Self {
        Self {
            context_key: context_key.into(),
            values,
            operator,
        }
    }

    /// Reads `values` from a plugin configuration; anything but an array
    /// counts as an empty list.
    pub fn from_config(context_key: &str, configuration: &Map<String, Value>, operator: Operator) -> Self {
        let values = configuration
            .get("values")
            .and_then(Value::as_array)
            .map(|items| items.iter().map(value_to_string).collect())
            .unwrap_or_default();

        Self::new(context_key, values, operator)
    }

    pub fn context_key(&self) -> &str {
        &self.context_key
    }

    fn matches(&self, context: &Context) -> bool {
        match context.truthy(&self.context_key) {
            Some(value) => {
                let value = value_to_string(value);
                self.values.iter().any(|allowed| *allowed == value)
            }
            None => false,
        }
    }
}

impl ConditionEvaluator for ContextValueCondition {
    fn evaluate(&self, context: &Context) -> bool {
        self.operator.apply(self.matches(context))
    }
}
