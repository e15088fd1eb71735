use tracing::debug;

use super::condition::Operator;

/// One step of a resolution, reported to a [`TraceSink`].
#[derive(Debug, Clone, PartialEq)]
pub enum TraceEvent<'a> {
    CacheHit {
        flag_id: &'a str,
        variant_uuid: &'a str,
    },
    ContextBuilt {
        flag_id: &'a str,
        keys: Vec<&'a str>,
    },
    ConditionEvaluated {
        flag_id: &'a str,
        algorithm_uuid: &'a str,
        condition_uuid: &'a str,
        plugin_id: &'a str,
        operator: Operator,
        passed: bool,
    },
    AlgorithmEvaluated {
        flag_id: &'a str,
        algorithm_uuid: &'a str,
        plugin_id: &'a str,
        conditions_passed: bool,
        variant_uuid: Option<&'a str>,
    },
    Decided {
        flag_id: &'a str,
        variant_uuid: &'a str,
        variant_label: &'a str,
    },
}

/// Receives resolution events when debugging is switched on.
pub trait TraceSink: Send + Sync {
    fn record(&self, event: &TraceEvent<'_>);
}

/// Forwards every event to `tracing` at debug level.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl TraceSink for TracingSink {
    fn record(&self, event: &TraceEvent<'_>) {
        match event {
            TraceEvent::CacheHit { flag_id, variant_uuid } => {
                debug!(flag_id, variant_uuid, "using cached decision");
            }
            TraceEvent::ContextBuilt { flag_id, keys } => {
                debug!(flag_id, keys = ?keys, "context built");
            }
            TraceEvent::ConditionEvaluated {
                flag_id,
                algorithm_uuid,
                condition_uuid,
                plugin_id,
                operator,
                passed,
            } => {
                debug!(flag_id, algorithm_uuid, condition_uuid, plugin_id, operator = %operator, passed, "condition evaluated");
            }
            TraceEvent::AlgorithmEvaluated {
                flag_id,
                algorithm_uuid,
                plugin_id,
                conditions_passed,
                variant_uuid,
            } => {
                debug!(flag_id, algorithm_uuid, plugin_id, conditions_passed, variant_uuid = ?variant_uuid, "algorithm evaluated");
            }
            TraceEvent::Decided {
                flag_id,
                variant_uuid,
                variant_label,
            } => {
                debug!(flag_id, variant_uuid, variant_label, "decision made");
            }
        }
    }
}
