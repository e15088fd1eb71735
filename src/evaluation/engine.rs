use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::algorithm::DecisionInput;
use super::bucket::{Bucketer, HashBucketer};
use super::cache::{DecisionCache, MemoryStore, StoreCache};
use super::context::{build_context, Context, ContextMap, ContextProvider, NamedProvider};
use super::plugins::PluginRegistry;
use super::registry::{AlgorithmConfig, Flag, FlagRegistry, Variant};
use super::trace::{TraceEvent, TraceSink, TracingSink};
use crate::error::{PluginType, ResolveError};

pub const DEFAULT_PROVIDER_TIMEOUT: Duration = Duration::from_millis(1000);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineSettings {
    /// Remember decisions so a subject never re-rolls.
    pub persist: bool,
    /// Report every resolution step to the trace sink.
    pub debug: bool,
    /// How long pending context values may take before they are dropped.
    pub provider_timeout: Duration,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            persist: false,
            debug: false,
            provider_timeout: DEFAULT_PROVIDER_TIMEOUT,
        }
    }
}

/// Outcome of resolving a flag.
#[derive(Debug, Clone)]
pub struct Resolution {
    flag: Arc<Flag>,
    variant: Variant,
    value: Value,
}

impl Resolution {
    fn new(flag: Arc<Flag>, variant: Variant) -> Self {
        let value = match variant.parse_value() {
            Ok(value) => value,
            Err(e) => {
                warn!(flag_id = %flag.id, variant_uuid = %variant.uuid, error = %e, "failed to parse variant value, using raw string");
                Value::String(variant.value.clone())
            }
        };

        Self { flag, variant, value }
    }

    pub fn flag(&self) -> &Flag {
        &self.flag
    }

    pub fn variant(&self) -> &Variant {
        &self.variant
    }

    /// Parsed payload, or the raw string when it is not valid JSON.
    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn variant_uuid(&self) -> &str {
        &self.variant.uuid
    }

    pub fn variant_label(&self) -> &str {
        &self.variant.label
    }

    pub fn into_value(self) -> Value {
        self.value
    }
}

/// Resolves flags against a registry snapshot.
///
/// Cloning is cheap; clones share the registry, plugins, cache and
/// providers.
#[derive(Clone)]
pub struct ResolutionEngine {
    registry: Arc<FlagRegistry>,
    plugins: Arc<PluginRegistry>,
    settings: EngineSettings,
    cache: Arc<dyn DecisionCache>,
    bucketer: Arc<dyn Bucketer>,
    providers: Arc<[NamedProvider]>,
    initial_context: Arc<ContextMap>,
    trace: Option<Arc<dyn TraceSink>>,
}

impl ResolutionEngine {
    pub fn builder(registry: Arc<FlagRegistry>) -> EngineBuilder {
        EngineBuilder::new(registry)
    }

    pub fn registry(&self) -> &Arc<FlagRegistry> {
        &self.registry
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Same engine, different decision cache.
    pub fn with_cache(&self, cache: Arc<dyn DecisionCache>) -> Self {
        Self {
            cache,
            ..self.clone()
        }
    }

    /// Same engine over a new snapshot. The old snapshot is not touched.
    pub fn with_registry(&self, registry: Arc<FlagRegistry>) -> Self {
        Self {
            registry,
            ..self.clone()
        }
    }

    pub async fn resolve(&self, flag_id: &str) -> Result<Resolution, ResolveError> {
        self.resolve_with_context(flag_id, ContextMap::new()).await
    }

    /// Resolve with extra caller-supplied context values.
    pub async fn resolve_with_context(&self, flag_id: &str, initial: ContextMap) -> Result<Resolution, ResolveError> {
        debug!(flag_id, "resolving flag");

        // Step 1: Look up the flag
        let flag = self.registry.get(flag_id).ok_or_else(|| ResolveError::FlagNotFound {
            flag_id: flag_id.to_string(),
        })?;

        // Step 2: A stuck subject never re-rolls
        if self.settings.persist {
            if let Some(variant) = self.cached_variant(&flag) {
                self.trace(|| TraceEvent::CacheHit {
                    flag_id,
                    variant_uuid: &variant.uuid,
                });
                return Ok(Resolution::new(flag, variant));
            }
        }

        // Step 3: Build the context, waiting on pending providers
        let context = build_context(
            &self.initial_context,
            initial,
            &self.providers,
            self.settings.provider_timeout,
        )
        .await;
        self.trace(|| TraceEvent::ContextBuilt {
            flag_id,
            keys: context.keys().collect(),
        });

        // Step 4: Walk the algorithms in weight order
        let variant = self.evaluate(&flag, &context)?;
        self.trace(|| TraceEvent::Decided {
            flag_id,
            variant_uuid: &variant.uuid,
            variant_label: &variant.label,
        });

        // Step 5: Remember the decision
        if self.settings.persist {
            self.cache.put(flag_id, &variant.uuid);
        }

        Ok(Resolution::new(flag, variant))
    }

    fn cached_variant(&self, flag: &Flag) -> Option<Variant> {
        let decision = self.cache.get(&flag.id)?;
        match flag.variant(&decision.variant_uuid) {
            Some(variant) => Some(variant.clone()),
            None => {
                debug!(flag_id = %flag.id, variant_uuid = %decision.variant_uuid, "cached variant no longer exists, re-resolving");
                None
            }
        }
    }

    /// First algorithm whose conditions pass and which picks a variant wins.
    fn evaluate(&self, flag: &Flag, context: &Context) -> Result<Variant, ResolveError> {
        for algorithm in flag.algorithms() {
            let conditions_passed = self.conditions_pass(flag, algorithm, context)?;

            let variant = if conditions_passed {
                let decider = self
                    .plugins
                    .algorithm(&algorithm.plugin_id, &algorithm.configuration)
                    .ok_or_else(|| ResolveError::UnknownPlugin {
                        flag_id: flag.id.clone(),
                        plugin_type: PluginType::Algorithm,
                        plugin_id: algorithm.plugin_id.clone(),
                        uuid: algorithm.uuid.clone(),
                    })?;

                decider.decide(&DecisionInput {
                    flag_id: &flag.id,
                    context,
                    variants: &flag.variants,
                    persist: self.settings.persist,
                    bucketer: self.bucketer.as_ref(),
                })
            } else {
                None
            };

            self.trace(|| TraceEvent::AlgorithmEvaluated {
                flag_id: &flag.id,
                algorithm_uuid: &algorithm.uuid,
                plugin_id: &algorithm.plugin_id,
                conditions_passed,
                variant_uuid: variant.map(|v| v.uuid.as_str()),
            });

            if let Some(variant) = variant {
                return Ok(variant.clone());
            }
        }

        Err(ResolveError::NoMatchingAlgorithm {
            flag_id: flag.id.clone(),
        })
    }

    /// No conditions passes automatically; otherwise any single passing
    /// condition is enough. Every condition is evaluated.
    fn conditions_pass(&self, flag: &Flag, algorithm: &AlgorithmConfig, context: &Context) -> Result<bool, ResolveError> {
        if algorithm.is_catch_all() {
            return Ok(true);
        }

        let mut any_passed = false;
        for condition in &algorithm.conditions {
            let evaluator = self
                .plugins
                .condition(&condition.plugin_id, &condition.configuration, condition.operator)
                .ok_or_else(|| ResolveError::UnknownPlugin {
                    flag_id: flag.id.clone(),
                    plugin_type: PluginType::Condition,
                    plugin_id: condition.plugin_id.clone(),
                    uuid: condition.uuid.clone(),
                })?;

            let passed = evaluator.evaluate(context);
            self.trace(|| TraceEvent::ConditionEvaluated {
                flag_id: &flag.id,
                algorithm_uuid: &algorithm.uuid,
                condition_uuid: &condition.uuid,
                plugin_id: &condition.plugin_id,
                operator: condition.operator,
                passed,
            });
            any_passed |= passed;
        }

        Ok(any_passed)
    }

    fn trace<'a>(&self, event: impl FnOnce() -> TraceEvent<'a>) {
        if let Some(sink) = &self.trace {
            sink.record(&event());
        }
    }
}

pub struct EngineBuilder {
    registry: Arc<FlagRegistry>,
    plugins: Option<PluginRegistry>,
    settings: EngineSettings,
    cache: Option<Arc<dyn DecisionCache>>,
    bucketer: Option<Arc<dyn Bucketer>>,
    providers: Vec<NamedProvider>,
    initial_context: ContextMap,
    trace: Option<Arc<dyn TraceSink>>,
}

impl EngineBuilder {
    fn new(registry: Arc<FlagRegistry>) -> Self {
        Self {
            registry,
            plugins: None,
            settings: EngineSettings::default(),
            cache: None,
            bucketer: None,
            providers: Vec::new(),
            initial_context: ContextMap::new(),
            trace: None,
        }
    }

    /// Defaults to [`PluginRegistry::with_defaults`].
    pub fn plugins(mut self, plugins: PluginRegistry) -> Self {
        self.plugins = Some(plugins);
        self
    }

    pub fn settings(mut self, settings: EngineSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Defaults to a process-local in-memory cache.
    pub fn cache(mut self, cache: Arc<dyn DecisionCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn bucketer(mut self, bucketer: Arc<dyn Bucketer>) -> Self {
        self.bucketer = Some(bucketer);
        self
    }

    /// Providers run in registration order.
    pub fn provider(mut self, name: impl Into<String>, provider: impl ContextProvider + 'static) -> Self {
        self.providers.push(NamedProvider {
            name: name.into(),
            provider: Arc::new(provider),
        });
        self
    }

    pub fn initial_context(mut self, context: ContextMap) -> Self {
        self.initial_context = context;
        self
    }

    pub fn context_value(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.initial_context.insert(key.into(), value.into());
        self
    }

    /// Overrides the sink installed by `settings.debug`.
    pub fn trace_sink(mut self, sink: Arc<dyn TraceSink>) -> Self {
        self.trace = Some(sink);
        self
    }

    pub fn build(self) -> ResolutionEngine {
        let trace = match self.trace {
            Some(sink) => Some(sink),
            None if self.settings.debug => Some(Arc::new(TracingSink) as Arc<dyn TraceSink>),
            None => None,
        };

        ResolutionEngine {
            registry: self.registry,
            plugins: Arc::new(self.plugins.unwrap_or_else(PluginRegistry::with_defaults)),
            settings: self.settings,
            cache: self
                .cache
                .unwrap_or_else(|| Arc::new(StoreCache::new(MemoryStore::new()))),
            bucketer: self.bucketer.unwrap_or_else(|| Arc::new(HashBucketer)),
            providers: self.providers.into(),
            initial_context: Arc::new(self.initial_context),
            trace,
        }
    }
}
