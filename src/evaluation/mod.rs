//! Flag resolution engine.
//!
//! A [`FlagRegistry`] snapshot holds every flag with its variants and its
//! weight-ordered algorithms. [`ResolutionEngine::resolve`] consults the
//! decision cache, builds a [`Context`], then walks the algorithms until one
//! whose conditions pass picks a variant.

pub mod algorithm;
pub mod bucket;
pub mod cache;
pub mod condition;
pub mod context;
pub mod engine;
pub mod plugins;
pub mod registry;
pub mod trace;

pub use algorithm::{DecisionAlgorithm, DecisionInput, PercentageRollout, PERCENTAGE_ROLLOUT};
pub use bucket::{Bucketer, HashBucketer, BUCKET_COUNT};
pub use cache::{
    Decision, DecisionCache, DecisionStore, JsonFileStore, MemoryStore, NoopCache, StoreCache,
    DEFAULT_NAMESPACE, DEFAULT_STORE_CAPACITY,
};
pub use condition::{ConditionEvaluator, ContextValueCondition, Operator};
pub use context::{provider_fn, Context, ContextMap, ContextProvider, ContextSink, PendingValue, SUBJECT_KEY};
pub use engine::{EngineBuilder, EngineSettings, Resolution, ResolutionEngine, DEFAULT_PROVIDER_TIMEOUT};
pub use plugins::{PluginRegistry, USER_ID, USER_TIER};
pub use registry::{AlgorithmConfig, ConditionConfig, Flag, FlagRegistry, Variant};
pub use trace::{TraceEvent, TraceSink, TracingSink};
