use futures::future::{join_all, BoxFuture};
use futures::FutureExt;
use serde::Serialize;
use serde_json::{Map, Value};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;
use uuid::Uuid;

use crate::error::ProviderError;

/// Context key holding the subject used for deterministic bucketing.
pub const SUBJECT_KEY: &str = "user_id";

pub type ContextMap = Map<String, Value>;

/// A value a provider has promised but not yet produced.
pub type PendingValue = BoxFuture<'static, Result<Value, ProviderError>>;

/// Evaluation context for one resolution. Immutable once built.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Context {
    values: ContextMap,
}

impl Context {
    pub fn new(values: ContextMap) -> Self {
        Self { values }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// The value under `key`, unless it is missing or falsy
    /// (`null`, `false`, `0`, `""`).
    pub fn truthy(&self, key: &str) -> Option<&Value> {
        self.values.get(key).filter(|value| is_truthy(value))
    }

    pub fn subject_key(&self) -> Option<String> {
        self.truthy(SUBJECT_KEY).map(value_to_string)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// String form used for condition matching, so `42` and `"42"` compare equal.
pub fn value_to_string(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::String(s) => s.clone(),
        Value::Number(n) => match n.as_f64() {
            // integral floats print without a fraction (1.0 -> "1")
            Some(f) if n.is_f64() && f.fract() == 0.0 && f.abs() < 1e15 => {
                format!("{}", f as i64)
            }
            _ => n.to_string(),
        },
        Value::Array(items) => items
            .iter()
            .map(value_to_string)
            .collect::<Vec<_>>()
            .join(","),
        Value::Object(_) => value.to_string(),
    }
}

/// Collects what a single provider contributes.
#[derive(Default)]
pub struct ContextSink {
    ready: Vec<(String, Value)>,
    pending: Vec<(String, PendingValue)>,
}

impl ContextSink {
    pub fn add(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.ready.push((key.into(), value.into()));
    }

    pub fn add_pending<F>(&mut self, key: impl Into<String>, value: F)
    where
        F: Future<Output = Result<Value, ProviderError>> + Send + 'static,
    {
        self.pending.push((key.into(), value.boxed()));
    }
}

/// Contributes values to the context of every resolution.
pub trait ContextProvider: Send + Sync {
    fn provide(&self, sink: &mut ContextSink) -> Result<(), ProviderError>;
}

impl<F> ContextProvider for F
where
    F: Fn(&mut ContextSink) -> Result<(), ProviderError> + Send + Sync,
{
    fn provide(&self, sink: &mut ContextSink) -> Result<(), ProviderError> {
        self(sink)
    }
}

/// Pins a closure to the provider signature so its argument types infer.
pub fn provider_fn<F>(f: F) -> F
where
    F: Fn(&mut ContextSink) -> Result<(), ProviderError> + Send + Sync + 'static,
{
    f
}

#[derive(Clone)]
pub(crate) struct NamedProvider {
    pub name: String,
    pub provider: Arc<dyn ContextProvider>,
}

/// Merge initial values with every provider's contribution.
///
/// Pending values share one deadline. A provider whose `provide` fails, or
/// any of whose pending values fails or misses the deadline, contributes
/// nothing at all. Contributions land in provider registration order, so a
/// later provider overwrites an earlier one. A random subject key is
/// injected when none is present.
pub(crate) async fn build_context(
    base: &ContextMap,
    initial: ContextMap,
    providers: &[NamedProvider],
    timeout: Duration,
) -> Context {
    let mut values = base.clone();
    values.extend(initial);

    let mut sinks = Vec::with_capacity(providers.len());
    for entry in providers {
        let mut sink = ContextSink::default();
        match entry.provider.provide(&mut sink) {
            Ok(()) => sinks.push((entry.name.as_str(), sink)),
            Err(e) => {
                warn!(provider = %entry.name, error = %e, "context provider failed, contribution dropped");
            }
        }
    }

    let deadline = tokio::time::Instant::now() + timeout;
    let contributions = join_all(
        sinks
            .into_iter()
            .map(|(name, sink)| settle(name, sink, deadline, timeout)),
    )
    .await;

    for contribution in contributions.into_iter().flatten() {
        values.extend(contribution);
    }

    if !values.get(SUBJECT_KEY).is_some_and(is_truthy) {
        values.insert(
            SUBJECT_KEY.to_string(),
            Value::String(Uuid::new_v4().simple().to_string()),
        );
    }

    Context { values }
}

/// All of a provider's values, or `None` when one of its pending values failed.
async fn settle(
    name: &str,
    sink: ContextSink,
    deadline: tokio::time::Instant,
    timeout: Duration,
) -> Option<Vec<(String, Value)>> {
    let ContextSink { mut ready, pending } = sink;

    let settled = join_all(pending.into_iter().map(|(key, value)| async move {
        (key, tokio::time::timeout_at(deadline, value).await)
    }))
    .await;

    for (key, outcome) in settled {
        match outcome {
            Ok(Ok(value)) => ready.push((key, value)),
            Ok(Err(e)) => {
                warn!(provider = %name, key = %key, error = %e, "pending context value failed, contribution dropped");
                return None;
            }
            Err(_) => {
                warn!(provider = %name, key = %key, timeout_ms = timeout.as_millis() as u64, "pending context value timed out, contribution dropped");
                return None;
            }
        }
    }

    Some(ready)
}
