use chrono::Utc;
use lru::LruCache;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::io::ErrorKind;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::debug;

use crate::error::StoreError;

pub const DEFAULT_NAMESPACE: &str = "feature_flags";

/// Records a store keeps before evicting the least recently written.
pub const DEFAULT_STORE_CAPACITY: usize = 10_000;

/// A previously resolved variant for one flag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    pub flag_id: String,
    pub variant_uuid: String,
    /// Epoch milliseconds at which the decision was stored.
    pub timestamp: i64,
}

/// Persisted layout of a decision.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DecisionRecord {
    variant_uuid: String,
    timestamp: i64,
}

/// Sticky decisions, one per flag. Implementations never fail: a read
/// problem is a miss and a write problem is a no-op.
pub trait DecisionCache: Send + Sync {
    fn get(&self, flag_id: &str) -> Option<Decision>;
    fn put(&self, flag_id: &str, variant_uuid: &str);
}

/// Cache that remembers nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopCache;

impl DecisionCache for NoopCache {
    fn get(&self, _flag_id: &str) -> Option<Decision> {
        None
    }

    fn put(&self, _flag_id: &str, _variant_uuid: &str) {}
}

/// Fallible key-value backend behind a [`StoreCache`].
pub trait DecisionStore: Send + Sync {
    fn read(&self, key: &str) -> Result<Option<String>, StoreError>;
    fn write(&self, key: &str, value: String) -> Result<(), StoreError>;
}

impl<T: DecisionStore + ?Sized> DecisionStore for Arc<T> {
    fn read(&self, key: &str) -> Result<Option<String>, StoreError> {
        (**self).read(key)
    }

    fn write(&self, key: &str, value: String) -> Result<(), StoreError> {
        (**self).write(key, value)
    }
}

/// Adapts a [`DecisionStore`] to the fail-silent cache contract.
///
/// Records live under `<namespace>:<flag_id>` as
/// `{"variantUuid": .., "timestamp": ..}`. With a TTL, records older than it
/// read as misses.
pub struct StoreCache<S> {
    store: S,
    namespace: String,
    ttl: Option<Duration>,
}

impl<S: DecisionStore> StoreCache<S> {
    pub fn new(store: S) -> Self {
        Self::with_namespace(store, DEFAULT_NAMESPACE)
    }

    pub fn with_namespace(store: S, namespace: impl Into<String>) -> Self {
        Self {
            store,
            namespace: namespace.into(),
            ttl: None,
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    fn expired(&self, timestamp: i64) -> bool {
        let Some(ttl) = self.ttl else {
            return false;
        };
        let age = Utc::now().timestamp_millis().saturating_sub(timestamp);
        i128::from(age) > ttl.as_millis() as i128
    }

    pub fn key(&self, flag_id: &str) -> String {
        format!("{}:{}", self.namespace, flag_id)
    }
}

impl<S: DecisionStore> DecisionCache for StoreCache<S> {
    fn get(&self, flag_id: &str) -> Option<Decision> {
        let key = self.key(flag_id);
        let raw = match self.store.read(&key) {
            Ok(raw) => raw?,
            Err(e) => {
                debug!(key = %key, error = %e, "decision read failed, treating as miss");
                return None;
            }
        };

        match serde_json::from_str::<DecisionRecord>(&raw) {
            Ok(record) if self.expired(record.timestamp) => {
                debug!(key = %key, timestamp = record.timestamp, "decision expired, treating as miss");
                None
            }
            Ok(record) => Some(Decision {
                flag_id: flag_id.to_string(),
                variant_uuid: record.variant_uuid,
                timestamp: record.timestamp,
            }),
            Err(e) => {
                debug!(key = %key, error = %e, "corrupt decision record, treating as miss");
                None
            }
        }
    }

    fn put(&self, flag_id: &str, variant_uuid: &str) {
        let key = self.key(flag_id);
        let record = DecisionRecord {
            variant_uuid: variant_uuid.to_string(),
            timestamp: Utc::now().timestamp_millis(),
        };

        let result = serde_json::to_string(&record)
            .map_err(StoreError::from)
            .and_then(|value| self.store.write(&key, value));
        if let Err(e) = result {
            debug!(key = %key, error = %e, "decision write failed, skipping");
        }
    }
}

// STORES

fn non_zero(capacity: usize) -> NonZeroUsize {
    NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN)
}

/// Process-local store, bounded by evicting the least recently used record.
#[derive(Debug)]
pub struct MemoryStore {
    entries: Mutex<LruCache<String, String>>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_STORE_CAPACITY)
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(LruCache::new(non_zero(capacity))),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|entries| entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl DecisionStore for MemoryStore {
    fn read(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| StoreError::Unavailable("memory store lock poisoned".to_string()))?;
        Ok(entries.get(key).cloned())
    }

    fn write(&self, key: &str, value: String) -> Result<(), StoreError> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| StoreError::Unavailable("memory store lock poisoned".to_string()))?;
        entries.put(key.to_string(), value);
        Ok(())
    }
}

/// Durable store keeping every record in one JSON object on disk.
///
/// Records are kept in write order; past `capacity` the oldest are dropped.
/// Writes go to a sibling temp file that is renamed over the original.
///
/// Reads and writes are blocking file I/O on the calling thread, and every
/// write rewrites the whole file. Suited to small deployments; front it with
/// something else when decisions are written at high rates.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    capacity: usize,
    write_lock: Mutex<()>,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_capacity(path, DEFAULT_STORE_CAPACITY)
    }

    pub fn with_capacity(path: impl Into<PathBuf>, capacity: usize) -> Self {
        Self {
            path: path.into(),
            capacity: non_zero(capacity).get(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<Map<String, Value>, StoreError> {
        match std::fs::read_to_string(&self.path) {
            Ok(json) => Ok(serde_json::from_str(&json)?),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Map::new()),
            Err(e) => Err(e.into()),
        }
    }
}

impl DecisionStore for JsonFileStore {
    fn read(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.load()?.remove(key).map(|value| match value {
            Value::String(raw) => raw,
            other => other.to_string(),
        }))
    }

    fn write(&self, key: &str, value: String) -> Result<(), StoreError> {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| StoreError::Unavailable("file store lock poisoned".to_string()))?;

        let mut entries = match self.load() {
            Ok(entries) => entries,
            Err(StoreError::Serde(e)) => {
                debug!(path = %self.path.display(), error = %e, "discarding unreadable decision file");
                Map::new()
            }
            Err(e) => return Err(e),
        };

        // rewritten keys move to the back
        entries.shift_remove(key);
        entries.insert(key.to_string(), Value::String(value));
        while entries.len() > self.capacity {
            let Some(oldest) = entries.keys().next().cloned() else {
                break;
            };
            entries.shift_remove(&oldest);
        }

        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, serde_json::to_vec(&entries)?)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}
