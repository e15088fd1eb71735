use std::sync::Arc;
use std::time::Duration;

use crate::evaluation::{DecisionCache, DecisionStore, NoopCache, ResolutionEngine, StoreCache, DEFAULT_NAMESPACE};

#[derive(Clone)]
pub struct AppState {
    pub engine: ResolutionEngine,
    /// Shared backend; each client gets its own namespace inside it.
    pub decisions: Arc<dyn DecisionStore>,
    /// Age after which a remembered decision is re-rolled.
    pub decision_ttl: Option<Duration>,
}

impl AppState {
    pub fn new(engine: ResolutionEngine, decisions: Arc<dyn DecisionStore>) -> Self {
        Self {
            engine,
            decisions,
            decision_ttl: None,
        }
    }

    pub fn with_decision_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.decision_ttl = ttl;
        self
    }

    /// Engine whose decision cache is scoped to one client. Without a client
    /// id nothing is remembered.
    pub fn engine_for(&self, client_id: Option<&str>) -> ResolutionEngine {
        let cache: Arc<dyn DecisionCache> = match client_id {
            Some(client_id) => {
                let cache = StoreCache::with_namespace(
                    self.decisions.clone(),
                    format!("{}:{}", DEFAULT_NAMESPACE, client_id),
                );
                match self.decision_ttl {
                    Some(ttl) => Arc::new(cache.with_ttl(ttl)),
                    None => Arc::new(cache),
                }
            }
            None => Arc::new(NoopCache),
        };
        self.engine.with_cache(cache)
    }
}
