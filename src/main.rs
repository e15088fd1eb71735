use std::sync::Arc;

use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::EnvFilter;

use flag_resolver::config::Config;
use flag_resolver::evaluation::{DecisionStore, JsonFileStore, MemoryStore};
use flag_resolver::routes;
use flag_resolver::state::AppState;
use flag_resolver::{FlagRegistry, ResolutionEngine};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::from_env()?;

    let default_level = if config.debug_mode { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    let registry = Arc::new(FlagRegistry::load(&config.flags_path)?);

    let decisions: Arc<dyn DecisionStore> = match &config.decisions_path {
        Some(path) => Arc::new(JsonFileStore::with_capacity(path, config.decision_capacity)),
        None => Arc::new(MemoryStore::with_capacity(config.decision_capacity)),
    };

    let engine = ResolutionEngine::builder(registry)
        .settings(config.engine_settings())
        .build();

    let state = AppState::new(engine, decisions).with_decision_ttl(config.decision_ttl);

    let app = routes::routes()
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(config.addr()).await?;

    info!("server is chilling at http://{}", config.addr());

    axum::serve(listener, app).await?;

    Ok(())
}
