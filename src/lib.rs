pub mod config;
pub mod error;
pub mod evaluation;
pub mod routes;
pub mod state;

pub use error::{ResolveError, SnapshotError};
pub use evaluation::{EngineSettings, FlagRegistry, Resolution, ResolutionEngine};
