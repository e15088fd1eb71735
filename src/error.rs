use std::fmt;
use thiserror::Error;

/// Which half of the plugin system an unknown id belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PluginType {
    Algorithm,
    Condition,
}

impl fmt::Display for PluginType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PluginType::Algorithm => f.write_str("algorithm"),
            PluginType::Condition => f.write_str("condition"),
        }
    }
}

/// Fatal outcome of a single `resolve` call.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ResolveError {
    #[error("feature flag \"{flag_id}\" not found")]
    FlagNotFound { flag_id: String },

    #[error("no matching algorithm found for feature flag \"{flag_id}\"")]
    NoMatchingAlgorithm { flag_id: String },

    #[error("unknown {plugin_type} plugin \"{plugin_id}\" ({uuid}) on feature flag \"{flag_id}\"")]
    UnknownPlugin {
        flag_id: String,
        plugin_type: PluginType,
        plugin_id: String,
        uuid: String,
    },
}

impl ResolveError {
    pub fn flag_id(&self) -> &str {
        match self {
            ResolveError::FlagNotFound { flag_id }
            | ResolveError::NoMatchingAlgorithm { flag_id }
            | ResolveError::UnknownPlugin { flag_id, .. } => flag_id,
        }
    }
}

/// Rejections raised while loading a flag snapshot.
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("failed to read flag snapshot: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid flag snapshot JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("feature flag \"{0}\" is defined more than once")]
    DuplicateFlag(String),

    #[error("feature flag \"{flag_id}\" has {count} variant(s), at least 2 are required")]
    TooFewVariants { flag_id: String, count: usize },

    #[error("feature flag \"{flag_id}\" defines variant {uuid} more than once")]
    DuplicateVariant { flag_id: String, uuid: String },

    #[error("algorithm {algorithm_uuid} on feature flag \"{flag_id}\" references unknown variant {variant_uuid}")]
    UnknownVariantReference {
        flag_id: String,
        algorithm_uuid: String,
        variant_uuid: String,
    },

    #[error("feature flag \"{0}\" has no catch-all algorithm (one without conditions is required)")]
    MissingCatchAll(String),
}

/// Failure of a decision store backend. Never reaches callers of `resolve`.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("decision store unavailable: {0}")]
    Unavailable(String),

    #[error("decision store I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("decision record could not be (de)serialized: {0}")]
    Serde(#[from] serde_json::Error),
}

/// A context provider could not contribute its values.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct ProviderError(String);

impl ProviderError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} missing, it is required")]
    Missing(&'static str),

    #[error("{name} has an invalid value \"{value}\": {reason}")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },
}
