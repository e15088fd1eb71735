use dotenvy::dotenv;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::ConfigError;
use crate::evaluation::{EngineSettings, DEFAULT_PROVIDER_TIMEOUT, DEFAULT_STORE_CAPACITY};

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub flags_path: PathBuf,
    /// JSON file backing the decision store; in memory when unset.
    pub decisions_path: Option<PathBuf>,
    /// Most decisions the store keeps before evicting old ones.
    pub decision_capacity: usize,
    /// Remembered decisions older than this are re-rolled; kept forever when unset.
    pub decision_ttl: Option<Duration>,
    pub persist_decisions: bool,
    pub debug_mode: bool,
    pub provider_timeout: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenv().is_ok();
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build from any variable source, `None` meaning unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let port = lookup("PORT").ok_or(ConfigError::Missing("PORT"))?;
        let port = port.trim().parse().map_err(|e: std::num::ParseIntError| ConfigError::Invalid {
            name: "PORT",
            value: port.clone(),
            reason: e.to_string(),
        })?;

        let flags_path = lookup("FLAGS_PATH")
            .filter(|p| !p.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("flags.json"));

        let decisions_path = lookup("DECISIONS_PATH")
            .filter(|p| !p.trim().is_empty())
            .map(PathBuf::from);

        let provider_timeout = parse_u64("PROVIDER_TIMEOUT_MS", lookup("PROVIDER_TIMEOUT_MS"))?
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_PROVIDER_TIMEOUT);

        let decision_capacity = match parse_u64("DECISION_CAPACITY", lookup("DECISION_CAPACITY"))? {
            Some(0) => {
                return Err(ConfigError::Invalid {
                    name: "DECISION_CAPACITY",
                    value: "0".to_string(),
                    reason: "must be at least 1".to_string(),
                })
            }
            Some(capacity) => usize::try_from(capacity).unwrap_or(usize::MAX),
            None => DEFAULT_STORE_CAPACITY,
        };

        let decision_ttl = parse_u64("DECISION_TTL_SECS", lookup("DECISION_TTL_SECS"))?.map(Duration::from_secs);

        Ok(Self {
            port,
            flags_path,
            decisions_path,
            decision_capacity,
            decision_ttl,
            persist_decisions: parse_bool("PERSIST_DECISIONS", lookup("PERSIST_DECISIONS"))?,
            debug_mode: parse_bool("DEBUG_MODE", lookup("DEBUG_MODE"))?,
            provider_timeout,
        })
    }

    pub fn addr(&self) -> String {
        format!("127.0.0.1:{}", self.port)
    }

    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            persist: self.persist_decisions,
            debug: self.debug_mode,
            provider_timeout: self.provider_timeout,
        }
    }
}

// Unset or blank means None
fn parse_u64(name: &'static str, raw: Option<String>) -> Result<Option<u64>, ConfigError> {
    let Some(raw) = raw.filter(|raw| !raw.trim().is_empty()) else {
        return Ok(None);
    };

    raw.trim().parse().map(Some).map_err(|e: std::num::ParseIntError| ConfigError::Invalid {
        name,
        value: raw.clone(),
        reason: e.to_string(),
    })
}

// Unset means false
fn parse_bool(name: &'static str, raw: Option<String>) -> Result<bool, ConfigError> {
    let Some(raw) = raw else {
        return Ok(false);
    };

    match raw.trim().to_ascii_lowercase().as_str() {
        "" | "0" | "false" | "no" | "off" => Ok(false),
        "1" | "true" | "yes" | "on" => Ok(true),
        _ => Err(ConfigError::Invalid {
            name,
            value: raw,
            reason: "expected a boolean".to_string(),
        }),
    }
}
