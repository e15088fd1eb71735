pub mod routes;

use std::collections::BTreeMap;

use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ResolveError;
use crate::evaluation::{ContextMap, Resolution};

// MODELS

#[derive(Debug, Default, Deserialize)]
pub struct ResolveRequest {
    #[serde(default)]
    pub context: ContextMap,
}

#[derive(Debug, Deserialize)]
pub struct BatchResolveRequest {
    pub flags: Vec<String>,
    #[serde(default)]
    pub context: ContextMap,
}

#[derive(Debug, Serialize)]
pub struct ResolveResponse {
    pub flag_id: String,
    pub variant_uuid: String,
    pub variant_label: String,
    pub value: Value,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum FlagOutcome {
    Resolved(ResolveResponse),
    Failed { error: String },
}

#[derive(Debug, Serialize)]
pub struct BatchResolveResponse {
    pub results: BTreeMap<String, FlagOutcome>,
}

// HELPER FUNCTIONS

impl From<Resolution> for ResolveResponse {
    fn from(resolution: Resolution) -> Self {
        Self {
            flag_id: resolution.flag().id.clone(),
            variant_uuid: resolution.variant_uuid().to_string(),
            variant_label: resolution.variant_label().to_string(),
            value: resolution.into_value(),
        }
    }
}

impl From<Result<Resolution, ResolveError>> for FlagOutcome {
    fn from(result: Result<Resolution, ResolveError>) -> Self {
        match result {
            Ok(resolution) => FlagOutcome::Resolved(resolution.into()),
            Err(e) => FlagOutcome::Failed { error: e.to_string() },
        }
    }
}

// Unknown flags are the caller's problem, everything else is a broken snapshot
pub fn error_status(err: &ResolveError) -> StatusCode {
    match err {
        ResolveError::FlagNotFound { .. } => StatusCode::NOT_FOUND,
        ResolveError::NoMatchingAlgorithm { .. } | ResolveError::UnknownPlugin { .. } => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}
