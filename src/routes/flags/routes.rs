use axum::{extract::State, Json};

use crate::state::AppState;
use super::{FlagListResponse, FlagSummary};

/// List every enabled flag in the loaded snapshot
pub async fn list(State(state): State<AppState>) -> Json<FlagListResponse> {
    let flags = state
        .engine
        .registry()
        .flags()
        .iter()
        .map(|flag| FlagSummary::from(flag.as_ref()))
        .collect();

    Json(FlagListResponse { flags })
}
