use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use futures::future::join_all;
use tracing::warn;

use crate::routes::client_scope::ClientScope;
use crate::state::AppState;
use super::{error_status, BatchResolveRequest, BatchResolveResponse, FlagOutcome, ResolveRequest, ResolveResponse};

/// Resolve one flag for the calling client
pub async fn resolve(
    State(state): State<AppState>,
    ClientScope(client_id): ClientScope,
    Path(flag_id): Path<String>,
    payload: Option<Json<ResolveRequest>>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let Json(payload) = payload.unwrap_or_default();
    let engine = state.engine_for(client_id.as_deref());

    let resolution = engine
        .resolve_with_context(&flag_id, payload.context)
        .await
        .map_err(|e| {
            let status = error_status(&e);
            if status.is_server_error() {
                warn!(flag_id = %flag_id, error = %e, "flag resolution failed");
            }
            (status, e.to_string())
        })?;

    Ok(Json(ResolveResponse::from(resolution)))
}

/// Resolve several flags against one context; failures are reported per flag
pub async fn resolve_batch(
    State(state): State<AppState>,
    ClientScope(client_id): ClientScope,
    Json(payload): Json<BatchResolveRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    if payload.flags.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "At least one flag id is required".to_string()));
    }

    let engine = state.engine_for(client_id.as_deref());

    let outcomes = join_all(payload.flags.iter().map(|flag_id| {
        let engine = engine.clone();
        let context = payload.context.clone();
        async move { engine.resolve_with_context(flag_id, context).await }
    }))
    .await;

    let results = payload
        .flags
        .iter()
        .cloned()
        .zip(outcomes.into_iter().map(FlagOutcome::from))
        .collect();

    Ok(Json(BatchResolveResponse { results }))
}
