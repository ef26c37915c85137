use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use bydsync_common::error::SyncError;
use bydsync_ingest::runs::{RunHandle, TriggerBody, TriggerResponse};
use uuid::Uuid;

use crate::error::ApiError;
use crate::sync::responses::RunStatusResponse;
use crate::AppState;

/// Accept a sync request; the run continues after the response is sent.
pub async fn submit_run(State(state): State<AppState>) -> (StatusCode, Json<TriggerBody>) {
    let handle = state.registry.submit(state.orchestrator.clone()).await;
    let response = TriggerResponse::accepted(handle);
    let status = StatusCode::from_u16(response.status_code).unwrap_or(StatusCode::OK);
    (status, Json(response.body))
}

pub async fn get_run(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<RunStatusResponse>, ApiError> {
    let id = Uuid::parse_str(&id)
        .map_err(|_| SyncError::Validation(format!("run id {id:?} is not a valid UUID")))?;

    let status = state
        .registry
        .status(&RunHandle(id))
        .await
        .ok_or_else(|| SyncError::NotFound(format!("no sync run with id {id}")))?;

    Ok(Json(RunStatusResponse { data: status }))
}
