use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use gigcore_core::error::CoreError;
use gigcore_core::ids::{CorrectionId, DisputeId, ExpertiseId, TaskId};
use gigcore_core::model::{Capacity, CorrectionRow, Dispute, Task};
use tracing::instrument;
use uuid::Uuid;

use crate::error::ApiError;
use crate::state::ApiState;

/// Narrow, read-only JSON surface for operational tooling (capacity,
/// corrections, disputes, tasks). No write path is exposed here — mutation
/// happens only through the outbox-driven services or the admin CLI.
#[instrument(skip_all, name = "get_capacity")]
pub async fn get_capacity(
    State(state): State<Arc<ApiState>>,
    Path((expertise_id, zone)): Path<(Uuid, String)>,
) -> Result<Json<Capacity>, ApiError> {
    let capacity = state
        .store
        .get_capacity(ExpertiseId::from_uuid(expertise_id), &zone)
        .await?
        .ok_or(CoreError::NotFound("capacity"))?;
    Ok(Json(capacity))
}

#[instrument(skip_all, name = "get_correction")]
pub async fn get_correction(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<CorrectionRow>, ApiError> {
    let correction = state
        .store
        .get_correction(CorrectionId::from_uuid(id))
        .await?
        .ok_or(CoreError::NotFound("correction"))?;
    Ok(Json(correction))
}

#[instrument(skip_all, name = "get_dispute")]
pub async fn get_dispute(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Dispute>, ApiError> {
    let dispute = state
        .store
        .get_dispute(DisputeId::from_uuid(id))
        .await?
        .ok_or(CoreError::NotFound("dispute"))?;
    Ok(Json(dispute))
}

#[instrument(skip_all, name = "get_task")]
pub async fn get_task(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Task>, ApiError> {
    let task = state
        .store
        .get_task(TaskId::from_uuid(id))
        .await?
        .ok_or(CoreError::NotFound("task"))?;
    Ok(Json(task))
}
