use axum::{
    extract::{rejection::JsonRejection, Path, State},
    Json,
};
use jt_common::api::{AppliedResponse, MessageResponse, SaveJobRequest, SaveJobResponse};
use jt_common::api::job_responses::JOB_REMOVED;
use jt_common::Job;

use crate::auth::UserOrAdmin;
use crate::error::ApiError;
use crate::SharedState;

pub async fn save_job(
    State(state): State<SharedState>,
    UserOrAdmin(principal): UserOrAdmin,
    payload: Result<Json<SaveJobRequest>, JsonRejection>,
) -> Result<Json<SaveJobResponse>, ApiError> {
    let Json(request) =
        payload.map_err(|err| ApiError::BadRequest(format!("Failed to save job: {}", err.body_text())))?;
    let outcome = state.workflow.save(&principal, request).await?;
    Ok(Json(outcome.into()))
}

pub async fn list_saved(
    State(state): State<SharedState>,
    UserOrAdmin(principal): UserOrAdmin,
) -> Result<Json<Vec<Job>>, ApiError> {
    Ok(Json(state.workflow.list_saved(&principal).await?))
}

pub async fn list_applied(
    State(state): State<SharedState>,
    UserOrAdmin(principal): UserOrAdmin,
) -> Result<Json<Vec<Job>>, ApiError> {
    Ok(Json(state.workflow.list_applied(&principal).await?))
}

pub async fn mark_applied(
    State(state): State<SharedState>,
    UserOrAdmin(principal): UserOrAdmin,
    Path(id): Path<i64>,
) -> Result<Json<AppliedResponse>, ApiError> {
    let outcome = state.workflow.mark_applied(&principal, id).await?;
    Ok(Json(outcome.into()))
}

pub async fn delete_saved(
    State(state): State<SharedState>,
    UserOrAdmin(principal): UserOrAdmin,
    Path(id): Path<i64>,
) -> Result<Json<MessageResponse>, ApiError> {
    state.workflow.delete_saved(&principal, id).await?;
    Ok(Json(MessageResponse::new(JOB_REMOVED)))
}
