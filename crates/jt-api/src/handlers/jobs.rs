use axum::{
    extract::{Path, State},
    Json,
};
use jt_common::Job;

use crate::error::ApiError;
use crate::SharedState;

pub async fn list_jobs(State(state): State<SharedState>) -> Result<Json<Vec<Job>>, ApiError> {
    Ok(Json(state.workflow.list_catalog().await?))
}

pub async fn get_job(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> Result<Json<Job>, ApiError> {
    state
        .workflow
        .get(id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("job {id} not found")))
}

pub async fn list_by_source(
    State(state): State<SharedState>,
    Path(source): Path<String>,
) -> Result<Json<Vec<Job>>, ApiError> {
    Ok(Json(state.workflow.list_by_source(&source).await?))
}
