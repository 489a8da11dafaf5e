//! Workflow management handlers

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection},
        Path, State,
    },
    http::StatusCode,
    Extension, Json,
};
use serde::Serialize;

use crate::api::error::{json_body, path_param, ApiResult};
use crate::api::state::AppState;
use crate::auth::Caller;
use crate::types::*;

#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub success: bool,
    pub message: String,
}

pub async fn list_workflows(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
) -> ApiResult<Json<Vec<Workflow>>> {
    Ok(Json(state.app.workflows.list(&caller).await?))
}

pub async fn create_workflow(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    body: Result<Json<NewWorkflow>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Workflow>)> {
    let workflow = state.app.workflows.create(&caller, json_body(body)?).await?;
    Ok((StatusCode::CREATED, Json(workflow)))
}

pub async fn get_workflow(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    path: Result<Path<WorkflowId>, PathRejection>,
) -> ApiResult<Json<WorkflowDetail>> {
    let id = path_param(path)?;
    Ok(Json(state.app.workflows.get(&caller, id).await?))
}

pub async fn update_workflow(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    path: Result<Path<WorkflowId>, PathRejection>,
    body: Result<Json<WorkflowChanges>, JsonRejection>,
) -> ApiResult<Json<Workflow>> {
    let id = path_param(path)?;
    let workflow = state
        .app
        .workflows
        .update(&caller, id, json_body(body)?)
        .await?;
    Ok(Json(workflow))
}

/// Delete a workflow with all of its versions, executions and logs
pub async fn delete_workflow(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    path: Result<Path<WorkflowId>, PathRejection>,
) -> ApiResult<Json<DeleteResponse>> {
    let id = path_param(path)?;
    state.app.workflows.delete(&caller, id).await?;
    Ok(Json(DeleteResponse {
        success: true,
        message: format!("workflow {} deleted", id),
    }))
}
