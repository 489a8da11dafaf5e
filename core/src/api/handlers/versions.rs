//! Version and lifecycle handlers

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection},
        Path, State,
    },
    http::StatusCode,
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::api::error::{json_body, path_param, ApiResult};
use crate::api::state::AppState;
use crate::auth::Caller;
use crate::types::*;

#[derive(Debug, Deserialize)]
pub struct CreateVersionRequest {
    pub definition: JsonValue,
}

#[derive(Debug, Serialize)]
pub struct VersionList {
    pub versions: Vec<VersionSummary>,
}

#[derive(Debug, Serialize)]
pub struct NodeList {
    pub nodes: Vec<WorkflowNode>,
}

pub async fn list_versions(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    path: Result<Path<WorkflowId>, PathRejection>,
) -> ApiResult<Json<VersionList>> {
    let id = path_param(path)?;
    let versions = state.app.versions.list(&caller, id).await?;
    Ok(Json(VersionList { versions }))
}

pub async fn create_version(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    path: Result<Path<WorkflowId>, PathRejection>,
    body: Result<Json<CreateVersionRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<WorkflowVersion>)> {
    let id = path_param(path)?;
    let request = json_body(body)?;
    let version = state
        .app
        .versions
        .create_version_from_value(&caller, id, request.definition)
        .await?;
    Ok((StatusCode::CREATED, Json(version)))
}

pub async fn get_version(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    path: Result<Path<(WorkflowId, i32)>, PathRejection>,
) -> ApiResult<Json<WorkflowVersion>> {
    let (id, version) = path_param(path)?;
    Ok(Json(state.app.versions.get(&caller, id, version).await?))
}

pub async fn version_nodes(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    path: Result<Path<(WorkflowId, i32)>, PathRejection>,
) -> ApiResult<Json<NodeList>> {
    let (id, version) = path_param(path)?;
    let nodes = state.app.versions.nodes(&caller, id, version).await?;
    Ok(Json(NodeList { nodes }))
}

pub async fn publish_version(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    path: Result<Path<(WorkflowId, i32)>, PathRejection>,
) -> ApiResult<Json<WorkflowVersion>> {
    let (id, version) = path_param(path)?;
    Ok(Json(state.app.lifecycle.publish(&caller, id, version).await?))
}

pub async fn archive_version(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    path: Result<Path<(WorkflowId, i32)>, PathRejection>,
) -> ApiResult<Json<WorkflowVersion>> {
    let (id, version) = path_param(path)?;
    Ok(Json(state.app.lifecycle.archive(&caller, id, version).await?))
}
