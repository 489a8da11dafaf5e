//! Execution ledger handlers

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection},
        Path, State,
    },
    http::StatusCode,
    Extension, Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::api::error::{json_body, path_param, ApiResult};
use crate::api::state::AppState;
use crate::auth::Caller;
use crate::types::*;

#[derive(Debug, Default, Deserialize)]
pub struct ExecuteRequest {
    #[serde(default)]
    pub input_params: Option<JsonValue>,
}

#[derive(Debug, Serialize)]
pub struct ExecuteResponse {
    pub execution_id: ExecutionId,
    pub status: ExecutionStatus,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct ExecutionList {
    pub executions: Vec<WorkflowExecution>,
}

#[derive(Debug, Serialize)]
pub struct LogList {
    pub logs: Vec<ExecutionLog>,
}

#[derive(Debug, Deserialize)]
pub struct AppendLogRequest {
    pub message: String,
    #[serde(default)]
    pub level: LogLevel,
    #[serde(default)]
    pub node_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct FinishRequest {
    pub status: ExecutionStatus,
    #[serde(default)]
    pub result: Option<JsonValue>,
}

/// Launch an execution; the body is optional
pub async fn execute_version(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    path: Result<Path<(WorkflowId, i32)>, PathRejection>,
    body: Result<Json<ExecuteRequest>, JsonRejection>,
) -> ApiResult<Json<ExecuteResponse>> {
    let (id, version) = path_param(path)?;
    let request = match body {
        Ok(Json(request)) => request,
        Err(JsonRejection::MissingJsonContentType(_)) => ExecuteRequest::default(),
        Err(rejection) => return Err(rejection.into()),
    };

    let execution = state
        .app
        .executions
        .start_execution(&caller, id, version, request.input_params)
        .await?;

    Ok(Json(ExecuteResponse {
        execution_id: execution.id,
        status: execution.status,
        started_at: execution.started_at,
    }))
}

pub async fn list_executions(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    path: Result<Path<(WorkflowId, i32)>, PathRejection>,
) -> ApiResult<Json<ExecutionList>> {
    let (id, version) = path_param(path)?;
    let executions = state
        .app
        .executions
        .list_for_version(&caller, id, version)
        .await?;
    Ok(Json(ExecutionList { executions }))
}

pub async fn get_execution(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    path: Result<Path<ExecutionId>, PathRejection>,
) -> ApiResult<Json<ExecutionDetail>> {
    let id = path_param(path)?;
    Ok(Json(state.app.executions.detail(&caller, id).await?))
}

pub async fn get_logs(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    path: Result<Path<ExecutionId>, PathRejection>,
) -> ApiResult<Json<LogList>> {
    let id = path_param(path)?;
    let logs = state.app.executions.get_logs(&caller, id).await?;
    Ok(Json(LogList { logs }))
}

pub async fn append_log(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    path: Result<Path<ExecutionId>, PathRejection>,
    body: Result<Json<AppendLogRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<ExecutionLog>)> {
    let id = path_param(path)?;
    let request = json_body(body)?;
    let entry = state
        .app
        .executions
        .append_log(&caller, id, request.node_id, request.message, request.level)
        .await?;
    Ok((StatusCode::CREATED, Json(entry)))
}

pub async fn finish_execution(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    path: Result<Path<ExecutionId>, PathRejection>,
    body: Result<Json<FinishRequest>, JsonRejection>,
) -> ApiResult<Json<WorkflowExecution>> {
    let id = path_param(path)?;
    let request = json_body(body)?;
    let execution = state
        .app
        .executions
        .finish(&caller, id, request.status, request.result)
        .await?;
    Ok(Json(execution))
}
