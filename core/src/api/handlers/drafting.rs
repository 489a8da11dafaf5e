//! Drafting pipeline handlers

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    Extension, Json,
};
use serde::Deserialize;

use crate::api::error::{json_body, ApiResult};
use crate::api::state::AppState;
use crate::auth::Caller;
use crate::drafting::{Analysis, AnalyzeRequest, Confirmation, ConfirmedAnalysis, GeneratedDraft};
use crate::types::WorkflowId;

#[derive(Debug, Deserialize)]
pub struct ConfirmRequest {
    pub analysis_id: String,
    pub confirmations: Vec<Confirmation>,
}

#[derive(Debug, Deserialize)]
pub struct GenerateRequest {
    pub analysis_id: String,
    pub workflow_id: WorkflowId,
}

pub async fn analyze(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    body: Result<Json<AnalyzeRequest>, JsonRejection>,
) -> ApiResult<Json<Analysis>> {
    let analysis = state.app.drafting.analyze(&caller, json_body(body)?).await?;
    Ok(Json(analysis))
}

pub async fn confirm(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    body: Result<Json<ConfirmRequest>, JsonRejection>,
) -> ApiResult<Json<ConfirmedAnalysis>> {
    let request = json_body(body)?;
    let confirmed = state
        .app
        .drafting
        .confirm(&caller, &request.analysis_id, request.confirmations)
        .await?;
    Ok(Json(confirmed))
}

pub async fn generate(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    body: Result<Json<GenerateRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<GeneratedDraft>)> {
    let request = json_body(body)?;
    let draft = state
        .app
        .drafting
        .generate(&caller, &request.analysis_id, request.workflow_id)
        .await?;
    Ok((StatusCode::CREATED, Json(draft)))
}
