use axum::extract::{Request, State};
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::Response;
use std::time::Duration;
use tracing::warn;

use super::error::ApiError;
use super::state::AppState;
use crate::error::Error;

/// Resolve the bearer credential into a `Caller` request extension
pub async fn require_caller(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let credential = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .ok_or_else(|| Error::Authentication("missing bearer credential".to_string()))?;

    let caller = state.authenticator.authenticate(credential).await?;
    request.extensions_mut().insert(caller);

    Ok(next.run(request).await)
}

/// Abort the downstream handler once `limit` has elapsed
pub async fn enforce_deadline(
    State(limit): State<Duration>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let path = request.uri().path().to_string();

    match tokio::time::timeout(limit, next.run(request)).await {
        Ok(response) => Ok(response),
        Err(_) => {
            warn!(%path, limit_ms = limit.as_millis() as u64, "request deadline exceeded");
            Err(ApiError(Error::Timeout(format!(
                "request did not complete within {}s",
                limit.as_secs()
            ))))
        }
    }
}
