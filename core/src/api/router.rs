//! API Router configuration

use axum::{
    middleware::from_fn_with_state,
    routing::{get, post, put},
    Router,
};
use std::time::Duration;
use tower_http::trace::TraceLayer;

use super::handlers;
use super::middleware::{enforce_deadline, require_caller};
use super::state::AppState;
use crate::config::Config;
use crate::drafting::retry::RetryPolicy;

/// Deadline for `/ai/*`: every completion attempt and backoff, plus the normal request budget
pub fn drafting_deadline(config: &Config) -> Duration {
    let per_attempt = Duration::from_secs(config.drafting.timeout_secs);
    RetryPolicy::from_config(&config.drafting.retry).worst_case(per_attempt)
        + Duration::from_secs(config.server.request_timeout_secs)
}

/// Create the main API router
pub fn create_router(state: AppState) -> Router {
    let config = state.app.config();
    let request_deadline = Duration::from_secs(config.server.request_timeout_secs);
    let ai_deadline = drafting_deadline(config);

    let ledger = Router::new()
        // Workflows
        .route(
            "/workflows",
            get(handlers::list_workflows).post(handlers::create_workflow),
        )
        .route(
            "/workflows/:id",
            get(handlers::get_workflow)
                .put(handlers::update_workflow)
                .delete(handlers::delete_workflow),
        )
        // Versions
        .route(
            "/workflows/:id/versions",
            get(handlers::list_versions).post(handlers::create_version),
        )
        .route("/workflows/:id/versions/:version", get(handlers::get_version))
        .route(
            "/workflows/:id/versions/:version/nodes",
            get(handlers::version_nodes),
        )
        .route(
            "/workflows/:id/versions/:version/publish",
            put(handlers::publish_version),
        )
        .route(
            "/workflows/:id/versions/:version/archive",
            put(handlers::archive_version),
        )
        // Executions
        .route(
            "/workflows/:id/versions/:version/execute",
            post(handlers::execute_version),
        )
        .route(
            "/workflows/:id/versions/:version/executions",
            get(handlers::list_executions),
        )
        .route("/executions/:id", get(handlers::get_execution))
        .route(
            "/executions/:id/logs",
            get(handlers::get_logs).post(handlers::append_log),
        )
        .route("/executions/:id/finish", put(handlers::finish_execution))
        .route_layer(from_fn_with_state(request_deadline, enforce_deadline));

    let drafting = Router::new()
        .route("/ai/analyze", post(handlers::analyze))
        .route("/ai/confirm", post(handlers::confirm))
        .route("/ai/generate", post(handlers::generate))
        .route_layer(from_fn_with_state(ai_deadline, enforce_deadline));

    let protected = ledger
        .merge(drafting)
        .route_layer(from_fn_with_state(state.clone(), require_caller));

    let api_routes = Router::new()
        .route("/health", get(handlers::health_check))
        .route_layer(from_fn_with_state(request_deadline, enforce_deadline))
        .merge(protected);

    Router::new()
        .nest("/api/v1", api_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
