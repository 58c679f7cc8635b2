//! Read-only REST endpoints for profiles and flow status.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};

use super::engine::ConversationEngine;

/// Shared state for the REST routes.
#[derive(Clone)]
pub struct ApiState {
    pub engine: Arc<ConversationEngine>,
}

/// GET /health
async fn health() -> impl IntoResponse {
    Json(serde_json::json!({"status": "ok"}))
}

/// GET /api/users/{user_id}/profile
///
/// Returns the stored profile, or 404 if the user has none.
async fn get_profile(
    State(state): State<ApiState>,
    Path(user_id): Path<String>,
) -> impl IntoResponse {
    match state.engine.profile(&user_id).await {
        Ok(Some(profile)) => Json(serde_json::to_value(profile).unwrap_or_default()).into_response(),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({"error": "No profile exists for this user"})),
        )
            .into_response(),
        Err(e) => {
            tracing::error!(user_id = %user_id, error = %e, "Profile lookup failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({"error": "Profile lookup failed"})),
            )
                .into_response()
        }
    }
}

/// GET /api/users/{user_id}/flow
///
/// Returns where the user is in a dialogue, or `{"state": "idle"}`.
async fn get_flow(
    State(state): State<ApiState>,
    Path(user_id): Path<String>,
) -> impl IntoResponse {
    Json(state.engine.flow_status(&user_id).await)
}

/// Build the REST routes.
pub fn api_routes(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/users/{user_id}/profile", get(get_profile))
        .route("/api/users/{user_id}/flow", get(get_flow))
        .with_state(state)
}
