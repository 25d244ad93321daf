use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use chrono::Utc;
use serde_json::json;

use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/health/live", get(liveness))
        .route("/health/ready", get(readiness))
}

/// Basic up/down status.
async fn health() -> impl IntoResponse {
    Json(json!({
        "status": "up",
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

/// Liveness: the process is running and serving requests.
async fn liveness() -> impl IntoResponse {
    Json(json!({ "status": "up" }))
}

/// Readiness: the database answers a ping.
async fn readiness(State(state): State<AppState>) -> impl IntoResponse {
    match state.db.ping().await {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({
                "status": "up",
                "checks": { "database": "up" },
                "timestamp": Utc::now().to_rfc3339(),
            })),
        ),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "status": "down",
                "checks": { "database": "down" },
                "error": e.to_string(),
                "timestamp": Utc::now().to_rfc3339(),
            })),
        ),
    }
}
