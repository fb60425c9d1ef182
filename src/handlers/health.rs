use axum::{extract::State, http::StatusCode, Json};
use std::sync::Arc;
use crate::{models::HealthResponse, AppState};
use tracing::{debug, error};

/// Health check endpoint
pub async fn health_check() -> Json<HealthResponse> {
    debug!("Health check requested");
    Json(HealthResponse {
        status: "ok".to_string(),
        message: "Server is running".to_string(),
    })
}

/// Readiness check endpoint. Not ready once the hub loop has stopped.
pub async fn ready_check(State(app_state): State<Arc<AppState>>) -> (StatusCode, Json<HealthResponse>) {
    debug!("Readiness check requested");
    if !app_state.hub.is_running() {
        error!("Readiness check failed: hub is not running");
        return (StatusCode::SERVICE_UNAVAILABLE, Json(HealthResponse {
            status: "unavailable".to_string(),
            message: "Connection hub is not running".to_string(),
        }));
    }
    (StatusCode::OK, Json(HealthResponse {
        status: "ok".to_string(),
        message: "Service is ready".to_string(),
    }))
}
