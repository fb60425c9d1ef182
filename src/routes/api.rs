use crate::{handlers::{create_session, diagnostics, get_session, join_session, session_diagnostics}, AppState};
use axum::{routing::{get, post}, Router};
use std::sync::Arc;

/// Create API routes
pub fn create_api_routes(app_state: Arc<AppState>) -> Router {
    Router::<Arc<AppState>>::new()
        .route("/sessions", post(create_session))
        .route("/sessions/:id", get(get_session))
        .route("/sessions/:id/join", post(join_session))
        .route("/v1/diagnostics", get(diagnostics))
        .route("/v1/diagnostics/sessions/:id", get(session_diagnostics))
        .with_state(app_state)
}
