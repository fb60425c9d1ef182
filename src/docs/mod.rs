use utoipa::OpenApi;
use crate::models::*;

/// Health check endpoint
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse)
    )
)]
#[allow(dead_code)]
pub async fn health_check_doc() {}

/// Create a new editing session
#[utoipa::path(
    post,
    path = "/api/sessions",
    request_body = CreateSessionRequest,
    responses(
        (status = 200, description = "Session created", body = CreateSessionResponse)
    )
)]
#[allow(dead_code)]
pub async fn create_session_doc() {}

/// Get a session
#[utoipa::path(
    get,
    path = "/api/sessions/{id}",
    params(("id" = String, Path, description = "Session id")),
    responses(
        (status = 200, description = "Current session state", body = Session),
        (status = 404, description = "Unknown or expired session", body = ErrorResponse)
    )
)]
#[allow(dead_code)]
pub async fn get_session_doc() {}

/// Join a session
#[utoipa::path(
    post,
    path = "/api/sessions/{id}/join",
    params(("id" = String, Path, description = "Session id")),
    request_body = JoinSessionRequest,
    responses(
        (status = 200, description = "Participant added", body = Session),
        (status = 400, description = "Missing user id", body = ErrorResponse),
        (status = 404, description = "Unknown or expired session", body = ErrorResponse)
    )
)]
#[allow(dead_code)]
pub async fn join_session_doc() {}

/// Hub and host diagnostics
#[utoipa::path(
    get,
    path = "/api/v1/diagnostics",
    responses(
        (status = 200, description = "Diagnostics snapshot", body = DiagnosticsResponse)
    )
)]
#[allow(dead_code)]
pub async fn diagnostics_doc() {}

/// Live connections of one session
#[utoipa::path(
    get,
    path = "/api/v1/diagnostics/sessions/{id}",
    params(("id" = String, Path, description = "Session id")),
    responses(
        (status = 200, description = "Connections registered for the session", body = SessionDiagnosticsResponse)
    )
)]
#[allow(dead_code)]
pub async fn session_diagnostics_doc() {}

#[derive(OpenApi)]
#[openapi(
    paths(
        health_check_doc,
        create_session_doc,
        get_session_doc,
        join_session_doc,
        diagnostics_doc,
        session_diagnostics_doc,
    ),
    components(
        schemas(HealthResponse, ErrorResponse, Session, Participant, CreateSessionRequest, CreateSessionResponse, JoinSessionRequest, DiagnosticsResponse, SessionDiagnosticsResponse)
    ),
    tags(
        (name = "api", description = "Session and diagnostics endpoints")
    )
)]
pub struct ApiDoc;
