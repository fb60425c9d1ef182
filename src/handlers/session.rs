use crate::{
    config,
    db::StoreError,
    models::{CreateSessionRequest, CreateSessionResponse, ErrorResponse, JoinSessionRequest, Participant, Session},
    AppState,
};
use axum::{extract::{Path, State}, http::StatusCode, Json};
use std::sync::Arc;
use tracing::{error, info};
use uuid::Uuid;

type ApiError = (StatusCode, Json<ErrorResponse>);

fn store_error(e: StoreError) -> ApiError {
    match e {
        StoreError::NotFound(id) => ErrorResponse::reply(StatusCode::NOT_FOUND, format!("session '{}' not found", id)),
    }
}

/// Create a new editing session
pub async fn create_session(
    State(app_state): State<Arc<AppState>>,
    Json(payload): Json<CreateSessionRequest>,
) -> Result<(StatusCode, Json<CreateSessionResponse>), ApiError> {

    let language = payload
        .language
        .filter(|l| !l.trim().is_empty())
        .unwrap_or_else(|| config::get_config().default_language.clone());

    let session = Session::new(Uuid::new_v4().to_string(), payload.code.unwrap_or_default(), language);

    if let Err(e) = app_state.store.create(session.clone()).await {
        error!(session_id = %session.id, "Failed to create session: {}", e);
        return Err(store_error(e));
    }

    info!(session_id = %session.id, language = %session.language, "Session created");
    Ok((StatusCode::OK, Json(CreateSessionResponse { session })))
}

/// Get a session by id
pub async fn get_session(
    State(app_state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<(StatusCode, Json<Session>), ApiError> {

    match app_state.store.get(&session_id).await {
        Ok(session) => Ok((StatusCode::OK, Json(session))),
        Err(e) => Err(store_error(e)),
    }
}

/// Add a participant to a session.
/// Responds with the session as it was before the participant was added.
pub async fn join_session(
    State(app_state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
    Json(payload): Json<JoinSessionRequest>,
) -> Result<(StatusCode, Json<Session>), ApiError> {

    if payload.user_id.trim().is_empty() {
        return Err(ErrorResponse::reply(StatusCode::BAD_REQUEST, "user_id is required"));
    }

    let session = app_state.store.get(&session_id).await.map_err(store_error)?;

    let participant = Participant {
        id: payload.user_id,
        name: payload.user_name,
        email: payload.email,
        color: payload.color,
        image_url: payload.image_url,
    };
    app_state
        .store
        .add_participant(&session_id, participant)
        .await
        .map_err(store_error)?;

    Ok((StatusCode::OK, Json(session)))
}
