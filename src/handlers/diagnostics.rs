use crate::{models::{DiagnosticsResponse, ErrorResponse, SessionDiagnosticsResponse}, AppState};
use axum::{extract::{Path, State}, http::StatusCode, Json};
use std::sync::Arc;
use std::sync::{Mutex, OnceLock};
use sysinfo::System;
use tracing::{error, info};

static SYSTEM_MONITOR: OnceLock<Mutex<System>> = OnceLock::new();

/// Report hub, store and host statistics
pub async fn diagnostics(
    State(app_state): State<Arc<AppState>>,
) -> (StatusCode, Json<DiagnosticsResponse>) {

    let hub_stats = app_state.hub.stats();
    let n_stored_sessions = app_state.store.entry_count() as u32;

    // System stats
    let (cpu_usage, memory_alloc, memory_free, memory_total) = {
        let sys_lock = SYSTEM_MONITOR.get_or_init(|| {
            Mutex::new(System::new_all())
        });
        match sys_lock.lock() {
            Ok(mut sys) => {
                sys.refresh_cpu();
                sys.refresh_memory();
                (
                    sys.global_cpu_info().cpu_usage(),
                    sys.used_memory(),
                    sys.free_memory(),
                    sys.total_memory(),
                )
            }
            Err(_) => (0.0, 0, 0, 0)
        }
    };

    info!(
        "Diagnostics: CPU: {:.2}%, Mem: {}/{} MB (Free: {} MB), Conn: {}, Sessions: {}",
        cpu_usage,
        memory_alloc / 1024 / 1024,
        memory_total / 1024 / 1024,
        memory_free / 1024 / 1024,
        hub_stats.connections,
        hub_stats.sessions
    );

    (
        StatusCode::OK,
        Json(DiagnosticsResponse {
            n_conn: hub_stats.connections as u32,
            n_sessions: hub_stats.sessions as u32,
            n_stored_sessions,
            cpu_usage,
            memory_alloc,
            memory_total,
            memory_free,
        }),
    )
}

/// Report the connections the hub currently holds for one session
pub async fn session_diagnostics(
    State(app_state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<(StatusCode, Json<SessionDiagnosticsResponse>), (StatusCode, Json<ErrorResponse>)> {

    let conn_ids = match app_state.hub.session_members(&session_id).await {
        Ok(ids) => ids,
        Err(e) => {
            error!("Failed to query hub for session '{}': {}", session_id, e);
            return Err(ErrorResponse::reply(StatusCode::SERVICE_UNAVAILABLE, e.to_string()));
        }
    };

    Ok((
        StatusCode::OK,
        Json(SessionDiagnosticsResponse {
            session_id,
            n_conn: conn_ids.len() as u32,
            conn_ids,
        }),
    ))
}
