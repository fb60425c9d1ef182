use std::sync::Arc;
use axum::{
    extract::{Query, State, ws::{Message, WebSocket, WebSocketUpgrade}},
    response::Response,
};
use futures_util::StreamExt;
use serde::Deserialize;
use tokio::time::timeout;
use tracing::{info, warn, error};

use crate::AppState;
use crate::models::Participant;
use crate::ws::{Connection, reader::read_pump, writer::{write_pump, WRITE_WAIT}};

/// Query parameters identifying who connects to which session.
#[derive(Deserialize, Debug, Default)]
pub struct ConnectParams {
    #[serde(alias = "session_id")]
    pub session: Option<String>,
    pub user_id: Option<String>,
    pub user_name: Option<String>,
    pub user_email: Option<String>,
    pub user_color: Option<String>,
    pub user_image: Option<String>,
}

impl ConnectParams {
    /// Session id and participant, or `None` if either id is missing.
    pub fn into_identity(self) -> Option<(String, Participant)> {
        let session_id = self.session.filter(|s| !s.is_empty())?;
        let user_id = self.user_id.filter(|u| !u.is_empty())?;
        let participant = Participant {
            id: user_id,
            name: self.user_name.unwrap_or_default(),
            email: self.user_email.unwrap_or_default(),
            color: self.user_color.unwrap_or_default(),
            image_url: self.user_image.unwrap_or_default(),
        };
        Some((session_id, participant))
    }
}

/// WebSocket handler
pub async fn websocket_handler(
    Query(params): Query<ConnectParams>,
    ws: WebSocketUpgrade,
    State(app_state): State<Arc<AppState>>,
) -> Response {
    info!("New WebSocket connection attempt");
    ws.on_upgrade(move |socket| handle_socket(socket, params, app_state))
}

/// Handle WebSocket connection
async fn handle_socket(mut socket: WebSocket, params: ConnectParams, app_state: Arc<AppState>) {

    let Some((session_id, participant)) = params.into_identity() else {
        warn!("Refusing WebSocket connection without session or user id");
        let _ = socket.send(Message::Close(None)).await;
        return;
    };

    let (conn, outbound) = Connection::new(session_id, participant);
    info!(session_id = %conn.session_id, user_id = %conn.participant.id, conn_id = conn.id, "WebSocket connection established");

    if let Err(e) = app_state.store.add_participant(&conn.session_id, conn.participant.clone()).await {
        warn!(session_id = %conn.session_id, user_id = %conn.participant.id, "Failed to add participant to session: {}", e);
    }

    if let Err(e) = app_state.hub.register(conn.clone()).await {
        error!(conn_id = conn.id, "Failed to register connection: {}", e);
        let _ = socket.send(Message::Close(None)).await;
        return;
    }

    // The writer owns the sink half, the reader runs here on the stream half.
    let (sender, receiver) = socket.split();
    let mut writer = tokio::spawn(write_pump(sender, outbound, conn.id));

    read_pump(receiver, conn.clone(), &app_state.hub, app_state.store.as_ref()).await;

    // The hub closes the outbound queue on unregister, which ends the writer.
    if timeout(WRITE_WAIT, &mut writer).await.is_err() {
        warn!(conn_id = conn.id, "Writer did not stop in time, aborting");
        writer.abort();
    }
    info!(session_id = %conn.session_id, user_id = %conn.participant.id, "WebSocket connection terminated");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_requires_session_and_user() {
        assert!(ConnectParams::default().into_identity().is_none());

        let no_user = ConnectParams { session: Some("S1".into()), ..Default::default() };
        assert!(no_user.into_identity().is_none());

        let empty_session = ConnectParams {
            session: Some(String::new()),
            user_id: Some("u1".into()),
            ..Default::default()
        };
        assert!(empty_session.into_identity().is_none());

        let full = ConnectParams {
            session: Some("S1".into()),
            user_id: Some("u1".into()),
            user_name: Some("Alice".into()),
            user_image: Some("https://img/a".into()),
            ..Default::default()
        };
        let (session_id, participant) = full.into_identity().unwrap();
        assert_eq!(session_id, "S1");
        assert_eq!(participant.id, "u1");
        assert_eq!(participant.name, "Alice");
        assert_eq!(participant.image_url, "https://img/a");
        assert_eq!(participant.email, "");
    }
}
