use axum::extract::ws::Message;
use futures_util::{Stream, StreamExt};
use std::fmt::Display;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::db::SessionStore;
use crate::models::{Event, WsMessage};
use super::connection::Connection;
use super::hub::{HubError, HubHandle};

/// Idle window: a connection that sends nothing (not even a pong) for this
/// long is torn down.
pub const READ_TIMEOUT: Duration = Duration::from_secs(60);

/// Inbound loop for one connection.
///
/// Ends on the first read failure, idle timeout, close frame, or once the hub
/// has closed the connection's outbound queue. Always unregisters the
/// connection before returning; the stream half is dropped with it.
pub async fn read_pump<S, E>(stream: S, conn: Connection, hub: &HubHandle, store: &dyn SessionStore)
where
    S: Stream<Item = Result<Message, E>> + Unpin,
    E: Display,
{
    read_loop(stream, &conn, hub, store, READ_TIMEOUT).await;

    if conn.outbound.is_closed() {
        info!(session_id = %conn.session_id, user_id = %conn.participant.id, "Connection was dropped by the hub");
    }

    if let Err(e) = hub.unregister(conn.clone()).await {
        error!(conn_id = conn.id, "Failed to unregister connection: {}", e);
        conn.outbound.close();
    }
}

async fn read_loop<S, E>(mut stream: S, conn: &Connection, hub: &HubHandle, store: &dyn SessionStore, idle: Duration)
where
    S: Stream<Item = Result<Message, E>> + Unpin,
    E: Display,
{
    loop {
        let next = tokio::select! {
            _ = conn.outbound.closed() => {
                debug!(conn_id = conn.id, "Outbound queue closed, stopping reader");
                return;
            }
            next = timeout(idle, stream.next()) => next,
        };

        let message = match next {
            Ok(Some(Ok(message))) => message,
            Ok(Some(Err(e))) => {
                warn!(conn_id = conn.id, "WebSocket read error: {}", e);
                return;
            }
            Ok(None) => {
                debug!(conn_id = conn.id, "WebSocket stream ended");
                return;
            }
            Err(_) => {
                info!(session_id = %conn.session_id, user_id = %conn.participant.id, "Connection idle for {:?}, closing", idle);
                return;
            }
        };

        match message {
            Message::Text(text) => {
                if let Err(e) = handle_text(&text, conn, hub, store).await {
                    error!(conn_id = conn.id, "Stopping reader: {}", e);
                    return;
                }
            }
            Message::Close(_) => {
                debug!(conn_id = conn.id, "Close frame received");
                return;
            }
            // Transport pings are answered by the socket itself; any frame
            // already counts as liveness.
            Message::Ping(_) | Message::Pong(_) => {}
            Message::Binary(_) => debug!(conn_id = conn.id, "Ignoring binary frame"),
        }
    }
}

/// Dispatch one decoded frame. Only a stopped hub is reported as an error;
/// malformed frames and store failures are logged and skipped.
async fn handle_text(text: &str, conn: &Connection, hub: &HubHandle, store: &dyn SessionStore) -> Result<(), HubError> {
    let mut msg = match WsMessage::decode(text) {
        Ok(msg) => msg,
        Err(e) => {
            warn!(session_id = %conn.session_id, user_id = %conn.participant.id, "Discarding frame: {}", e);
            return Ok(());
        }
    };
    debug!(session_id = %conn.session_id, user_id = %conn.participant.id, "Received {:?}", msg.event_type());

    // Route by the connection's own identity, not by what the client claims.
    msg.session_id = conn.session_id.clone();
    msg.user_id = conn.participant.id.clone();

    match &msg.event {
        Event::CursorMove(_) => {}
        Event::CodeChange(change) => {
            if let Err(e) = store.update_code(&conn.session_id, &change.code).await {
                error!(session_id = %conn.session_id, "Failed to store code: {}", e);
            }
        }
        Event::LanguageChange(change) => {
            if let Err(e) = store.update_language(&conn.session_id, &change.language).await {
                error!(session_id = %conn.session_id, "Failed to store language: {}", e);
            }
        }
        Event::Ping => {
            reply_pong(conn);
            return Ok(());
        }
        Event::Pong | Event::UserJoin(_) | Event::UserLeave => {
            debug!(conn_id = conn.id, "Ignoring {:?} sent by client", msg.event_type());
            return Ok(());
        }
    }

    match hub.broadcast(&conn.session_id, &msg, Some(conn.id)).await {
        Err(HubError::Encode(e)) => {
            error!(session_id = %conn.session_id, "Failed to encode relay: {}", e);
            Ok(())
        }
        other => other,
    }
}

/// Answer an application-level ping on this connection only.
fn reply_pong(conn: &Connection) {
    match WsMessage::pong(&conn.session_id).encode() {
        Ok(frame) => {
            if let Err(e) = conn.outbound.try_enqueue(frame.into()) {
                warn!(conn_id = conn.id, "Could not queue pong: {}", e);
            }
        }
        Err(e) => error!(conn_id = conn.id, "Failed to encode pong: {}", e),
    }
}
