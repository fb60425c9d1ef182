use axum::extract::ws::Message;
use futures_util::{Sink, SinkExt};
use std::fmt::Display;
use std::time::Duration;
use tokio::time::{interval_at, timeout, Instant};
use tracing::{debug, warn};

use super::connection::{ConnId, OutboundReceiver};

/// Deadline for a single flush to the socket.
pub const WRITE_WAIT: Duration = Duration::from_secs(10);

/// Keepalive period. Shorter than the reader's idle window so a probe always
/// lands before the peer would be timed out.
pub const PING_PERIOD: Duration = Duration::from_secs(54);

/// Outbound loop for one connection.
///
/// Batches whatever is already queued into one newline-delimited text frame,
/// sends a transport ping every [`PING_PERIOD`], and finishes with a close
/// frame once the queue is closed. Returns on the first write failure without
/// touching the hub; the reader owns teardown.
pub async fn write_pump<W>(sink: W, outbound: OutboundReceiver, conn_id: ConnId)
where
    W: Sink<Message> + Unpin,
    W::Error: Display,
{
    write_loop(sink, outbound, conn_id, PING_PERIOD, WRITE_WAIT).await
}

async fn write_loop<W>(
    mut sink: W,
    mut outbound: OutboundReceiver,
    conn_id: ConnId,
    ping_period: Duration,
    write_wait: Duration,
) where
    W: Sink<Message> + Unpin,
    W::Error: Display,
{
    let mut keepalive = interval_at(Instant::now() + ping_period, ping_period);

    loop {
        tokio::select! {
            frame = outbound.recv() => {
                let Some(first) = frame else {
                    debug!(conn_id = conn_id, "Outbound queue closed, sending close frame");
                    let _ = timeout(write_wait, sink.send(Message::Close(None))).await;
                    return;
                };

                let mut batch = String::from(&*first);
                for _ in 0..outbound.len() {
                    let Some(next) = outbound.try_recv() else { break };
                    batch.push('\n');
                    batch.push_str(&next);
                }

                if !flush(&mut sink, Message::Text(batch), conn_id, write_wait).await {
                    return;
                }
            }
            _ = keepalive.tick() => {
                if !flush(&mut sink, Message::Ping(Vec::new()), conn_id, write_wait).await {
                    return;
                }
            }
        }
    }
}

/// Send one frame within `write_wait`. Returns false if the writer should stop.
async fn flush<W>(sink: &mut W, message: Message, conn_id: ConnId, write_wait: Duration) -> bool
where
    W: Sink<Message> + Unpin,
    W::Error: Display,
{
    match timeout(write_wait, sink.send(message)).await {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            debug!(conn_id = conn_id, "WebSocket write failed: {}", e);
            false
        }
        Err(_) => {
            warn!(conn_id = conn_id, "WebSocket write exceeded {:?}", write_wait);
            false
        }
    }
}
