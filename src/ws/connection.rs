use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_util::sync::CancellationToken;

use crate::models::Participant;

/// Frames a connection may have pending before it is considered dead.
pub const OUTBOUND_CAPACITY: usize = 256;

pub type ConnId = u64;

static NEXT_CONN_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EnqueueError {
    #[error("outbound queue is full")]
    Full,
    #[error("outbound queue is closed")]
    Closed,
}

/// Producer side of a connection's outbound queue.
///
/// Cloned into the hub (broadcasts) and the reader (pong replies). Closing is
/// a separate signal so the hub can shut the queue while other producer
/// handles are still alive.
#[derive(Clone, Debug)]
pub struct OutboundQueue {
    tx: mpsc::Sender<Arc<str>>,
    closed: CancellationToken,
}

/// Consumer side, owned by the connection's writer.
#[derive(Debug)]
pub struct OutboundReceiver {
    rx: mpsc::Receiver<Arc<str>>,
    closed: CancellationToken,
}

pub fn outbound_queue(capacity: usize) -> (OutboundQueue, OutboundReceiver) {
    let (tx, rx) = mpsc::channel(capacity);
    let closed = CancellationToken::new();
    (
        OutboundQueue { tx, closed: closed.clone() },
        OutboundReceiver { rx, closed },
    )
}

impl OutboundQueue {
    /// Enqueue without waiting.
    pub fn try_enqueue(&self, frame: Arc<str>) -> Result<(), EnqueueError> {
        if self.closed.is_cancelled() {
            return Err(EnqueueError::Closed);
        }
        self.tx.try_send(frame).map_err(|e| match e {
            TrySendError::Full(_) => EnqueueError::Full,
            TrySendError::Closed(_) => EnqueueError::Closed,
        })
    }

    /// Idempotent.
    pub fn close(&self) {
        self.closed.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Resolves once the queue has been closed.
    pub async fn closed(&self) {
        self.closed.cancelled().await
    }
}

impl OutboundReceiver {
    /// Next frame. Frames queued before the close are still handed out;
    /// returns `None` once the queue is closed and drained.
    pub async fn recv(&mut self) -> Option<Arc<str>> {
        if let Ok(frame) = self.rx.try_recv() {
            return Some(frame);
        }
        if self.closed.is_cancelled() {
            return None;
        }
        tokio::select! {
            frame = self.rx.recv() => frame,
            _ = self.closed.cancelled() => self.rx.try_recv().ok(),
        }
    }

    /// A frame that is already queued, if any.
    pub fn try_recv(&mut self) -> Option<Arc<str>> {
        self.rx.try_recv().ok()
    }

    /// Number of frames currently queued.
    pub fn len(&self) -> usize {
        self.rx.len()
    }
}

/// One client socket bound to a session and participant.
#[derive(Clone, Debug)]
pub struct Connection {
    pub id: ConnId,
    pub session_id: String,
    pub participant: Participant,
    pub outbound: OutboundQueue,
}

impl Connection {
    pub fn new(session_id: String, participant: Participant) -> (Self, OutboundReceiver) {
        Self::with_capacity(session_id, participant, OUTBOUND_CAPACITY)
    }

    pub fn with_capacity(session_id: String, participant: Participant, capacity: usize) -> (Self, OutboundReceiver) {
        let (outbound, rx) = outbound_queue(capacity);
        let conn = Self {
            id: NEXT_CONN_ID.fetch_add(1, Ordering::Relaxed),
            session_id,
            participant,
            outbound,
        };
        (conn, rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn full_queue_rejects_without_blocking() {
        let (queue, mut rx) = outbound_queue(2);
        queue.try_enqueue("a".into()).unwrap();
        queue.try_enqueue("b".into()).unwrap();
        assert_eq!(queue.try_enqueue("c".into()), Err(EnqueueError::Full));
        assert_eq!(rx.len(), 2);
        assert_eq!(rx.recv().await.as_deref(), Some("a"));
    }

    #[tokio::test]
    async fn close_drains_pending_then_ends() {
        let (queue, mut rx) = outbound_queue(4);
        let other_producer = queue.clone();
        queue.try_enqueue("a".into()).unwrap();
        queue.close();
        queue.close();

        assert_eq!(other_producer.try_enqueue("b".into()), Err(EnqueueError::Closed));
        assert_eq!(rx.recv().await.as_deref(), Some("a"));
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn close_wakes_a_waiting_receiver() {
        let (queue, mut rx) = outbound_queue(4);
        let waiter = tokio::spawn(async move { rx.recv().await });
        tokio::task::yield_now().await;
        queue.close();
        assert_eq!(waiter.await.unwrap(), None);
    }

    #[test]
    fn connection_ids_are_unique() {
        let participant = Participant {
            id: "u".into(),
            name: String::new(),
            email: String::new(),
            color: String::new(),
            image_url: String::new(),
        };
        let (a, _) = Connection::new("s".into(), participant.clone());
        let (b, _) = Connection::new("s".into(), participant);
        assert_ne!(a.id, b.id);
    }
}
