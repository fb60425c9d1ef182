use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, error, info, warn};

use crate::db::SessionStore;
use crate::models::WsMessage;
use super::connection::{ConnId, Connection};

const REGISTER_BUFFER: usize = 64;
const BROADCAST_BUFFER: usize = 256;

/// Live connections per session id. Only the hub loop touches it.
type Registry = HashMap<String, HashMap<ConnId, Connection>>;

#[derive(Debug, Error)]
pub enum HubError {
    #[error("hub is not running")]
    Stopped,
    #[error("failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Registry counts, republished after every membership change.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HubStats {
    pub sessions: usize,
    pub connections: usize,
}

#[derive(Debug)]
struct Broadcast {
    session_id: String,
    frame: Arc<str>,
    exclude: Option<ConnId>,
}

#[derive(Debug)]
enum Query {
    Members {
        session_id: String,
        reply: oneshot::Sender<Vec<ConnId>>,
    },
}

/// Cheap, cloneable entry point to the hub loop.
#[derive(Clone)]
pub struct HubHandle {
    register_tx: mpsc::Sender<Connection>,
    unregister_tx: mpsc::Sender<Connection>,
    broadcast_tx: mpsc::Sender<Broadcast>,
    query_tx: mpsc::Sender<Query>,
    stats_rx: watch::Receiver<HubStats>,
}

impl HubHandle {
    pub async fn register(&self, conn: Connection) -> Result<(), HubError> {
        self.register_tx.send(conn).await.map_err(|_| HubError::Stopped)
    }

    pub async fn unregister(&self, conn: Connection) -> Result<(), HubError> {
        self.unregister_tx.send(conn).await.map_err(|_| HubError::Stopped)
    }

    /// Queue `message` for every connection of `session_id` except `exclude`.
    pub async fn broadcast(&self, session_id: &str, message: &WsMessage, exclude: Option<ConnId>) -> Result<(), HubError> {
        let frame: Arc<str> = message.encode()?.into();
        self.broadcast_tx
            .send(Broadcast {
                session_id: session_id.to_string(),
                frame,
                exclude,
            })
            .await
            .map_err(|_| HubError::Stopped)
    }

    /// Ids of the connections currently registered for `session_id`.
    pub async fn session_members(&self, session_id: &str) -> Result<Vec<ConnId>, HubError> {
        let (reply, rx) = oneshot::channel();
        self.query_tx
            .send(Query::Members {
                session_id: session_id.to_string(),
                reply,
            })
            .await
            .map_err(|_| HubError::Stopped)?;
        rx.await.map_err(|_| HubError::Stopped)
    }

    pub fn stats(&self) -> HubStats {
        *self.stats_rx.borrow()
    }

    /// False once the hub loop has exited.
    pub fn is_running(&self) -> bool {
        !self.register_tx.is_closed()
    }
}

/// Coordinator owning the connection registry.
///
/// Register, unregister and broadcast requests arrive on separate channels and
/// are handled one at a time by [`Hub::run`], so every fan-out sees a settled
/// membership and no other task ever mutates the registry.
pub struct Hub {
    registry: Registry,
    store: Arc<dyn SessionStore>,
    register_rx: mpsc::Receiver<Connection>,
    unregister_rx: mpsc::Receiver<Connection>,
    broadcast_rx: mpsc::Receiver<Broadcast>,
    query_rx: mpsc::Receiver<Query>,
    stats_tx: watch::Sender<HubStats>,
}

impl Hub {
    pub fn new(store: Arc<dyn SessionStore>) -> (Self, HubHandle) {
        let (register_tx, register_rx) = mpsc::channel(REGISTER_BUFFER);
        let (unregister_tx, unregister_rx) = mpsc::channel(REGISTER_BUFFER);
        let (broadcast_tx, broadcast_rx) = mpsc::channel(BROADCAST_BUFFER);
        let (query_tx, query_rx) = mpsc::channel(REGISTER_BUFFER);
        let (stats_tx, stats_rx) = watch::channel(HubStats::default());

        let hub = Self {
            registry: HashMap::new(),
            store,
            register_rx,
            unregister_rx,
            broadcast_rx,
            query_rx,
            stats_tx,
        };
        let handle = HubHandle {
            register_tx,
            unregister_tx,
            broadcast_tx,
            query_tx,
            stats_rx,
        };
        (hub, handle)
    }

    /// Start the hub loop on the runtime and return its handle.
    pub fn spawn(store: Arc<dyn SessionStore>) -> HubHandle {
        let (hub, handle) = Self::new(store);
        tokio::spawn(hub.run());
        handle
    }

    /// Runs until every handle has been dropped.
    pub async fn run(mut self) {
        info!("Hub started");
        loop {
            // Registrations before removals, so a connection is never
            // inserted after its own unregister. Queries go last and thus
            // observe every request sent before them.
            tokio::select! {
                biased;
                Some(conn) = self.register_rx.recv() => self.register(conn).await,
                Some(conn) = self.unregister_rx.recv() => self.unregister(conn),
                Some(msg) = self.broadcast_rx.recv() => self.fan_out(&msg.session_id, &msg.frame, msg.exclude),
                Some(query) = self.query_rx.recv() => self.answer(query),
                else => break,
            }
        }
        info!("Hub stopped");
    }

    async fn register(&mut self, conn: Connection) {
        self.registry
            .entry(conn.session_id.clone())
            .or_default()
            .insert(conn.id, conn.clone());
        info!(session_id = %conn.session_id, user_id = %conn.participant.id, conn_id = conn.id, "Connection registered");
        self.publish_stats();

        self.hydrate(&conn).await;

        let join = WsMessage::user_join(&conn.session_id, &conn.participant);
        self.send_to_session(&conn.session_id, &join, Some(conn.id));
    }

    /// Push the stored code and language to a newly registered connection.
    ///
    /// Runs inline on the hub loop, so it assumes `get` is an in-memory
    /// lookup. A remote store would stall fan-out for every session here.
    async fn hydrate(&self, conn: &Connection) {
        let session = match self.store.get(&conn.session_id).await {
            Ok(session) => session,
            Err(e) => {
                debug!(session_id = %conn.session_id, "No stored state to hydrate from: {}", e);
                return;
            }
        };

        let snapshot = [
            WsMessage::code_change(&conn.session_id, &session.code),
            WsMessage::language_change(&conn.session_id, &session.language),
        ];
        for msg in snapshot {
            let frame = match msg.encode() {
                Ok(frame) => frame,
                Err(e) => {
                    error!(session_id = %conn.session_id, "Failed to encode hydration frame: {}", e);
                    continue;
                }
            };
            if let Err(e) = conn.outbound.try_enqueue(frame.into()) {
                debug!(conn_id = conn.id, "Skipping hydration frame: {}", e);
            }
        }
    }

    fn unregister(&mut self, conn: Connection) {
        if let Some(bucket) = self.registry.get_mut(&conn.session_id) {
            if bucket.remove(&conn.id).is_some() {
                info!(session_id = %conn.session_id, user_id = %conn.participant.id, conn_id = conn.id, "Connection unregistered");
            }
            if bucket.is_empty() {
                self.registry.remove(&conn.session_id);
                debug!(session_id = %conn.session_id, "Session bucket removed");
            }
        }
        conn.outbound.close();
        self.publish_stats();

        let store = self.store.clone();
        let session_id = conn.session_id.clone();
        let user_id = conn.participant.id.clone();
        tokio::spawn(async move {
            if let Err(e) = store.remove_participant(&session_id, &user_id).await {
                warn!(session_id = %session_id, user_id = %user_id, "Failed to remove participant from store: {}", e);
            }
        });

        let leave = WsMessage::user_leave(&conn.session_id, &conn.participant.id);
        self.send_to_session(&conn.session_id, &leave, None);
    }

    fn send_to_session(&mut self, session_id: &str, message: &WsMessage, exclude: Option<ConnId>) {
        match message.encode() {
            Ok(frame) => {
                let frame: Arc<str> = frame.into();
                self.fan_out(session_id, &frame, exclude)
            }
            Err(e) => error!(session_id = %session_id, "Failed to encode {:?} message: {}", message.event_type(), e),
        }
    }

    /// Enqueue `frame` on every connection of the session except `exclude`.
    /// A connection whose queue rejects the frame is closed and dropped from
    /// the registry on the spot.
    fn fan_out(&mut self, session_id: &str, frame: &Arc<str>, exclude: Option<ConnId>) {
        let Some(bucket) = self.registry.get_mut(session_id) else {
            return;
        };

        let mut dead = Vec::new();
        for (id, conn) in bucket.iter() {
            if Some(*id) == exclude {
                continue;
            }
            if let Err(e) = conn.outbound.try_enqueue(frame.clone()) {
                warn!(session_id = %session_id, user_id = %conn.participant.id, conn_id = id, "Dropping connection: {}", e);
                conn.outbound.close();
                dead.push(*id);
            }
        }

        if dead.is_empty() {
            return;
        }
        for id in &dead {
            bucket.remove(id);
        }
        if bucket.is_empty() {
            self.registry.remove(session_id);
        }
        self.publish_stats();
    }

    fn answer(&self, query: Query) {
        match query {
            Query::Members { session_id, reply } => {
                let mut members: Vec<ConnId> = self
                    .registry
                    .get(&session_id)
                    .map(|bucket| bucket.keys().copied().collect())
                    .unwrap_or_default();
                members.sort_unstable();
                let _ = reply.send(members);
            }
        }
    }

    fn publish_stats(&self) {
        let stats = HubStats {
            sessions: self.registry.len(),
            connections: self.registry.values().map(HashMap::len).sum(),
        };
        self.stats_tx.send_replace(stats);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemorySessionStore;
    use crate::models::{Event, Participant, Session};
    use crate::ws::connection::OutboundReceiver;
    use std::time::Duration;
    use tokio::time::timeout;

    fn participant(id: &str) -> Participant {
        Participant {
            id: id.to_string(),
            name: format!("User {id}"),
            email: format!("{id}@example.com"),
            color: "#00ff00".to_string(),
            image_url: String::new(),
        }
    }

    fn memory_store() -> Arc<MemorySessionStore> {
        Arc::new(MemorySessionStore::new(100, Duration::from_secs(60)))
    }

    async fn next(rx: &mut OutboundReceiver) -> WsMessage {
        let frame = timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("timed out waiting for frame")
            .expect("queue closed");
        WsMessage::decode(&frame).expect("hub sent an undecodable frame")
    }

    /// Everything currently queued, without waiting.
    fn drain(rx: &mut OutboundReceiver) -> Vec<WsMessage> {
        let mut out = Vec::new();
        while let Some(frame) = rx.try_recv() {
            out.push(WsMessage::decode(&frame).unwrap());
        }
        out
    }

    /// Round-trips through the hub loop, so every earlier request is processed.
    async fn settle(hub: &HubHandle, session_id: &str) -> Vec<ConnId> {
        hub.session_members(session_id).await.unwrap()
    }

    #[tokio::test]
    async fn register_creates_bucket_and_announces_join() {
        let hub = Hub::spawn(memory_store());
        let (a, mut a_rx) = Connection::new("S1".into(), participant("a"));
        let (b, mut b_rx) = Connection::new("S1".into(), participant("b"));

        hub.register(a.clone()).await.unwrap();
        hub.register(b.clone()).await.unwrap();
        assert_eq!(settle(&hub, "S1").await.len(), 2);

        let join = next(&mut a_rx).await;
        assert_eq!(join.event, Event::UserJoin(participant("b")));
        assert!(drain(&mut b_rx).is_empty(), "joiner must not see its own join");
        assert_eq!(hub.stats(), HubStats { sessions: 1, connections: 2 });
    }

    #[tokio::test]
    async fn late_joiner_is_hydrated_before_live_traffic() {
        let store = memory_store();
        store.create(Session::new("S1".into(), "x".into(), "y".into())).await.unwrap();
        let hub = Hub::spawn(store);

        let (a, _a_rx) = Connection::new("S1".into(), participant("a"));
        hub.register(a.clone()).await.unwrap();
        let (b, mut b_rx) = Connection::new("S1".into(), participant("b"));
        hub.register(b.clone()).await.unwrap();
        settle(&hub, "S1").await;

        let live = WsMessage::code_change("S1", "live edit");
        hub.broadcast("S1", &live, Some(a.id)).await.unwrap();
        settle(&hub, "S1").await;

        let received = drain(&mut b_rx);
        assert_eq!(received.len(), 3);
        assert_eq!(received[0], WsMessage::code_change("S1", "x"));
        assert_eq!(received[1], WsMessage::language_change("S1", "y"));
        assert_eq!(received[2], live);
    }

    #[tokio::test]
    async fn unknown_session_registers_without_hydration() {
        let hub = Hub::spawn(memory_store());
        let (a, mut a_rx) = Connection::new("nowhere".into(), participant("a"));
        hub.register(a).await.unwrap();
        assert_eq!(settle(&hub, "nowhere").await.len(), 1);
        assert!(drain(&mut a_rx).is_empty());
    }

    #[tokio::test]
    async fn hydration_is_skipped_when_queue_is_full() {
        let store = memory_store();
        store.create(Session::new("S1".into(), "x".into(), "y".into())).await.unwrap();
        let hub = Hub::spawn(store);

        let (a, mut a_rx) = Connection::with_capacity("S1".into(), participant("a"), 1);
        a.outbound.try_enqueue("filler".into()).unwrap();
        hub.register(a.clone()).await.unwrap();

        assert_eq!(settle(&hub, "S1").await, vec![a.id]);
        assert_eq!(a_rx.try_recv().as_deref(), Some("filler"));
        assert!(a_rx.try_recv().is_none());
    }

    #[tokio::test]
    async fn broadcast_skips_excluded_connection() {
        let hub = Hub::spawn(memory_store());
        let (a, mut a_rx) = Connection::new("S1".into(), participant("a"));
        let (b, mut b_rx) = Connection::new("S1".into(), participant("b"));
        let (c, mut c_rx) = Connection::new("S2".into(), participant("c"));
        hub.register(a.clone()).await.unwrap();
        hub.register(b.clone()).await.unwrap();
        hub.register(c.clone()).await.unwrap();
        settle(&hub, "S1").await;
        drain(&mut a_rx);

        let msg = WsMessage::code_change("S1", "print(1)");
        hub.broadcast("S1", &msg, Some(a.id)).await.unwrap();
        settle(&hub, "S1").await;

        assert!(drain(&mut a_rx).is_empty());
        assert_eq!(drain(&mut b_rx), vec![msg]);
        assert!(drain(&mut c_rx).is_empty(), "other sessions are untouched");
    }

    #[tokio::test]
    async fn full_queue_evicts_connection() {
        let hub = Hub::spawn(memory_store());
        let (a, _a_rx) = Connection::new("S1".into(), participant("a"));
        let (slow, _slow_rx) = Connection::with_capacity("S1".into(), participant("slow"), 1);
        let (b, mut b_rx) = Connection::new("S1".into(), participant("b"));

        hub.register(slow.clone()).await.unwrap();
        hub.register(a.clone()).await.unwrap(); // fills the slow queue with a's join
        hub.register(b.clone()).await.unwrap(); // b's join overflows it
        let members = settle(&hub, "S1").await;
        assert!(!members.contains(&slow.id));
        assert!(slow.outbound.is_closed());

        let msg = WsMessage::code_change("S1", "still flowing");
        hub.broadcast("S1", &msg, Some(a.id)).await.unwrap();
        settle(&hub, "S1").await;
        assert_eq!(drain(&mut b_rx), vec![msg]);
        assert_eq!(hub.stats().connections, 2);
    }

    #[tokio::test]
    async fn leave_is_announced_and_bucket_removed_with_last_connection() {
        let store = memory_store();
        store.create(Session::new("S1".into(), String::new(), "go".into())).await.unwrap();
        store.add_participant("S1", participant("a")).await.unwrap();
        store.add_participant("S1", participant("b")).await.unwrap();
        let hub = Hub::spawn(store.clone());

        let (a, _a_rx) = Connection::new("S1".into(), participant("a"));
        let (b, mut b_rx) = Connection::new("S1".into(), participant("b"));
        hub.register(a.clone()).await.unwrap();
        hub.register(b.clone()).await.unwrap();
        settle(&hub, "S1").await;
        drain(&mut b_rx);

        hub.unregister(a.clone()).await.unwrap();
        assert_eq!(settle(&hub, "S1").await, vec![b.id]);
        assert!(a.outbound.is_closed());
        assert_eq!(drain(&mut b_rx), vec![WsMessage::user_leave("S1", "a")]);

        hub.unregister(b.clone()).await.unwrap();
        assert!(settle(&hub, "S1").await.is_empty());
        assert_eq!(hub.stats(), HubStats::default());

        // store cleanup runs in the background
        timeout(Duration::from_secs(1), async {
            while !store.get("S1").await.unwrap().users.is_empty() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("participants were not removed from the store");
    }

    #[tokio::test]
    async fn unregistered_connections_never_linger() {
        let hub = Hub::spawn(memory_store());
        let mut live = Vec::new();
        for round in 0..5 {
            let (conn, rx) = Connection::new("S1".into(), participant(&format!("u{round}")));
            hub.register(conn.clone()).await.unwrap();
            live.push((conn, rx));
            if round % 2 == 1 {
                let (gone, _) = live.remove(0);
                hub.unregister(gone.clone()).await.unwrap();
                assert!(!settle(&hub, "S1").await.contains(&gone.id));
            }
        }
        let mut expected: Vec<ConnId> = live.iter().map(|(c, _)| c.id).collect();
        expected.sort_unstable();
        assert_eq!(settle(&hub, "S1").await, expected);
    }

    #[tokio::test]
    async fn hub_stops_when_handles_are_dropped() {
        let (hub, handle) = Hub::new(memory_store());
        let task = tokio::spawn(hub.run());
        drop(handle);
        timeout(Duration::from_secs(1), task).await.unwrap().unwrap();
    }
}
