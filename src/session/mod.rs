//! Session management
//!
//! A session is a stateful association between a client and the gateway,
//! identified by `Mcp-Session-Id`. Each live session owns one bounded FIFO
//! queue of events drained by at most one SSE writer. Two store variants
//! satisfy the same contract: a replica-local map and a Redis-backed store
//! that fans events out over a pub/sub topic so the replica holding the SSE
//! writer receives them.

mod local;
mod redis;

pub use self::redis::RedisSessionStore;
pub use local::LocalSessionStore;

use crate::error::{GatewayError, Result};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// Capacity of each session's event queue
pub const SESSION_QUEUE_CAPACITY: usize = 100;

/// Session type for streamable-HTTP clients
pub const SESSION_TYPE_STREAMABLE: &str = "streamable";

/// Immutable session metadata, fixed at registration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionMeta {
    /// Session id (uuid v4)
    pub id: String,
    /// Registration time
    #[serde(rename = "createdAt")]
    pub created_at: chrono::DateTime<chrono::Utc>,
    /// Routing prefix the session was created under
    pub prefix: String,
    /// Transport type ("streamable" or "sse")
    #[serde(rename = "type")]
    pub session_type: String,
}

impl SessionMeta {
    /// Metadata for a new streamable session on a prefix
    pub fn streamable(id: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            created_at: chrono::Utc::now(),
            prefix: prefix.into(),
            session_type: SESSION_TYPE_STREAMABLE.to_string(),
        }
    }

    /// Identity comparison for idempotent registration: `created_at` is
    /// assigned by whichever replica registered first and is excluded
    pub fn matches(&self, other: &SessionMeta) -> bool {
        self.id == other.id
            && self.prefix == other.prefix
            && self.session_type == other.session_type
    }
}

/// One event delivered through a session queue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionMessage {
    /// SSE event name: "message", "ping" or "end"
    pub event: String,
    /// Opaque JSON-encoded payload
    pub data: String,
    /// Monotonic per-session counter, stamped by the dispatcher on queued
    /// responses
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub id: Option<u64>,
}

impl SessionMessage {
    /// A "message" event carrying a payload
    pub fn message(data: impl Into<String>) -> Self {
        Self {
            event: "message".to_string(),
            data: data.into(),
            id: None,
        }
    }
}

/// Outcome of a non-blocking queue push
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// Enqueued for the SSE writer
    Delivered,
    /// Queue full; the message was dropped (drop-newest policy)
    Dropped,
    /// Queue closed; the session is gone
    Closed,
}

/// A live session: metadata plus the bounded event queue
///
/// The store owns the sender side; the SSE handler takes the receiver while
/// attached and returns it on detach, so at most one writer drains the
/// queue at a time.
#[derive(Debug)]
pub struct SessionConnection {
    meta: SessionMeta,
    tx: Mutex<Option<mpsc::Sender<SessionMessage>>>,
    rx: Mutex<Option<mpsc::Receiver<SessionMessage>>>,
    next_event_id: AtomicU64,
}

impl SessionConnection {
    /// Create a connection with a fresh queue
    pub fn new(meta: SessionMeta) -> Arc<Self> {
        let (tx, rx) = mpsc::channel(SESSION_QUEUE_CAPACITY);
        Arc::new(Self {
            meta,
            tx: Mutex::new(Some(tx)),
            rx: Mutex::new(Some(rx)),
            next_event_id: AtomicU64::new(1),
        })
    }

    /// Session metadata
    pub fn meta(&self) -> &SessionMeta {
        &self.meta
    }

    /// Non-blocking enqueue; a full queue drops the message (drop-newest)
    pub fn push(&self, message: SessionMessage) -> PushOutcome {
        let tx = self.tx.lock().unwrap().clone();
        let Some(tx) = tx else {
            return PushOutcome::Closed;
        };
        match tx.try_send(message) {
            Ok(()) => PushOutcome::Delivered,
            Err(mpsc::error::TrySendError::Full(_)) => PushOutcome::Dropped,
            Err(mpsc::error::TrySendError::Closed(_)) => PushOutcome::Closed,
        }
    }

    /// Claim the next monotonic event id for this session
    pub fn next_event_id(&self) -> u64 {
        self.next_event_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Detach the queue receiver for the SSE drain loop; `None` while
    /// another writer holds it
    pub fn take_receiver(&self) -> Option<mpsc::Receiver<SessionMessage>> {
        self.rx.lock().unwrap().take()
    }

    /// Return the receiver after the SSE writer detaches, allowing a later
    /// reconnect to resume draining
    pub fn return_receiver(&self, receiver: mpsc::Receiver<SessionMessage>) {
        *self.rx.lock().unwrap() = Some(receiver);
    }

    /// Close the queue: subsequent pushes fail and an attached writer
    /// observes end-of-stream once drained
    pub fn close(&self) {
        self.tx.lock().unwrap().take();
    }

    /// Whether the queue has been closed
    pub fn is_closed(&self) -> bool {
        self.tx.lock().unwrap().is_none()
    }

    /// Whether an SSE writer currently holds the queue receiver
    pub fn has_attached_writer(&self) -> bool {
        self.rx.lock().unwrap().is_none()
    }
}

/// Session store: replica-local map or Redis-shared
///
/// Tagged variants rather than a trait object; both satisfy the same
/// register/get/unregister/list/send contract.
pub enum SessionStore {
    Local(LocalSessionStore),
    Shared(RedisSessionStore),
}

impl SessionStore {
    /// In-process store
    pub fn local() -> Self {
        Self::Local(LocalSessionStore::new())
    }

    /// Redis-backed store sharing sessions between replicas
    pub async fn shared(url: &str, topic: &str) -> Result<Self> {
        Ok(Self::Shared(RedisSessionStore::connect(url, topic).await?))
    }

    /// Register a session. Idempotent on the id: re-registering a live id
    /// with identical metadata returns the existing connection without
    /// resetting its queue; differing metadata is a conflict.
    pub async fn register(&self, meta: SessionMeta) -> Result<Arc<SessionConnection>> {
        match self {
            Self::Local(store) => store.register(meta),
            Self::Shared(store) => store.register(meta).await,
        }
    }

    /// Look up a live session
    pub async fn get(&self, id: &str) -> Result<Arc<SessionConnection>> {
        match self {
            Self::Local(store) => store.get(id),
            Self::Shared(store) => store.get(id).await,
        }
    }

    /// Remove a session and close its queue. Idempotent.
    pub async fn unregister(&self, id: &str) -> Result<()> {
        match self {
            Self::Local(store) => store.unregister(id),
            Self::Shared(store) => store.unregister(id).await,
        }
    }

    /// Diagnostic listing of live sessions
    pub async fn list(&self) -> Result<Vec<Arc<SessionConnection>>> {
        match self {
            Self::Local(store) => Ok(store.list()),
            Self::Shared(store) => store.list().await,
        }
    }

    /// Deliver a server-originated event to a session
    ///
    /// Local: non-blocking push onto the connection's queue. Shared:
    /// publish on the topic so the replica holding the SSE writer picks it
    /// up.
    pub async fn send(
        &self,
        connection: &Arc<SessionConnection>,
        message: SessionMessage,
    ) -> Result<()> {
        match self {
            Self::Local(store) => store.send(connection, message),
            Self::Shared(store) => store.send(connection, message).await,
        }
    }

    /// Shut the store down
    pub async fn close(&self) -> Result<()> {
        match self {
            Self::Local(_) => Ok(()),
            Self::Shared(store) => store.close().await,
        }
    }
}

/// Conflict error for an id already registered with different metadata
pub(crate) fn conflicting_session(id: &str) -> GatewayError {
    GatewayError::conflict(format!(
        "session '{}' is already registered with different metadata",
        id
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_ids_are_monotonic() {
        let conn = SessionConnection::new(SessionMeta::streamable("s1", "/"));
        assert_eq!(conn.next_event_id(), 1);
        assert_eq!(conn.next_event_id(), 2);

        // Pushes do not stamp ids themselves; queued data is untouched.
        assert_eq!(conn.push(SessionMessage::message("a")), PushOutcome::Delivered);
        let mut rx = conn.take_receiver().unwrap();
        assert_eq!(rx.try_recv().unwrap().id, None);
    }

    #[test]
    fn test_push_never_blocks_and_drops_newest() {
        let conn = SessionConnection::new(SessionMeta::streamable("s1", "/"));
        let mut delivered = 0;
        let mut dropped = 0;
        for i in 0..150 {
            match conn.push(SessionMessage::message(format!("{}", i))) {
                PushOutcome::Delivered => delivered += 1,
                PushOutcome::Dropped => dropped += 1,
                PushOutcome::Closed => panic!("queue unexpectedly closed"),
            }
        }
        assert_eq!(delivered, SESSION_QUEUE_CAPACITY);
        assert_eq!(dropped, 50);

        // The delivered messages are the first 100, in push order.
        let mut rx = conn.take_receiver().unwrap();
        for i in 0..SESSION_QUEUE_CAPACITY {
            assert_eq!(rx.try_recv().unwrap().data, format!("{}", i));
        }
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_close_ends_stream_after_drain() {
        let conn = SessionConnection::new(SessionMeta::streamable("s1", "/"));
        conn.push(SessionMessage::message("last"));
        conn.close();
        assert_eq!(conn.push(SessionMessage::message("late")), PushOutcome::Closed);

        let mut rx = conn.take_receiver().unwrap();
        assert_eq!(rx.try_recv().unwrap().data, "last");
        // Sender dropped: the receiver now reports disconnection.
        assert!(matches!(
            rx.try_recv(),
            Err(mpsc::error::TryRecvError::Disconnected)
        ));
    }

    #[test]
    fn test_single_receiver_at_a_time() {
        let conn = SessionConnection::new(SessionMeta::streamable("s1", "/"));
        let rx = conn.take_receiver().unwrap();
        assert!(conn.take_receiver().is_none());
        conn.return_receiver(rx);
        assert!(conn.take_receiver().is_some());
    }
}
