//! Redis-backed shared session store
//!
//! Session metadata is persisted under `session:<id>` with the live id set
//! in `session:ids`; events and lifecycle notices cross a single pub/sub
//! topic. Each replica keeps a local `id → connection` map holding only the
//! sessions whose SSE writer is (or may become) attached here; the
//! background subscriber delivers `event` actions into that map and
//! discards events nobody local owns.
//!
//! There is no guard against two replicas holding SSE writers for the same
//! session; the deployment is expected to be session-sticky on
//! `Mcp-Session-Id`.

use crate::error::{GatewayError, Result};
use crate::session::{
    conflicting_session, PushOutcome, SessionConnection, SessionMessage, SessionMeta,
};
use futures_util::StreamExt;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

const KEY_PREFIX: &str = "session:";
const IDS_KEY: &str = "session:ids";

fn session_key(id: &str) -> String {
    format!("{}{}", KEY_PREFIX, id)
}

/// Message format on the session topic
#[derive(Debug, Clone, Serialize, Deserialize)]
struct SessionUpdate {
    /// "create", "update", "delete" or "event"
    action: String,
    meta: SessionMeta,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    message: Option<SessionMessage>,
}

/// Shared session store over Redis
pub struct RedisSessionStore {
    conn: MultiplexedConnection,
    topic: String,
    connections: Arc<RwLock<HashMap<String, Arc<SessionConnection>>>>,
    subscriber: JoinHandle<()>,
}

impl RedisSessionStore {
    /// Connect and start the topic subscriber
    pub async fn connect(url: &str, topic: &str) -> Result<Self> {
        let client = redis::Client::open(url)?;
        let conn = client.get_multiplexed_async_connection().await?;
        let pubsub = client.get_async_connection().await?.into_pubsub();

        let connections: Arc<RwLock<HashMap<String, Arc<SessionConnection>>>> =
            Arc::new(RwLock::new(HashMap::new()));
        let subscriber = tokio::spawn(Self::run_subscriber(
            pubsub,
            topic.to_string(),
            Arc::clone(&connections),
        ));

        info!("Connected shared session store at {} (topic {})", url, topic);
        Ok(Self {
            conn,
            topic: topic.to_string(),
            connections,
            subscriber,
        })
    }

    async fn run_subscriber(
        mut pubsub: redis::aio::PubSub,
        topic: String,
        connections: Arc<RwLock<HashMap<String, Arc<SessionConnection>>>>,
    ) {
        if let Err(e) = pubsub.subscribe(&topic).await {
            error!("Failed to subscribe to session topic '{}': {}", topic, e);
            return;
        }

        let mut stream = pubsub.on_message();
        while let Some(msg) = stream.next().await {
            let payload: String = match msg.get_payload() {
                Ok(payload) => payload,
                Err(e) => {
                    error!("Failed to read session update payload: {}", e);
                    continue;
                }
            };
            let update: SessionUpdate = match serde_json::from_str(&payload) {
                Ok(update) => update,
                Err(e) => {
                    error!("Failed to parse session update: {} (payload: {})", e, payload);
                    continue;
                }
            };

            match update.action.as_str() {
                "event" => {
                    let Some(message) = update.message else {
                        warn!("Session event for {} carried no message", update.meta.id);
                        continue;
                    };
                    let event = message.event.clone();
                    let connection =
                        connections.read().unwrap().get(&update.meta.id).cloned();
                    match connection {
                        Some(connection) => match connection.push(message) {
                            PushOutcome::Delivered => {
                                debug!("Delivered '{}' event to session {}", event, update.meta.id)
                            }
                            PushOutcome::Dropped => warn!(
                                "Session {} queue is full, dropping '{}' event",
                                update.meta.id, event
                            ),
                            PushOutcome::Closed => warn!(
                                "Session {} queue is closed, discarding '{}' event",
                                update.meta.id, event
                            ),
                        },
                        // No SSE writer attached on this replica; another
                        // replica owns the stream.
                        None => warn!(
                            "Discarding '{}' event for session {} with no local connection",
                            event, update.meta.id
                        ),
                    }
                }
                // Durable state lives in the KV; lifecycle notices are
                // informational on the subscriber side.
                "create" | "update" => {
                    debug!("Session {} {}", update.meta.id, update.action)
                }
                "delete" => debug!("Session {} deleted", update.meta.id),
                other => warn!("Unknown session update action '{}'", other),
            }
        }
        warn!("Session topic subscriber for '{}' ended", topic);
    }

    async fn publish(&self, action: &str, meta: &SessionMeta, message: Option<SessionMessage>) -> Result<()> {
        let update = SessionUpdate {
            action: action.to_string(),
            meta: meta.clone(),
            message,
        };
        let payload = serde_json::to_string(&update)?;
        let mut conn = self.conn.clone();
        let _: () = conn.publish(&self.topic, payload).await?;
        Ok(())
    }

    /// Fetch or create this replica's connection for a session
    fn local_connection(&self, meta: SessionMeta) -> Arc<SessionConnection> {
        let mut connections = self.connections.write().unwrap();
        connections
            .entry(meta.id.clone())
            .or_insert_with(|| SessionConnection::new(meta))
            .clone()
    }

    pub async fn register(&self, meta: SessionMeta) -> Result<Arc<SessionConnection>> {
        let key = session_key(&meta.id);
        let mut conn = self.conn.clone();

        let existing: Option<String> = conn.get(&key).await?;
        if let Some(raw) = existing {
            let stored: SessionMeta = serde_json::from_str(&raw)?;
            if !stored.matches(&meta) {
                return Err(conflicting_session(&meta.id));
            }
            return Ok(self.local_connection(stored));
        }

        let data = serde_json::to_string(&meta)?;
        let _: () = conn.set(&key, data).await?;
        let _: () = conn.sadd(IDS_KEY, &meta.id).await?;

        let connection = self.local_connection(meta.clone());
        self.publish("create", &meta, None).await?;
        info!("Registered shared session {} on prefix {}", meta.id, meta.prefix);
        Ok(connection)
    }

    pub async fn get(&self, id: &str) -> Result<Arc<SessionConnection>> {
        let mut conn = self.conn.clone();
        let exists: bool = conn.sismember(IDS_KEY, id).await?;
        if !exists {
            return Err(GatewayError::session_not_found(id));
        }
        let raw: Option<String> = conn.get(session_key(id)).await?;
        let Some(raw) = raw else {
            return Err(GatewayError::session_not_found(id));
        };
        let meta: SessionMeta = serde_json::from_str(&raw)?;

        // Park the connection in the local map so the subscriber can
        // deliver events once the SSE stream attaches on this replica.
        Ok(self.local_connection(meta))
    }

    pub async fn unregister(&self, id: &str) -> Result<()> {
        let removed = self.connections.write().unwrap().remove(id);
        if let Some(connection) = removed {
            connection.close();
        }

        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.get(session_key(id)).await?;
        let _: () = conn.del(session_key(id)).await?;
        let _: () = conn.srem(IDS_KEY, id).await?;

        if let Some(raw) = raw {
            if let Ok(meta) = serde_json::from_str::<SessionMeta>(&raw) {
                self.publish("delete", &meta, None).await?;
            }
        }
        info!("Unregistered shared session {}", id);
        Ok(())
    }

    pub async fn list(&self) -> Result<Vec<Arc<SessionConnection>>> {
        let mut conn = self.conn.clone();
        let ids: Vec<String> = conn.smembers(IDS_KEY).await?;

        let mut result = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(connection) = self.connections.read().unwrap().get(&id).cloned() {
                result.push(connection);
                continue;
            }
            let raw: Option<String> = conn.get(session_key(&id)).await?;
            let Some(raw) = raw else { continue };
            match serde_json::from_str::<SessionMeta>(&raw) {
                // Detached view of a session owned elsewhere.
                Ok(meta) => result.push(SessionConnection::new(meta)),
                Err(e) => error!("Failed to parse metadata for session {}: {}", id, e),
            }
        }
        Ok(result)
    }

    /// Events fan out through the topic regardless of which replica
    /// executes the tool, so the replica holding the SSE writer receives
    /// them.
    pub async fn send(
        &self,
        connection: &Arc<SessionConnection>,
        message: SessionMessage,
    ) -> Result<()> {
        self.publish("event", connection.meta(), Some(message)).await
    }

    pub async fn close(&self) -> Result<()> {
        self.subscriber.abort();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_update_wire_format() {
        let update = SessionUpdate {
            action: "event".to_string(),
            meta: SessionMeta::streamable("s1", "/svc"),
            message: Some(SessionMessage::message(r#"{"k":1}"#)),
        };
        let value = serde_json::to_value(&update).unwrap();
        assert_eq!(value["action"], "event");
        assert_eq!(value["meta"]["type"], "streamable");
        assert_eq!(value["message"]["event"], "message");

        let update = SessionUpdate {
            action: "create".to_string(),
            meta: SessionMeta::streamable("s1", "/svc"),
            message: None,
        };
        let value = serde_json::to_value(&update).unwrap();
        assert!(value.get("message").is_none());
    }

    #[test]
    fn test_session_key_layout() {
        assert_eq!(session_key("abc"), "session:abc");
        assert_eq!(IDS_KEY, "session:ids");
    }
}
