//! Hot-reload controller
//!
//! Triggered by SIGHUP, `POST /_reload` on the internal port, or a config
//! notifier tick. Reloads are single-flight and fail closed to the old
//! snapshot: a merge failure leaves the running configuration untouched.
//! On success the public listener is rebuilt over the new snapshot (the old
//! one stops within the shutdown grace window) and the snapshot pointer is
//! swapped atomically so in-flight dispatch finishes against the snapshot
//! it started with. Sessions live outside the listener and survive.

use crate::config::{merge_configs, FileConfigStore};
use crate::gateway::server::{spawn_public_listener, GatewayServer, PublicListener};
use std::sync::Arc;
use tracing::{error, info};

/// Execute one reload cycle, replacing the public listener on success
pub async fn handle_reload(
    server: &Arc<GatewayServer>,
    store: &FileConfigStore,
    listener: &mut Option<PublicListener>,
    host: &str,
    port: u16,
) {
    let _guard = server.reload_lock().lock().await;
    info!("Reloading gateway configuration");

    let documents = match store.list() {
        Ok(documents) => documents,
        Err(e) => {
            error!("Failed to load configurations, keeping current snapshot: {}", e);
            return;
        }
    };
    let snapshot = match merge_configs(documents) {
        Ok(snapshot) => Arc::new(snapshot),
        Err(e) => {
            error!("Failed to merge configurations, keeping current snapshot: {}", e);
            return;
        }
    };

    // The old listener must release the port before the new one binds.
    if let Some(old) = listener.take() {
        old.stop().await;
    }
    match spawn_public_listener(Arc::clone(server), &snapshot, host, port) {
        Ok(new_listener) => *listener = Some(new_listener),
        Err(e) => {
            error!("Failed to start new public listener: {}", e);
            return;
        }
    }

    server.publish_snapshot(snapshot);
    info!("Reload complete");
}
