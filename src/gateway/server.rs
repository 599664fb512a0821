//! Gateway server state and HTTP listeners
//!
//! `GatewayServer` owns everything request handlers share: the published
//! config snapshot, the session store, the process environment snapshot and
//! the shutdown signal. The snapshot is replaced, never mutated; readers
//! clone the `Arc` and finish against whichever snapshot they started with.

use crate::config::GatewaySnapshot;
use crate::error::{GatewayError, Result};
use crate::gateway::{dispatch, sse};
use crate::session::SessionStore;
use actix_web::dev::ServerHandle;
use actix_web::{web, App, HttpRequest, HttpResponse, HttpServer};
use serde_json::json;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{error, info};

/// Grace window for stopping a listener, in seconds
pub const SHUTDOWN_GRACE_SECS: u64 = 5;

/// Shared gateway state
pub struct GatewayServer {
    snapshot: RwLock<Arc<GatewaySnapshot>>,
    sessions: SessionStore,
    env: HashMap<String, String>,
    shutdown: watch::Sender<bool>,
    reload_lock: tokio::sync::Mutex<()>,
}

impl GatewayServer {
    /// Create the gateway state around an initial snapshot
    pub fn new(snapshot: Arc<GatewaySnapshot>, sessions: SessionStore) -> Arc<Self> {
        let (shutdown, _) = watch::channel(false);
        Arc::new(Self {
            snapshot: RwLock::new(snapshot),
            sessions,
            env: crate::template::env_snapshot(),
            shutdown,
            reload_lock: tokio::sync::Mutex::new(()),
        })
    }

    /// The currently published snapshot
    pub fn snapshot(&self) -> Arc<GatewaySnapshot> {
        self.snapshot.read().unwrap().clone()
    }

    /// Atomically publish a new snapshot; in-flight requests keep their
    /// references to the old one
    pub fn publish_snapshot(&self, snapshot: Arc<GatewaySnapshot>) {
        *self.snapshot.write().unwrap() = snapshot;
    }

    /// The session store
    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    /// Read-only process environment snapshot taken at startup
    pub fn env(&self) -> &HashMap<String, String> {
        &self.env
    }

    /// Subscribe to the shutdown signal
    pub fn shutdown_rx(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }

    /// Signal shutdown to SSE drain loops
    pub fn signal_shutdown(&self) {
        let _ = self.shutdown.send(true);
    }

    /// Single-flight guard for the reload controller
    pub fn reload_lock(&self) -> &tokio::sync::Mutex<()> {
        &self.reload_lock
    }
}

/// Unified MCP endpoint handler: method switch per the streaming plane
pub async fn handle_mcp(
    req: HttpRequest,
    body: web::Bytes,
    server: web::Data<Arc<GatewayServer>>,
) -> HttpResponse {
    match req.method().as_str() {
        "OPTIONS" => HttpResponse::Ok().finish(),
        "GET" => sse::handle_sse(req, server.get_ref()).await,
        "POST" => dispatch::handle_post(req, body, server.get_ref()).await,
        "DELETE" => dispatch::handle_delete(req, server.get_ref()).await,
        _ => dispatch::method_not_allowed(),
    }
}

/// A running public listener
pub struct PublicListener {
    handle: ServerHandle,
    task: JoinHandle<()>,
}

impl PublicListener {
    /// Gracefully stop the listener, bounded by the shutdown grace window
    pub async fn stop(self) {
        self.handle.stop(true).await;
        self.task.abort();
    }
}

/// Bind and spawn the public MCP listener for a snapshot's prefixes
pub fn spawn_public_listener(
    server: Arc<GatewayServer>,
    snapshot: &GatewaySnapshot,
    host: &str,
    port: u16,
) -> Result<PublicListener> {
    let data = web::Data::new(server);
    let paths: Vec<String> = snapshot
        .routers()
        .iter()
        .map(|r| {
            if r.prefix == "/" {
                "/mcp".to_string()
            } else {
                format!("{}/mcp", r.prefix)
            }
        })
        .collect();

    let http_server = HttpServer::new(move || {
        let mut app = App::new().app_data(data.clone());
        for path in &paths {
            app = app.route(path, web::route().to(handle_mcp));
        }
        app
    })
    .disable_signals()
    .shutdown_timeout(SHUTDOWN_GRACE_SECS)
    .bind((host, port))
    .map_err(|e| GatewayError::config(format!("failed to bind {}:{}: {}", host, port, e)))?
    .run();

    let handle = http_server.handle();
    let task = tokio::spawn(async move {
        if let Err(e) = http_server.await {
            error!("Public server error: {}", e);
        }
    });

    info!("Public MCP listener started on {}:{}", host, port);
    Ok(PublicListener { handle, task })
}

async fn handle_internal_reload(trigger: web::Data<mpsc::Sender<()>>) -> HttpResponse {
    if trigger.try_send(()).is_err() {
        // A reload is already queued; the pending one covers this request.
        info!("Reload already pending");
    }
    HttpResponse::Ok().json(json!({"status": "reload triggered"}))
}

/// Bind and spawn the internal listener serving `POST /_reload`
pub fn spawn_internal_listener(
    trigger: mpsc::Sender<()>,
    host: &str,
    port: u16,
) -> Result<PublicListener> {
    let data = web::Data::new(trigger);
    let http_server = HttpServer::new(move || {
        App::new()
            .app_data(data.clone())
            .route("/_reload", web::post().to(handle_internal_reload))
    })
    .disable_signals()
    .shutdown_timeout(SHUTDOWN_GRACE_SECS)
    .bind((host, port))
    .map_err(|e| GatewayError::config(format!("failed to bind {}:{}: {}", host, port, e)))?
    .run();

    let handle = http_server.handle();
    let task = tokio::spawn(async move {
        if let Err(e) = http_server.await {
            error!("Internal server error: {}", e);
        }
    });

    info!("Internal listener started on {}:{}", host, port);
    Ok(PublicListener { handle, task })
}
