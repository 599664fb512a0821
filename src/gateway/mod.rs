//! Gateway core: HTTP surface, dispatcher, SSE plane and reload control

pub mod dispatch;
pub mod reload;
pub mod server;
pub mod sse;

pub use server::{
    spawn_internal_listener, spawn_public_listener, GatewayServer, PublicListener,
    SHUTDOWN_GRACE_SECS,
};
