//! SSE subscription and drain loop
//!
//! GET on the MCP path upgrades to a Server-Sent Events stream that drains
//! the session queue. One writer per session: the handler takes the queue
//! receiver for the duration of the stream and returns it on disconnect, so
//! a second concurrent GET is rejected with 409 while a reconnect after
//! disconnect resumes draining.

use crate::gateway::dispatch::{header_value, protocol_error};
use crate::gateway::server::GatewayServer;
use crate::mcp::types::HEADER_MCP_SESSION_ID;
use crate::mcp::RpcErrorCode;
use crate::session::{SessionConnection, SessionMessage};
use actix_web::http::{header, StatusCode};
use actix_web::web::Bytes;
use actix_web::{HttpRequest, HttpResponse};
use futures_util::Stream;
use serde_json::Value;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tokio_stream::wrappers::WatchStream;
use tracing::info;

/// GET handler: upgrade to SSE and drain the session queue
pub async fn handle_sse(req: HttpRequest, server: &Arc<GatewayServer>) -> HttpResponse {
    let accept = header_value(&req, "Accept").unwrap_or_default();
    if !accept.contains("text/event-stream") {
        return protocol_error(
            Value::Null,
            RpcErrorCode::InvalidRequest,
            "Not Acceptable: Client must accept text/event-stream",
            StatusCode::NOT_ACCEPTABLE,
            None,
        );
    }
    let Some(session_id) = header_value(&req, HEADER_MCP_SESSION_ID) else {
        return protocol_error(
            Value::Null,
            RpcErrorCode::ConnectionClosed,
            "Mcp-Session-Id header is required",
            StatusCode::BAD_REQUEST,
            None,
        );
    };
    let connection = match server.sessions().get(&session_id).await {
        Ok(connection) => connection,
        Err(_) => {
            return protocol_error(
                Value::Null,
                RpcErrorCode::RequestTimeout,
                "Session not found",
                StatusCode::NOT_FOUND,
                Some(&session_id),
            )
        }
    };
    let Some(receiver) = connection.take_receiver() else {
        return protocol_error(
            Value::Null,
            RpcErrorCode::InvalidRequest,
            "another event stream is already attached to this session",
            StatusCode::CONFLICT,
            Some(&session_id),
        );
    };

    info!("SSE stream attached for session {}", session_id);
    let stream = EventStream {
        rx: Some(receiver),
        connection: Arc::clone(&connection),
        shutdown: WatchStream::new(server.shutdown_rx()),
    };

    let mut builder = HttpResponse::Ok();
    builder
        .insert_header((header::CONTENT_TYPE, "text/event-stream"))
        .insert_header((header::CACHE_CONTROL, "no-cache, no-transform"))
        .insert_header((header::CONNECTION, "keep-alive"))
        .insert_header((HEADER_MCP_SESSION_ID, session_id));
    // Replay is not implemented; the header is echoed back so the gap is
    // visible to operators.
    if let Some(last_event_id) = header_value(&req, "Last-Event-ID") {
        builder.insert_header(("Last-Event-ID", last_event_id));
    }
    builder.streaming(stream)
}

/// Stream adapter draining the session queue into SSE frames
///
/// Ends on queue closure (session deleted) or the shutdown signal; client
/// disconnect drops the stream, which hands the receiver back to the
/// connection.
struct EventStream {
    rx: Option<mpsc::Receiver<SessionMessage>>,
    connection: Arc<SessionConnection>,
    shutdown: WatchStream<bool>,
}

impl Stream for EventStream {
    type Item = std::result::Result<Bytes, actix_web::Error>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        loop {
            match Pin::new(&mut this.shutdown).poll_next(cx) {
                Poll::Ready(Some(true)) => {
                    this.rx = None;
                    return Poll::Ready(None);
                }
                // Initial value or spurious change; keep draining.
                Poll::Ready(Some(false)) => continue,
                Poll::Ready(None) | Poll::Pending => break,
            }
        }

        let Some(rx) = this.rx.as_mut() else {
            return Poll::Ready(None);
        };
        match rx.poll_recv(cx) {
            Poll::Ready(Some(message)) => Poll::Ready(Some(Ok(format_event(&message)))),
            Poll::Ready(None) => {
                this.rx = None;
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl Drop for EventStream {
    fn drop(&mut self) {
        if let Some(rx) = self.rx.take() {
            self.connection.return_receiver(rx);
            info!(
                "SSE stream detached from session {}",
                self.connection.meta().id
            );
        }
    }
}

/// Format one queue message as an SSE frame
fn format_event(message: &SessionMessage) -> Bytes {
    let mut frame = String::with_capacity(message.data.len() + 32);
    frame.push_str("event: ");
    frame.push_str(&message.event);
    frame.push('\n');
    if let Some(id) = message.id {
        frame.push_str(&format!("id: {}\n", id));
    }
    frame.push_str("data: ");
    frame.push_str(&message.data);
    frame.push_str("\n\n");
    Bytes::from(frame)
}
