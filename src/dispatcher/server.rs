//! WebSocket request/reply endpoint and read-only status routes.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
    routing::get,
};
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use super::Dispatcher;

/// Build the router: `/ws` for workers, plus health and status JSON.
pub fn dispatch_routes(dispatcher: Arc<Dispatcher>) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health))
        .route("/api/workers", get(list_workers))
        .route("/api/queues", get(list_queues))
        .with_state(dispatcher)
}

/// Serve the dispatcher on an already-bound listener until the server stops.
pub async fn serve(listener: TcpListener, dispatcher: Arc<Dispatcher>) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!(addr = %addr, "Dispatcher listening");
    }
    axum::serve(listener, dispatch_routes(dispatcher)).await
}

// ── Status ──────────────────────────────────────────────────────────────

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "batch-dispatch"
    }))
}

async fn list_workers(State(dispatcher): State<Arc<Dispatcher>>) -> impl IntoResponse {
    Json(dispatcher.workers().await)
}

async fn list_queues(State(dispatcher): State<Arc<Dispatcher>>) -> impl IntoResponse {
    Json(dispatcher.queue_depths().await)
}

// ── WebSocket ───────────────────────────────────────────────────────────

async fn ws_handler(
    ws: WebSocketUpgrade,
    State(dispatcher): State<Arc<Dispatcher>>,
) -> impl IntoResponse {
    debug!("Worker connection upgrading");
    ws.on_upgrade(move |socket| handle_socket(socket, dispatcher))
}

/// One request, one reply, strictly in turn.
async fn handle_socket(mut socket: WebSocket, dispatcher: Arc<Dispatcher>) {
    info!("Worker connected");

    while let Some(result) = socket.recv().await {
        match result {
            Ok(Message::Text(text)) => {
                let reply = dispatcher.handle_text(text.as_str()).await;
                if socket.send(Message::Text(reply.into())).await.is_err() {
                    debug!("Worker disconnected before reply was sent");
                    break;
                }
            }
            Ok(Message::Ping(data)) => {
                if socket.send(Message::Pong(data)).await.is_err() {
                    break;
                }
            }
            Ok(Message::Close(_)) => break,
            Ok(Message::Binary(_)) => {
                debug!("Ignoring binary frame");
            }
            Ok(Message::Pong(_)) => {}
            Err(e) => {
                warn!(error = %e, "WebSocket error");
                break;
            }
        }
    }

    info!("Worker connection closed");
}
