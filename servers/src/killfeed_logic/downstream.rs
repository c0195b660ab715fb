//! # Downstream Surface
//!
//! HTTP and WebSocket routes over the shared [`AppState`]:
//!
//! - `GET /api/kills`: the rolling cache as a JSON array, newest first.
//! - `GET /ws`: live channel; one `new_kill` frame per discovered kill.
//! - `GET /health`: liveness probe.
//! - `GET /status`: poller and fan-out counters.
//!
//! Any origin may call these routes.

use std::net::SocketAddr;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        ConnectInfo, State,
    },
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use futures_util::StreamExt;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tracing::{debug, error, info, warn};

use crate::killfeed_logic::model::ServerMessage;
use crate::killfeed_logic::state::AppState;

/// Builds the router with every route and the CORS layer.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);

    Router::new()
        .route("/api/kills", get(snapshot_handler))
        .route("/ws", get(ws_handler))
        .route("/health", get(health_handler))
        .route("/status", get(status_handler))
        .layer(cors)
        .with_state(state)
}

/// Serves on `listener` until `state.shutdown` is cancelled.
pub async fn serve(listener: TcpListener, state: AppState) -> anyhow::Result<()> {
    let shutdown = state.shutdown.clone();
    let app = router(state);

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(async move {
            shutdown.cancelled().await;
            info!("Downstream server shutting down.");
        })
        .await?;

    Ok(())
}

async fn snapshot_handler(State(state): State<AppState>) -> Response {
    let snapshot = state.cache.snapshot();

    match serde_json::to_vec(snapshot.as_slice()) {
        Ok(body) => ([(header::CONTENT_TYPE, "application/json")], body).into_response(),
        Err(e) => {
            error!(error = %e, "Failed to serialize kill snapshot");
            (StatusCode::INTERNAL_SERVER_ERROR, "snapshot unavailable").into_response()
        }
    }
}

async fn health_handler() -> &'static str {
    "OK"
}

async fn status_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.status())
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state, addr))
}

/// # WebSocket Session
///
/// Attaches to the dispatcher and forwards every frame until the client
/// closes, the transport fails or the server shuts down. Inbound text is
/// ignored. Attaching does not replay the cache; clients fetch
/// `/api/kills` for history.
async fn handle_socket(mut socket: WebSocket, state: AppState, addr: SocketAddr) {
    let label = format!("ws-{}", addr);
    let mut subscription = state.dispatcher.add_client(&label);
    info!(client = subscription.id(), %addr, "Live client connected");

    loop {
        tokio::select! {
            _ = state.shutdown.cancelled() => {
                let _ = socket.send(Message::Close(None)).await;
                break;
            }
            inbound = socket.next() => match inbound {
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!(client = subscription.id(), error = %e, "WebSocket receive failed");
                    break;
                }
            },
            frame = subscription.recv() => {
                let Some(event) = frame else { break };
                match serde_json::to_string(&ServerMessage::new_kill(&event)) {
                    Ok(json) => {
                        if socket.send(Message::Text(json.into())).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => warn!(error = %e, "Failed to serialize kill frame"),
                }
            }
        }
    }

    info!(client = subscription.id(), %addr, "Live client disconnected");
    // Dropping the subscription detaches the client from the dispatcher.
}
