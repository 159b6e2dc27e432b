//! HTTP endpoints
//!
//! The WebSocket upgrade on `/ws` plus read-only JSON views over the room.

use std::time::{Duration, Instant};

use axum::{
    extract::{ws::WebSocketUpgrade, Query, State},
    response::IntoResponse,
    Json,
};
use serde::Serialize;
use tracing::debug;

use crate::handler::{handle_socket, ConnectQuery};
use crate::message::Message;
use crate::room::RoomHandle;

/// Shared application state
#[derive(Debug, Clone)]
pub struct AppState {
    /// The one room every connection joins
    pub room: RoomHandle,
    /// Process start, for uptime
    pub started_at: Instant,
    /// Outbound queue size for new clients
    pub client_queue_capacity: usize,
}

impl AppState {
    pub fn new(room: RoomHandle, client_queue_capacity: usize) -> Self {
        Self {
            room,
            started_at: Instant::now(),
            client_queue_capacity,
        }
    }
}

/// Body of `GET /api/messages`
#[derive(Debug, Serialize)]
pub struct MessagesResponse {
    pub messages: Vec<Message>,
    pub count: usize,
}

/// Body of `GET /api/stats`
#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub online_users: usize,
    pub total_messages: usize,
    pub uptime: String,
    pub uptime_seconds: u64,
}

/// Upgrade to a WebSocket and join the room as `?username=`
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(query): Query<ConnectQuery>,
) -> impl IntoResponse {
    let username = query.display_name();
    debug!("Upgrading connection for '{}'", username);

    ws.on_upgrade(move |socket| {
        handle_socket(socket, state.room, username, state.client_queue_capacity)
    })
}

/// Current history, oldest first
pub async fn get_messages(State(state): State<AppState>) -> Json<MessagesResponse> {
    let messages = state.room.snapshot();
    Json(MessagesResponse {
        count: messages.len(),
        messages,
    })
}

/// Online users, history size and uptime
pub async fn get_stats(State(state): State<AppState>) -> Json<StatsResponse> {
    let uptime = state.started_at.elapsed();
    Json(StatsResponse {
        online_users: state.room.client_count(),
        total_messages: state.room.message_count(),
        uptime: format_uptime(uptime),
        uptime_seconds: uptime.as_secs(),
    })
}

/// Health check endpoint
pub async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "ok"}))
}

/// Render a duration as e.g. "1h2m3s", dropping leading zero units
pub fn format_uptime(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    let (hours, minutes, seconds) = (secs / 3600, secs % 3600 / 60, secs % 60);

    if hours > 0 {
        format!("{hours}h{minutes}m{seconds}s")
    } else if minutes > 0 {
        format!("{minutes}m{seconds}s")
    } else {
        format!("{seconds}s")
    }
}
