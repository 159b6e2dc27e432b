//! Server assembly and execution
//!
//! Builds the router around a freshly spawned room and serves it until
//! Ctrl+C.

use axum::{
    http::{
        header::{ACCEPT, AUTHORIZATION, CONTENT_LENGTH, CONTENT_TYPE, ORIGIN},
        HeaderValue, Method,
    },
    routing::get,
    Router,
};
use tokio::net::TcpListener;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    services::{ServeDir, ServeFile},
    trace::TraceLayer,
};
use tracing::info;

use crate::config::Config;
use crate::error::{AppError, ConfigError};
use crate::room::{Room, RoomHandle};
use crate::routes::{get_messages, get_stats, health_check, websocket_handler, AppState};

/// Spawn the room and build the router serving it
///
/// Must be called from within a tokio runtime.
pub fn build_app(config: &Config) -> Result<(Router, RoomHandle), ConfigError> {
    config.validate()?;
    let cors = cors_layer(config)?;

    let room = Room::spawn(config.max_messages);
    let state = AppState::new(room.clone(), config.client_queue_capacity);

    let app = Router::new()
        // WebSocket endpoint
        .route("/ws", get(websocket_handler))
        // HTTP endpoints
        .route("/api/messages", get(get_messages))
        .route("/api/stats", get(get_stats))
        .route("/api/health", get(health_check))
        // Chat page and its assets
        .route_service("/", ServeFile::new(config.static_dir.join("index.html")))
        .nest_service("/static", ServeDir::new(&config.static_dir))
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    Ok((app, room))
}

/// Run the chat relay until shutdown
pub async fn run(config: Config) -> Result<(), AppError> {
    let (app, _room) = build_app(&config)?;

    let bind_addr = config.bind_addr();
    let listener = TcpListener::bind(&bind_addr).await?;

    info!("Chat relay listening on {}", listener.local_addr()?);
    info!("Connect to: ws://{}/ws?username=<name>", bind_addr);
    info!("Press Ctrl+C to shutdown gracefully");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

fn cors_layer(config: &Config) -> Result<CorsLayer, ConfigError> {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([ORIGIN, CONTENT_TYPE, ACCEPT, AUTHORIZATION])
        .expose_headers([CONTENT_LENGTH]);

    if config.allows_any_origin() {
        // Credentials cannot be combined with a wildcard origin
        return Ok(layer.allow_origin(Any));
    }

    let origins = config
        .allow_origins
        .iter()
        .map(|origin| origin.trim())
        .filter(|origin| !origin.is_empty())
        .map(|origin| {
            HeaderValue::from_str(origin).map_err(|_| ConfigError::InvalidOrigin(origin.to_string()))
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(layer
        .allow_origin(AllowOrigin::list(origins))
        .allow_credentials(true))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
