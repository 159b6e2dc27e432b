//! Error types for the chat relay
//!
//! Defines application-level errors and outbound queue errors.
//! Uses thiserror for ergonomic error definitions.

use thiserror::Error;

/// Application-level errors
///
/// None of these ever reach another client: a failing connection is torn
/// down on its own and the room keeps running.
#[derive(Debug, Error)]
pub enum AppError {
    /// WebSocket protocol error (fatal for the connection)
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] axum::Error),

    /// A message could not be serialized into a frame
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error (fatal)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The room's inbox is gone (room task stopped)
    #[error("Room closed")]
    RoomClosed,

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Configuration validation errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be greater than zero")]
    ZeroCapacity(&'static str),

    #[error("at least one allowed origin is required")]
    NoOrigins,

    #[error("invalid origin '{0}'")]
    InvalidOrigin(String),
}

/// Outbound queue offer errors
///
/// Returned by a non-blocking offer to a client's outbound queue.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum OfferError {
    /// Queue is at capacity (slow consumer)
    #[error("Outbound queue full")]
    Full,

    /// The client has been closed
    #[error("Channel closed")]
    Closed,
}
