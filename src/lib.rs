//! Single-room WebSocket Chat Relay Library
//!
//! Every connected client receives every message sent to the room, plus
//! a bounded window of recent history when it joins.
//!
//! # Features
//! - WebSocket connection handling on `/ws?username=<name>`
//! - Join/leave notices
//! - History replay (last 100 messages by default)
//! - Slow-consumer eviction
//! - Read-only REST views: `/api/messages`, `/api/stats`
//!
//! # Architecture
//! Uses the Actor pattern with `mpsc` channels:
//! - `Room` is the central actor owning the client registry and history
//! - Each connection runs a read pump and a write pump talking to the room
//! - The fan-out never waits on a client: a full outbound queue gets the
//!   client evicted
//! - REST handlers read snapshots the room publishes behind an `RwLock`
//!
//! # Example
//! ```ignore
//! use chat_relay::{server, Config};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = Config::default();
//!     let (app, _room) = server::build_app(&config).unwrap();
//!     let listener = tokio::net::TcpListener::bind(config.bind_addr()).await.unwrap();
//!     axum::serve(listener, app).await.unwrap();
//! }
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod handler;
pub mod history;
pub mod message;
pub mod room;
pub mod routes;
pub mod server;
pub mod types;

// Re-export main types for convenience
pub use client::{ClientHandle, Frame};
pub use config::Config;
pub use error::{AppError, ConfigError, OfferError};
pub use handler::handle_socket;
pub use history::History;
pub use message::{Message, MessageKind};
pub use room::{Room, RoomCommand, RoomHandle};
pub use types::ClientId;
