//! Basic type definitions for the chat relay
//!
//! Provides identifier types:
//! - `ClientId`: UUID-based unique client identifier
//! - `generate_message_id`: fresh opaque id for a chat message

use uuid::Uuid;

/// Unique client identifier (newtype pattern)
///
/// Wraps a UUID v4 for type-safe client identification.
/// Implements Hash and Eq for use as HashMap keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClientId(pub Uuid);

impl ClientId {
    /// Create a new random client ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ClientId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ClientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Generate a message id, unique for the lifetime of the process
pub fn generate_message_id() -> String {
    Uuid::new_v4().simple().to_string()
}
