//! Server configuration
//!
//! Every option can be given as a command line flag or through the
//! environment (`PORT`, `MAX_MESSAGES`, ...).

use std::path::PathBuf;

use clap::Parser;

use crate::client::DEFAULT_QUEUE_CAPACITY;
use crate::error::ConfigError;
use crate::history::DEFAULT_HISTORY_CAPACITY;

#[derive(Parser, Debug, Clone)]
#[command(name = "chat_relay")]
#[command(about = "Single-room WebSocket chat relay with bounded history", long_about = None)]
pub struct Config {
    /// Host address to bind the server to
    #[arg(short = 'H', long, env = "HOST", default_value = "127.0.0.1")]
    pub host: String,

    /// Port number to bind the server to
    #[arg(short = 'p', long, env = "PORT", default_value_t = 8080)]
    pub port: u16,

    /// Number of messages kept in history and replayed on join
    #[arg(long, env = "MAX_MESSAGES", default_value_t = DEFAULT_HISTORY_CAPACITY)]
    pub max_messages: usize,

    /// Frames buffered per client before it is dropped as too slow
    #[arg(long, env = "CLIENT_QUEUE_CAPACITY", default_value_t = DEFAULT_QUEUE_CAPACITY)]
    pub client_queue_capacity: usize,

    /// Allowed CORS origins, comma separated; "*" allows any
    #[arg(long, env = "ALLOW_ORIGINS", value_delimiter = ',', default_value = "*")]
    pub allow_origins: Vec<String>,

    /// Directory served under /static; its index.html is the page at /
    #[arg(long, env = "STATIC_DIR", default_value = "./web/static")]
    pub static_dir: PathBuf,
}

impl Config {
    /// Check values clap cannot check on its own
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_messages == 0 {
            return Err(ConfigError::ZeroCapacity("max_messages"));
        }
        if self.client_queue_capacity == 0 {
            return Err(ConfigError::ZeroCapacity("client_queue_capacity"));
        }
        if self.allow_origins.iter().all(|origin| origin.trim().is_empty()) {
            return Err(ConfigError::NoOrigins);
        }
        Ok(())
    }

    /// Address string to bind, e.g. "127.0.0.1:8080"
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Whether every origin is allowed
    pub fn allows_any_origin(&self) -> bool {
        self.allow_origins.iter().any(|origin| origin.trim() == "*")
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            max_messages: DEFAULT_HISTORY_CAPACITY,
            client_queue_capacity: DEFAULT_QUEUE_CAPACITY,
            allow_origins: vec!["*".to_string()],
            static_dir: PathBuf::from("./web/static"),
        }
    }
}
