//! Room actor implementation
//!
//! The single broadcaster of the relay: owns the registry of connected
//! clients and the message history. All mutations arrive as
//! [`RoomCommand`]s on one mpsc inbox and are applied by [`Room::run`] in
//! order, so no lock is needed on the write path. Read-only views for the
//! HTTP layer are published into an `RwLock` that only the loop writes.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::client::{ClientHandle, Frame};
use crate::error::AppError;
use crate::history::History;
use crate::message::Message;
use crate::types::ClientId;

/// Inbox buffer size for room commands
pub const COMMAND_BUFFER_SIZE: usize = 256;

/// Commands sent from connection adapters to the Room actor
#[derive(Debug)]
pub enum RoomCommand {
    /// Client connected
    Register { client: Arc<ClientHandle> },
    /// Client disconnected
    Unregister { client: Arc<ClientHandle> },
    /// Deliver a serialized frame to every registered client
    Broadcast { frame: Frame },
    /// Append a message to history
    Record { message: Message },
    /// Append a message to history and fan out its frame in the same step
    Publish { message: Message, frame: Frame },
}

/// State published by the loop for readers outside it
#[derive(Debug, Default)]
struct Published {
    history: History,
    client_count: usize,
}

/// The Room actor
///
/// Owned by exactly one task. Everything else talks to it through a
/// [`RoomHandle`].
pub struct Room {
    /// Registered clients: ClientId -> handle
    clients: HashMap<ClientId, Arc<ClientHandle>>,
    /// History and counters, written only here
    published: Arc<RwLock<Published>>,
    /// Command receiver channel
    receiver: mpsc::Receiver<RoomCommand>,
}

/// Cloneable front end of a running [`Room`]
#[derive(Debug, Clone)]
pub struct RoomHandle {
    sender: mpsc::Sender<RoomCommand>,
    published: Arc<RwLock<Published>>,
}

impl Room {
    /// Create a room keeping up to `history_capacity` messages, plus its handle
    pub fn new(history_capacity: usize) -> (Self, RoomHandle) {
        let (sender, receiver) = mpsc::channel(COMMAND_BUFFER_SIZE);
        let published = Arc::new(RwLock::new(Published {
            history: History::new(history_capacity),
            client_count: 0,
        }));

        let room = Self {
            clients: HashMap::new(),
            published: published.clone(),
            receiver,
        };
        let handle = RoomHandle { sender, published };
        (room, handle)
    }

    /// Create a room and run it on its own task
    pub fn spawn(history_capacity: usize) -> RoomHandle {
        let (room, handle) = Self::new(history_capacity);
        tokio::spawn(room.run());
        handle
    }

    /// Run the Room event loop
    ///
    /// Processes commands until every handle has been dropped.
    pub async fn run(mut self) {
        info!("Room started");

        while let Some(cmd) = self.receiver.recv().await {
            self.handle_command(cmd);
        }

        info!("Room shutting down");
    }

    /// Process a single command
    fn handle_command(&mut self, cmd: RoomCommand) {
        match cmd {
            RoomCommand::Register { client } => self.handle_register(client),
            RoomCommand::Unregister { client } => self.handle_unregister(client),
            RoomCommand::Broadcast { frame } => self.fan_out(&frame),
            RoomCommand::Record { message } => self.handle_record(message),
            RoomCommand::Publish { message, frame } => {
                self.handle_record(message);
                self.fan_out(&frame);
            }
        }
    }

    /// Handle new client: announce it, then replay history to it alone
    fn handle_register(&mut self, client: Arc<ClientHandle>) {
        info!("Client {} ({}) joined", client.id(), client.username());
        self.clients.insert(client.id(), client.clone());
        self.publish_client_count();

        self.broadcast_message(&Message::join(client.username()));
        self.replay_history(&client);

        debug!("Total clients: {}", self.clients.len());
    }

    /// Handle client removal; unknown clients are ignored
    fn handle_unregister(&mut self, client: Arc<ClientHandle>) {
        if self.clients.remove(&client.id()).is_none() {
            debug!("Client {} already removed", client.id());
            return;
        }
        self.publish_client_count();

        client.close();
        info!("Client {} ({}) left", client.id(), client.username());

        self.broadcast_message(&Message::leave(client.username()));
        debug!("Total clients: {}", self.clients.len());
    }

    fn handle_record(&mut self, message: Message) {
        let mut published = self.published.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(evicted) = published.history.push(message) {
            debug!("History full, dropped message {}", evicted.id());
        }
    }

    /// Offer history to one client, stopping at the first refused frame
    fn replay_history(&self, client: &ClientHandle) {
        let published = self.published.read().unwrap_or_else(PoisonError::into_inner);

        for message in published.history.iter() {
            let frame = match message.to_frame() {
                Ok(frame) => frame,
                Err(e) => {
                    error!("Failed to serialize history message: {}", e);
                    continue;
                }
            };
            if client.offer(frame).is_err() {
                debug!("History replay to {} cut short", client.id());
                return;
            }
        }
    }

    fn broadcast_message(&mut self, message: &Message) {
        match message.to_frame() {
            Ok(frame) => self.fan_out(&frame),
            Err(e) => error!("Failed to serialize {:?} notice: {}", message.kind(), e),
        }
    }

    /// Offer a frame to every client, evicting those that refuse it
    fn fan_out(&mut self, frame: &Frame) {
        let before = self.clients.len();

        self.clients.retain(|id, client| match client.offer(frame.clone()) {
            Ok(()) => true,
            Err(e) => {
                warn!("Evicting client {} ({}): {}", id, client.username(), e);
                client.close();
                false
            }
        });

        if self.clients.len() != before {
            self.publish_client_count();
        }
        debug!("Fanned out frame to {} clients", self.clients.len());
    }

    fn publish_client_count(&self) {
        let mut published = self.published.write().unwrap_or_else(PoisonError::into_inner);
        published.client_count = self.clients.len();
    }
}

impl RoomHandle {
    /// Register a client with the room
    pub async fn register(&self, client: Arc<ClientHandle>) -> Result<(), AppError> {
        self.send(RoomCommand::Register { client }).await
    }

    /// Unregister a client; safe to call more than once
    pub async fn unregister(&self, client: Arc<ClientHandle>) -> Result<(), AppError> {
        self.send(RoomCommand::Unregister { client }).await
    }

    /// Fan a serialized frame out to every registered client
    pub async fn broadcast(&self, frame: Frame) -> Result<(), AppError> {
        self.send(RoomCommand::Broadcast { frame }).await
    }

    /// Append a message to the room's history
    pub async fn record_message(&self, message: Message) -> Result<(), AppError> {
        self.send(RoomCommand::Record { message }).await
    }

    /// Record a message and broadcast its frame as one command
    ///
    /// A client registering concurrently sees the message exactly once:
    /// either in its history replay or live, never both.
    pub async fn publish(&self, message: Message, frame: Frame) -> Result<(), AppError> {
        self.send(RoomCommand::Publish { message, frame }).await
    }

    /// Copy of the current history, oldest first
    pub fn snapshot(&self) -> Vec<Message> {
        self.read(|published| published.history.to_vec())
    }

    /// Number of registered clients
    pub fn client_count(&self) -> usize {
        self.read(|published| published.client_count)
    }

    /// Number of messages in history
    pub fn message_count(&self) -> usize {
        self.read(|published| published.history.len())
    }

    async fn send(&self, cmd: RoomCommand) -> Result<(), AppError> {
        self.sender.send(cmd).await.map_err(|_| AppError::RoomClosed)
    }

    fn read<T>(&self, f: impl FnOnce(&Published) -> T) -> T {
        let published = self.published.read().unwrap_or_else(PoisonError::into_inner);
        f(&published)
    }
}
