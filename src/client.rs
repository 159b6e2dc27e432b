//! Client handle definition
//!
//! Represents one connected client: identity, the bounded outbound queue
//! the room feeds, and the close-once guard shared by the room and the
//! connection's two pumps.

use std::sync::{Mutex, PoisonError};

use tokio::sync::{mpsc, watch};

use crate::error::OfferError;
use crate::types::ClientId;

/// Default number of frames buffered per client before it counts as slow
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

/// A serialized frame waiting to be written to a client
pub type Frame = String;

/// Connected client
///
/// Shared as `Arc<ClientHandle>` between the room and the connection
/// adapter. The only mutable state is the outbound sender, guarded by a
/// private mutex: `None` once the handle is closed.
#[derive(Debug)]
pub struct ClientHandle {
    /// Unique identifier for this client
    id: ClientId,
    /// Display name
    username: String,
    /// Room → client frame queue, taken on close
    outbound: Mutex<Option<mpsc::Sender<Frame>>>,
    /// Raised once on close so the read pump stops
    closed: watch::Sender<bool>,
}

impl ClientHandle {
    /// Create a client together with the receiving end of its outbound queue
    pub fn new(
        id: ClientId,
        username: impl Into<String>,
        capacity: usize,
    ) -> (Self, mpsc::Receiver<Frame>) {
        let (tx, rx) = mpsc::channel(capacity);
        let (closed, _) = watch::channel(false);
        let client = Self {
            id,
            username: username.into(),
            outbound: Mutex::new(Some(tx)),
            closed,
        };
        (client, rx)
    }

    pub fn id(&self) -> ClientId {
        self.id
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    /// Queue a frame without waiting
    ///
    /// `Full` means the client is not keeping up; the caller decides
    /// whether that gets it evicted.
    pub fn offer(&self, frame: Frame) -> Result<(), OfferError> {
        let outbound = self.outbound.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(sender) = outbound.as_ref() else {
            return Err(OfferError::Closed);
        };

        sender.try_send(frame).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => OfferError::Full,
            mpsc::error::TrySendError::Closed(_) => OfferError::Closed,
        })
    }

    /// Close the client
    ///
    /// Drops the outbound sender and raises the close signal. Both pumps
    /// watch the signal and stop at once, so frames still queued are
    /// discarded and the socket is released even if the peer stopped
    /// reading. Returns `true` only for the call that actually closed the
    /// handle.
    pub fn close(&self) -> bool {
        let mut outbound = self.outbound.lock().unwrap_or_else(PoisonError::into_inner);
        if outbound.take().is_none() {
            return false;
        }
        self.closed.send_replace(true);
        true
    }

    /// Check if the client has been closed
    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    /// Subscribe to the close signal
    pub fn closed_signal(&self) -> watch::Receiver<bool> {
        self.closed.subscribe()
    }

    /// Wait until the client is closed
    ///
    /// Resolves immediately if it already is. Cancel-safe, for use in
    /// `tokio::select!`.
    pub async fn closed(&self) {
        let mut signal = self.closed.subscribe();
        loop {
            let closed = *signal.borrow_and_update();
            // The sender lives in `self`, so `changed` cannot fail here
            if closed || signal.changed().await.is_err() {
                return;
            }
        }
    }
}
