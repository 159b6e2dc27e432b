//! WebSocket connection handler
//!
//! Bridges one upgraded WebSocket to the room with two pumps: the read
//! pump turns inbound frames into published messages; the write pump
//! drains the client's outbound queue onto the socket until the client is
//! closed.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message as WsMessage, WebSocket};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::client::{ClientHandle, Frame};
use crate::error::AppError;
use crate::message::Message;
use crate::room::RoomHandle;
use crate::types::ClientId;

/// Display name used when the query string carries none
pub const ANONYMOUS: &str = "Anonymous";

/// Query parameters for WebSocket connection
#[derive(Debug, Default, Deserialize)]
pub struct ConnectQuery {
    pub username: Option<String>,
}

impl ConnectQuery {
    /// The requested display name, or "Anonymous" when absent or blank
    pub fn display_name(&self) -> String {
        match self.username.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => ANONYMOUS.to_string(),
        }
    }
}

/// How long a closed client's write pump may spend sending the close frame
pub const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

/// Handle an upgraded WebSocket
///
/// Registers a new client with the room, runs both pumps and returns once
/// the connection is finished and the client unregistered. The socket is
/// dropped on return.
pub async fn handle_socket(
    socket: WebSocket,
    room: RoomHandle,
    username: String,
    queue_capacity: usize,
) {
    let (ws_sender, ws_receiver) = socket.split();

    let (client, outbound) = ClientHandle::new(ClientId::new(), username, queue_capacity);
    let client = Arc::new(client);
    info!("Client {} ({}) connected", client.id(), client.username());

    if let Err(e) = room.register(client.clone()).await {
        error!("Failed to register client {}: {}", client.id(), e);
        return;
    }

    // Spawn write task (outbound queue -> WebSocket)
    let mut write_task = tokio::spawn(write_pump(client.clone(), outbound, ws_sender));

    if let Err(e) = read_pump(client.clone(), &room, ws_receiver).await {
        debug!("Read pump for {} ended: {}", client.id(), e);
    }

    if let Err(e) = room.unregister(client.clone()).await {
        debug!("Unregister of {} skipped: {}", client.id(), e);
    }
    client.close();

    // The write pump bounds its own shutdown; abort as a backstop
    match timeout(CLOSE_TIMEOUT * 2, &mut write_task).await {
        Ok(Err(e)) if e.is_panic() => error!("Write task for {} panicked: {}", client.id(), e),
        Ok(_) => {}
        Err(_) => {
            warn!("Write task for {} did not stop, aborting", client.id());
            write_task.abort();
        }
    }

    info!("Client {} ({}) disconnected", client.id(), client.username());
}

/// Read frames until the peer goes away or the client is closed
///
/// Every text frame becomes one message: parsed as a structured payload
/// when possible, otherwise wrapped as plain text from this client. The
/// message is published to the room, which records it and fans it out in
/// one step, so the sender gets its own echo like everyone else.
async fn read_pump(
    client: Arc<ClientHandle>,
    room: &RoomHandle,
    mut ws_receiver: SplitStream<WebSocket>,
) -> Result<(), AppError> {
    loop {
        let frame = tokio::select! {
            frame = ws_receiver.next() => frame,
            _ = client.closed() => {
                debug!("Client {} closed, ending read task", client.id());
                return Ok(());
            }
        };

        let text = match frame {
            Some(Ok(WsMessage::Text(text))) => text.as_str().to_owned(),
            Some(Ok(WsMessage::Binary(data))) => String::from_utf8_lossy(&data).into_owned(),
            Some(Ok(WsMessage::Close(_))) => {
                debug!("Client {} sent close frame", client.id());
                return Ok(());
            }
            Some(Ok(WsMessage::Ping(_) | WsMessage::Pong(_))) => {
                // Pong is handled automatically by axum
                continue;
            }
            Some(Err(e)) => return Err(e.into()),
            None => return Ok(()),
        };

        let message = decode_frame(&text, client.username());
        let frame = message.to_frame()?;
        room.publish(message, frame).await?;
    }
}

/// Write queued frames until the client is closed or the socket fails
///
/// Closing wins over pending frames: whatever is still queued is dropped,
/// and the close frame gets at most [`CLOSE_TIMEOUT`] since the peer may
/// have stopped reading.
async fn write_pump(
    client: Arc<ClientHandle>,
    mut outbound: mpsc::Receiver<Frame>,
    mut ws_sender: SplitSink<WebSocket, WsMessage>,
) {
    let drain = async {
        while let Some(frame) = outbound.recv().await {
            if let Err(e) = ws_sender.send(WsMessage::Text(frame.into())).await {
                debug!("WebSocket send to {} failed: {}", client.id(), e);
                return false;
            }
        }
        true
    };

    let socket_ok = tokio::select! {
        ok = drain => ok,
        _ = client.closed() => true,
    };
    debug!("Write task ended for {}", client.id());

    if !socket_ok {
        client.close();
        return;
    }

    // Send close frame when done
    if timeout(CLOSE_TIMEOUT, ws_sender.close()).await.is_err() {
        debug!("Close frame to {} timed out", client.id());
    }
}

/// Turn one inbound payload into a message from `sender`
pub fn decode_frame(text: &str, sender: &str) -> Message {
    Message::from_wire(text, sender).unwrap_or_else(|e| {
        warn!("Non-structured payload from {}: {}", sender, e);
        Message::chat(sender, text)
    })
}
