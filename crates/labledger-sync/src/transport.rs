//! Transport abstraction for the sync stream.
//!
//! The transport layer handles message serialization and delivery to one
//! connected client. Implementations may wrap a WebSocket, an SSE response,
//! or anything else that can carry JSON text one way and frames the other.

use async_trait::async_trait;

use crate::error::Result;
use crate::messages::{ClientFrame, ServerMessage};

/// One client connection.
///
/// `send` and `recv` are called concurrently from different tasks, so
/// implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait Transport: Send + Sync {
    /// Deliver a message to the client.
    async fn send(&self, message: ServerMessage) -> Result<()>;

    /// Wait for the next client frame.
    ///
    /// Returns `None` once the client has disconnected.
    async fn recv(&self) -> Result<Option<ClientFrame>>;

    /// Close the connection. Later sends fail.
    async fn close(&self) -> Result<()>;
}

/// A simple in-memory transport for testing.
///
/// Uses channels to simulate a connection. Server messages cross the channel
/// as JSON text, so the wire shape is exercised.
pub mod memory {
    use super::*;
    use crate::error::SyncError;
    use tokio::sync::{mpsc, Mutex};

    /// Create a connected server/client pair.
    pub fn pair(capacity: usize) -> (MemoryTransport, MemoryClient) {
        let (server_tx, client_rx) = mpsc::channel(capacity);
        let (client_tx, server_rx) = mpsc::channel(capacity);
        let transport = MemoryTransport {
            outbound: Mutex::new(Some(server_tx)),
            inbound: Mutex::new(server_rx),
        };
        let client = MemoryClient {
            inbound: client_rx,
            outbound: Some(client_tx),
        };
        (transport, client)
    }

    /// Server side of an in-memory connection.
    pub struct MemoryTransport {
        outbound: Mutex<Option<mpsc::Sender<String>>>,
        inbound: Mutex<mpsc::Receiver<ClientFrame>>,
    }

    #[async_trait]
    impl Transport for MemoryTransport {
        async fn send(&self, message: ServerMessage) -> Result<()> {
            let text = message.to_json()?;
            let sender = self.outbound.lock().await.clone().ok_or(SyncError::Closed)?;
            sender
                .send(text)
                .await
                .map_err(|_| SyncError::TransportError("client stopped reading".into()))
        }

        async fn recv(&self) -> Result<Option<ClientFrame>> {
            let mut rx = self.inbound.lock().await;
            Ok(rx.recv().await)
        }

        async fn close(&self) -> Result<()> {
            self.outbound.lock().await.take();
            Ok(())
        }
    }

    /// Client side of an in-memory connection.
    pub struct MemoryClient {
        inbound: mpsc::Receiver<String>,
        outbound: Option<mpsc::Sender<ClientFrame>>,
    }

    impl MemoryClient {
        /// Next server message, or `None` once the server closed.
        pub async fn recv(&mut self) -> Result<Option<ServerMessage>> {
            match self.inbound.recv().await {
                Some(text) => ServerMessage::from_json(&text).map(Some),
                None => Ok(None),
            }
        }

        /// Send a frame to the server.
        pub async fn send(&self, frame: ClientFrame) -> Result<()> {
            let sender = self.outbound.as_ref().ok_or(SyncError::Closed)?;
            sender
                .send(frame)
                .await
                .map_err(|_| SyncError::TransportError("server stopped reading".into()))
        }

        /// Drop the client's sending half, as a vanished peer would.
        pub fn disconnect(&mut self) {
            self.outbound = None;
        }

        /// Stop accepting server messages; later server sends fail.
        pub fn stop_reading(&mut self) {
            self.inbound.close();
        }
    }
}
