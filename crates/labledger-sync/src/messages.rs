//! Sync stream message types.
//!
//! Server to client messages are JSON objects tagged by `type`. The client
//! sends no application messages; only keepalives and close.

use serde::{Deserialize, Serialize};

use labledger_core::{Cursor, SyncEvent, SyncPage};

use crate::error::Result;

/// Stream limits and timing defaults.
pub mod limits {
    use std::time::Duration;

    /// Largest client frame accepted before the stream is closed.
    pub const MAX_CLIENT_MESSAGE_BYTES: usize = 4096;
    /// Time between polls of the sync log.
    pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);
}

/// Messages pushed to a connected device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServerMessage {
    /// First message after the stream opens; echoes the starting cursor.
    Connected { cursor: Cursor },

    /// New events, in cursor order. `cursor` is the new watermark.
    Events {
        cursor: Cursor,
        events: Vec<SyncEvent>,
    },

    /// Nothing new since `cursor`.
    Heartbeat { cursor: Cursor },

    /// A pull failed. The stream stays open.
    Error { error: String },
}

impl ServerMessage {
    /// Turn a pull result into the message that reports it.
    pub fn from_page(page: SyncPage) -> Self {
        if page.events.is_empty() {
            ServerMessage::Heartbeat {
                cursor: page.cursor,
            }
        } else {
            ServerMessage::Events {
                cursor: page.cursor,
                events: page.events,
            }
        }
    }

    /// The watermark this message carries, if any.
    pub fn cursor(&self) -> Option<Cursor> {
        match self {
            ServerMessage::Connected { cursor }
            | ServerMessage::Events { cursor, .. }
            | ServerMessage::Heartbeat { cursor } => Some(*cursor),
            ServerMessage::Error { .. } => None,
        }
    }

    /// Number of events carried.
    pub fn event_count(&self) -> usize {
        match self {
            ServerMessage::Events { events, .. } => events.len(),
            _ => 0,
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }
}

/// A frame received from the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientFrame {
    Text(String),
    Binary(Vec<u8>),
    Ping(Vec<u8>),
    Pong(Vec<u8>),
    Close,
}

impl ClientFrame {
    /// Payload size in bytes.
    pub fn len(&self) -> usize {
        match self {
            ClientFrame::Text(text) => text.len(),
            ClientFrame::Binary(data) | ClientFrame::Ping(data) | ClientFrame::Pong(data) => {
                data.len()
            }
            ClientFrame::Close => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
