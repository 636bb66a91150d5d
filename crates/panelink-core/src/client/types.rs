use crate::api::{Credentials, ServerRecord};
use crate::error::FetchError;
use serde::{Deserialize, Serialize};

/// Bootstrap status of a server session.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    /// No session has been started, or it was torn down
    #[default]
    Idle,
    /// Server record and credentials are being fetched
    Loading,
    /// Data loaded and the realtime connection requested
    Connected,
    /// Data fetch failed
    Error(String),
}

/// Status of the realtime daemon socket.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SocketStatus {
    #[default]
    Idle,
    /// Handshake in progress
    Connecting,
    Open,
    /// Daemon closed the socket
    Closed,
    /// Handshake or transport failure
    Failed(String),
}

/// Results sent from tokio tasks back to the session owner.
#[derive(Debug)]
pub enum ConnectionEvent {
    /// Concurrent server + credential fetch finished for a bootstrap attempt
    DataLoaded {
        generation: u64,
        result: Result<(ServerRecord, Credentials), FetchError>,
    },
    /// Websocket handshake completed
    SocketOpened { socket_id: u64 },
    /// Text frame from the daemon, passed through undecoded
    SocketMessage { socket_id: u64, text: String },
    /// Handshake or transport failure
    SocketFailed { socket_id: u64, message: String },
    /// Daemon closed the socket cleanly
    SocketClosed { socket_id: u64 },
}

impl ConnectionEvent {
    /// Socket the event belongs to, `None` for fetch results.
    pub fn socket_id(&self) -> Option<u64> {
        match self {
            ConnectionEvent::DataLoaded { .. } => None,
            ConnectionEvent::SocketOpened { socket_id }
            | ConnectionEvent::SocketMessage { socket_id, .. }
            | ConnectionEvent::SocketFailed { socket_id, .. }
            | ConnectionEvent::SocketClosed { socket_id } => Some(*socket_id),
        }
    }
}
