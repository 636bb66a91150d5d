use crate::client::types::ConnectionEvent;
use crate::error::ConnectionError;

use std::time::Duration;
use tokio_tungstenite::tungstenite;
use url::Url;

/// The realtime side of a session, as seen by the bootstrapper.
///
/// `connect` never reports failure directly; transport problems arrive later
/// as `ConnectionEvent::SocketFailed` on the event channel.
pub trait RealtimeConnection: Send + 'static {
    /// Open a connection to `endpoint` authenticated with `token`,
    /// closing any connection that is already live.
    fn connect(&mut self, endpoint: &str, token: &str);
    /// Close the live connection. Returns `false` when there was none.
    fn disconnect(&mut self) -> bool;
    /// Id of the live connection, used to drop events from closed sockets.
    fn live_socket(&self) -> Option<u64>;
}

struct LiveSocket {
    id: u64,
    endpoint: String,
    abort_handle: tokio::task::AbortHandle,
}

/// Owns zero or one daemon websocket.
pub struct ConnectionManager {
    runtime: tokio::runtime::Handle,
    event_tx: async_channel::Sender<ConnectionEvent>,
    connect_timeout: Duration,
    next_socket_id: u64,
    live: Option<LiveSocket>,
}

impl ConnectionManager {
    pub fn new(
        runtime: tokio::runtime::Handle,
        event_tx: async_channel::Sender<ConnectionEvent>,
        connect_timeout: Duration,
    ) -> Self {
        Self {
            runtime,
            event_tx,
            connect_timeout,
            next_socket_id: 1,
            live: None,
        }
    }

    /// Endpoint of the live connection (without credentials).
    #[cfg(test)]
    pub fn endpoint(&self) -> Option<&str> {
        self.live.as_ref().map(|live| live.endpoint.as_str())
    }

    /// Run one websocket until it closes. Returns Ok(()) when the daemon
    /// closes the stream, Err on handshake or transport failure.
    async fn run_socket(
        socket_id: u64,
        url: Url,
        connect_timeout: Duration,
        event_tx: &async_channel::Sender<ConnectionEvent>,
    ) -> Result<(), ConnectionError> {
        let (ws_stream, _response) =
            tokio::time::timeout(connect_timeout, tokio_tungstenite::connect_async(url.as_str()))
                .await
                .map_err(|_| ConnectionError::Timeout(connect_timeout.as_secs()))?
                .map_err(|e| ConnectionError::Handshake(e.to_string()))?;

        let _ = event_tx
            .send(ConnectionEvent::SocketOpened { socket_id })
            .await;

        let (_ws_write, mut ws_read) = futures::StreamExt::split(ws_stream);

        loop {
            match futures::StreamExt::next(&mut ws_read).await {
                Some(Ok(tungstenite::Message::Text(text))) => {
                    let _ = event_tx
                        .send(ConnectionEvent::SocketMessage {
                            socket_id,
                            text: text.to_string(),
                        })
                        .await;
                }
                Some(Ok(tungstenite::Message::Binary(data))) => {
                    log::trace!("Ignoring binary frame ({} bytes)", data.len());
                }
                Some(Ok(tungstenite::Message::Ping(_)))
                | Some(Ok(tungstenite::Message::Pong(_)))
                | Some(Ok(tungstenite::Message::Frame(_))) => {}
                Some(Ok(tungstenite::Message::Close(_))) | None => return Ok(()),
                Some(Err(e)) => return Err(ConnectionError::Transport(e.to_string())),
            }
        }
    }
}

/// Turn a daemon endpoint into a websocket URL carrying `token` as a query
/// credential. `http`/`https` endpoints map to `ws`/`wss`.
pub fn socket_url(endpoint: &str, token: &str) -> Result<Url, ConnectionError> {
    let invalid = |message: String| ConnectionError::InvalidEndpoint {
        endpoint: endpoint.to_string(),
        message,
    };

    let mut url = Url::parse(endpoint).map_err(|e| invalid(e.to_string()))?;
    let scheme = match url.scheme() {
        "ws" | "http" => "ws",
        "wss" | "https" => "wss",
        other => return Err(invalid(format!("unsupported scheme '{}'", other))),
    };
    url.set_scheme(scheme)
        .map_err(|_| invalid(format!("cannot switch scheme to '{}'", scheme)))?;
    url.query_pairs_mut().append_pair("token", token);
    Ok(url)
}

impl RealtimeConnection for ConnectionManager {
    fn connect(&mut self, endpoint: &str, token: &str) {
        if self.disconnect() {
            log::debug!("Closed previous daemon socket before connecting to {}", endpoint);
        }

        let socket_id = self.next_socket_id;
        self.next_socket_id += 1;

        let event_tx = self.event_tx.clone();
        let connect_timeout = self.connect_timeout;
        let url = socket_url(endpoint, token);

        log::info!("Connecting to daemon at {} (socket {})", endpoint, socket_id);

        let task = self.runtime.spawn(async move {
            let outcome = match url {
                Ok(url) => Self::run_socket(socket_id, url, connect_timeout, &event_tx).await,
                Err(e) => Err(e),
            };
            let event = match outcome {
                Ok(()) => {
                    log::info!("Daemon closed socket {}", socket_id);
                    ConnectionEvent::SocketClosed { socket_id }
                }
                Err(e) => {
                    log::warn!("Daemon socket {} failed: {}", socket_id, e);
                    ConnectionEvent::SocketFailed {
                        socket_id,
                        message: e.to_string(),
                    }
                }
            };
            let _ = event_tx.send(event).await;
        });

        self.live = Some(LiveSocket {
            id: socket_id,
            endpoint: endpoint.to_string(),
            abort_handle: task.abort_handle(),
        });
    }

    fn disconnect(&mut self) -> bool {
        match self.live.take() {
            Some(live) => {
                live.abort_handle.abort();
                log::info!("Disconnected daemon socket {} ({})", live.id, live.endpoint);
                true
            }
            None => false,
        }
    }

    fn live_socket(&self) -> Option<u64> {
        self.live.as_ref().map(|live| live.id)
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.disconnect();
    }
}
