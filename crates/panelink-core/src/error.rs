use thiserror::Error;

/// Server record or credential lookup failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("request to {url} failed: {message}")]
    Request { url: String, message: String },

    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("not authorized to access {url}")]
    Unauthorized { url: String },

    #[error("server not found at {url}")]
    NotFound { url: String },

    #[error("invalid response from {url}: {message}")]
    Decode { url: String, message: String },

    #[error("response from {url} exceeds {limit} bytes")]
    TooLarge { url: String, limit: usize },

    #[error("invalid panel URL: {0}")]
    InvalidUrl(String),
}

impl FetchError {
    /// Map a non-success HTTP status to the matching variant.
    pub fn from_status(url: &str, status: u16) -> Self {
        let url = url.to_string();
        match status {
            401 | 403 => FetchError::Unauthorized { url },
            404 => FetchError::NotFound { url },
            _ => FetchError::Status { url, status },
        }
    }
}

/// Realtime transport failure. Reported asynchronously, never from `connect`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectionError {
    #[error("invalid websocket endpoint {endpoint}: {message}")]
    InvalidEndpoint { endpoint: String, message: String },

    #[error("websocket handshake failed: {0}")]
    Handshake(String),

    #[error("websocket handshake timed out after {0}s")]
    Timeout(u64),

    #[error("websocket error: {0}")]
    Transport(String),

    #[error("daemon closed the connection")]
    ClosedByServer,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RouteError {
    #[error("server identifier must not be empty")]
    EmptyIdentifier,
}
