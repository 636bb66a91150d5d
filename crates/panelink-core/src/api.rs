use serde::{Deserialize, Serialize};
use std::fmt;

// ── Panel client API types ──────────────────────────────────────────────────

/// GET /api/client/servers/{id} payload.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerRecord {
    pub name: String,
    /// Display name of the node hosting the server
    pub node: String,
    pub uuid: String,
    /// Short identifier used in panel routes
    #[serde(default)]
    pub identifier: String,
}

/// GET /api/client/servers/{id}/credentials payload.
///
/// `node` is the daemon base address, `token` the daemon access key.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub node: String,
    #[serde(rename = "key")]
    pub token: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("node", &self.node)
            .field("token", &"<redacted>")
            .finish()
    }
}

/// The panel wraps resources as `{ "object": ..., "attributes": {...} }`.
/// Older endpoints return the bare object, so both shapes are accepted.
#[derive(Deserialize)]
#[serde(untagged)]
pub enum ApiEnvelope<T> {
    Wrapped { attributes: T },
    Bare(T),
}

impl<T> ApiEnvelope<T> {
    pub fn into_inner(self) -> T {
        match self {
            ApiEnvelope::Wrapped { attributes } => attributes,
            ApiEnvelope::Bare(inner) => inner,
        }
    }
}

/// Build the daemon websocket endpoint for a server: `{node}/v1/ws/{uuid}`.
pub fn socket_endpoint(credentials: &Credentials, server: &ServerRecord) -> String {
    format!(
        "{}/v1/ws/{}",
        credentials.node.trim_end_matches('/'),
        server.uuid
    )
}
