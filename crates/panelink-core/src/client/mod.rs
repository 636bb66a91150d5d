pub mod config;
pub mod connection;
pub mod route;
pub mod session;
pub mod store;
pub mod types;

pub use config::PanelConnectionConfig;
pub use connection::{ConnectionManager, RealtimeConnection};
pub use route::{ServerId, ServerRoute, ServerSection};
pub use session::{SessionBootstrapper, SessionUpdate};
pub use store::{CredentialStore, HttpCredentialStore};
pub use types::{ConnectionEvent, ConnectionState, SocketStatus};
