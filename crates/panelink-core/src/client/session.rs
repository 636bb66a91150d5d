use crate::api::{socket_endpoint, ServerRecord};
use crate::client::connection::RealtimeConnection;
use crate::client::route::{ServerId, ServerRoute, ServerSection};
use crate::client::store::CredentialStore;
use crate::client::types::{ConnectionEvent, ConnectionState, SocketStatus};

use std::sync::Arc;

/// What applying a `ConnectionEvent` changed.
#[derive(Debug, PartialEq, Eq)]
pub enum SessionUpdate {
    /// Event belonged to a superseded bootstrap or a closed socket
    Ignored,
    /// `state()` changed
    StateChanged,
    /// `socket_status()` changed
    SocketChanged,
    /// Text frame from the live socket
    Message(String),
}

/// Takes a server identifier to a loaded record and a live daemon socket,
/// and keeps that socket in step with navigation.
///
/// Fetches run on the tokio runtime and report back through the event
/// channel; the owner drains it and calls [`handle_event`](Self::handle_event).
/// Every bootstrap is tagged with a generation so results for an identifier
/// that has since been navigated away from are dropped.
pub struct SessionBootstrapper<S: CredentialStore, C: RealtimeConnection> {
    store: Arc<S>,
    connection: C,
    runtime: tokio::runtime::Handle,
    event_tx: async_channel::Sender<ConnectionEvent>,
    state: ConnectionState,
    socket_status: SocketStatus,
    server_id: Option<ServerId>,
    section: ServerSection,
    server: Option<ServerRecord>,
    generation: u64,
    fetch_abort_handle: Option<tokio::task::AbortHandle>,
}

impl<S: CredentialStore, C: RealtimeConnection> SessionBootstrapper<S, C> {
    pub fn new(
        store: Arc<S>,
        connection: C,
        runtime: tokio::runtime::Handle,
        event_tx: async_channel::Sender<ConnectionEvent>,
    ) -> Self {
        Self {
            store,
            connection,
            runtime,
            event_tx,
            state: ConnectionState::Idle,
            socket_status: SocketStatus::Idle,
            server_id: None,
            section: ServerSection::default(),
            server: None,
            generation: 0,
            fetch_abort_handle: None,
        }
    }

    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    pub fn is_loading(&self) -> bool {
        self.state == ConnectionState::Loading
    }

    pub fn socket_status(&self) -> &SocketStatus {
        &self.socket_status
    }

    pub fn server_id(&self) -> Option<&ServerId> {
        self.server_id.as_ref()
    }

    pub fn section(&self) -> ServerSection {
        self.section
    }

    /// Record loaded by the last successful bootstrap.
    pub fn server(&self) -> Option<&ServerRecord> {
        self.server.as_ref()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn connection(&self) -> &C {
        &self.connection
    }

    /// Banner text for a failed daemon socket.
    pub fn connection_error(&self) -> Option<String> {
        match &self.socket_status {
            SocketStatus::Failed(message) => Some(format!(
                "There was an error while attempting to connect to the Daemon websocket. Error reported was: \"{}\"",
                message
            )),
            _ => None,
        }
    }

    /// Start loading `id`: fetch the server record and credentials
    /// concurrently, then connect once both are in.
    pub fn bootstrap(&mut self, id: ServerId) {
        self.abort_fetch();
        self.generation += 1;
        let generation = self.generation;

        log::info!("Loading server {} (generation {})", id, generation);
        self.state = ConnectionState::Loading;
        self.server_id = Some(id.clone());

        let store = self.store.clone();
        let event_tx = self.event_tx.clone();
        let task = self.runtime.spawn(async move {
            let result = tokio::try_join!(store.get_server(&id), store.get_credentials(&id));
            let _ = event_tx
                .send(ConnectionEvent::DataLoaded { generation, result })
                .await;
        });
        self.fetch_abort_handle = Some(task.abort_handle());
    }

    /// React to the observed route identifier. Returns `false` when it is the
    /// server already loaded; otherwise tears the old connection down and
    /// bootstraps the new identifier.
    pub fn on_identifier_changed(&mut self, id: ServerId) -> bool {
        if self.server_id.as_ref() == Some(&id) {
            log::debug!("Server {} already loaded, not reconnecting", id);
            return false;
        }

        self.abort_fetch();
        // Old socket must be gone before the new one is requested
        self.connection.disconnect();
        self.server = None;
        self.socket_status = SocketStatus::Idle;
        self.bootstrap(id);
        true
    }

    /// Feed a navigation path. Paths outside a server view and sub-page
    /// changes within the current server do not reconnect.
    pub fn on_route_changed(&mut self, path: &str) -> bool {
        let Some(route) = ServerRoute::parse(path) else {
            log::debug!("Ignoring non-server route {}", path);
            return false;
        };
        self.section = route.section;
        self.on_identifier_changed(route.server_id)
    }

    /// Close everything. Safe to call repeatedly.
    pub fn teardown(&mut self) {
        self.abort_fetch();
        // Invalidate any fetch result already queued on the channel
        self.generation += 1;
        self.connection.disconnect();
        self.state = ConnectionState::Idle;
        self.socket_status = SocketStatus::Idle;
        self.server_id = None;
        self.server = None;
    }

    /// Apply an event from the channel this session was created with.
    pub fn handle_event(&mut self, event: ConnectionEvent) -> SessionUpdate {
        if let Some(socket_id) = event.socket_id() {
            if self.connection.live_socket() != Some(socket_id) {
                log::debug!("Dropping event for closed socket {}", socket_id);
                return SessionUpdate::Ignored;
            }
        }

        match event {
            ConnectionEvent::DataLoaded { generation, result } => {
                if generation != self.generation || !self.is_loading() {
                    log::debug!(
                        "Discarding stale server data (generation {}, current {})",
                        generation,
                        self.generation
                    );
                    return SessionUpdate::Ignored;
                }
                self.fetch_abort_handle = None;

                match result {
                    Ok((server, credentials)) => {
                        let endpoint = socket_endpoint(&credentials, &server);
                        self.connection.connect(&endpoint, &credentials.token);
                        log::info!("Loaded server {} ({})", server.name, server.uuid);
                        self.server = Some(server);
                        self.socket_status = SocketStatus::Connecting;
                        self.state = ConnectionState::Connected;
                    }
                    Err(e) => {
                        let id = self
                            .server_id
                            .as_ref()
                            .map(ServerId::as_str)
                            .unwrap_or_default();
                        log::error!("There was an error loading server {}: {}", id, e);
                        self.state = ConnectionState::Error(e.to_string());
                    }
                }
                SessionUpdate::StateChanged
            }
            ConnectionEvent::SocketOpened { .. } => {
                self.socket_status = SocketStatus::Open;
                SessionUpdate::SocketChanged
            }
            ConnectionEvent::SocketMessage { text, .. } => {
                log::trace!("Daemon message: {}", text);
                SessionUpdate::Message(text)
            }
            ConnectionEvent::SocketFailed { message, .. } => {
                self.socket_status = SocketStatus::Failed(message);
                SessionUpdate::SocketChanged
            }
            ConnectionEvent::SocketClosed { .. } => {
                self.socket_status = SocketStatus::Closed;
                SessionUpdate::SocketChanged
            }
        }
    }

    fn abort_fetch(&mut self) {
        if let Some(handle) = self.fetch_abort_handle.take() {
            handle.abort();
        }
    }
}

impl<S: CredentialStore, C: RealtimeConnection> Drop for SessionBootstrapper<S, C> {
    fn drop(&mut self) {
        self.abort_fetch();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::Credentials;
    use crate::error::FetchError;
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use std::time::Duration;
    use tokio::sync::{Barrier, Notify};

    #[derive(Default)]
    struct FakeStore {
        servers: HashMap<String, Result<ServerRecord, FetchError>>,
        credentials: HashMap<String, Result<Credentials, FetchError>>,
        /// Server lookups for these ids wait until notified
        gates: HashMap<String, Arc<Notify>>,
        /// When set, each lookup waits for the other one to start
        rendezvous: Option<Arc<Barrier>>,
    }

    impl FakeStore {
        fn with_server(mut self, uuid: &str, node: &str, token: &str) -> Self {
            self.servers.insert(
                uuid.to_string(),
                Ok(ServerRecord {
                    name: "Box".to_string(),
                    node: "Node 1".to_string(),
                    uuid: uuid.to_string(),
                    identifier: uuid.to_string(),
                }),
            );
            self.credentials.insert(
                uuid.to_string(),
                Ok(Credentials {
                    node: node.to_string(),
                    token: token.to_string(),
                }),
            );
            self
        }

        fn gated(mut self, uuid: &str) -> (Self, Arc<Notify>) {
            let gate = Arc::new(Notify::new());
            self.gates.insert(uuid.to_string(), gate.clone());
            (self, gate)
        }

        fn rendezvous(mut self) -> Self {
            self.rendezvous = Some(Arc::new(Barrier::new(2)));
            self
        }
    }

    impl CredentialStore for FakeStore {
        async fn get_server(&self, id: &ServerId) -> Result<ServerRecord, FetchError> {
            if let Some(barrier) = &self.rendezvous {
                barrier.wait().await;
            }
            if let Some(gate) = self.gates.get(id.as_str()) {
                gate.notified().await;
            }
            self.servers
                .get(id.as_str())
                .cloned()
                .unwrap_or_else(|| {
                    Err(FetchError::NotFound {
                        url: format!("/api/client/servers/{}", id),
                    })
                })
        }

        async fn get_credentials(&self, id: &ServerId) -> Result<Credentials, FetchError> {
            if let Some(barrier) = &self.rendezvous {
                barrier.wait().await;
            }
            self.credentials
                .get(id.as_str())
                .cloned()
                .unwrap_or_else(|| {
                    Err(FetchError::Unauthorized {
                        url: format!("/api/client/servers/{}/credentials", id),
                    })
                })
        }
    }

    #[derive(Clone, Debug, PartialEq, Eq)]
    enum Call {
        Connect { endpoint: String, token: String },
        Disconnect,
    }

    /// Records calls; a disconnect only counts as an effect when a
    /// connection was live.
    #[derive(Default)]
    struct RecordingConnection {
        calls: Arc<Mutex<Vec<Call>>>,
        closed: Arc<Mutex<u32>>,
        live: Option<u64>,
        next_id: u64,
    }

    impl RealtimeConnection for RecordingConnection {
        fn connect(&mut self, endpoint: &str, token: &str) {
            if self.live.take().is_some() {
                *self.closed.lock() += 1;
            }
            self.next_id += 1;
            self.live = Some(self.next_id);
            self.calls.lock().push(Call::Connect {
                endpoint: endpoint.to_string(),
                token: token.to_string(),
            });
        }

        fn disconnect(&mut self) -> bool {
            self.calls.lock().push(Call::Disconnect);
            if self.live.take().is_some() {
                *self.closed.lock() += 1;
                true
            } else {
                false
            }
        }

        fn live_socket(&self) -> Option<u64> {
            self.live
        }
    }

    struct Harness {
        session: SessionBootstrapper<FakeStore, RecordingConnection>,
        rx: async_channel::Receiver<ConnectionEvent>,
        calls: Arc<Mutex<Vec<Call>>>,
        closed: Arc<Mutex<u32>>,
    }

    impl Harness {
        fn new(store: FakeStore) -> Self {
            let connection = RecordingConnection::default();
            let calls = connection.calls.clone();
            let closed = connection.closed.clone();
            let (tx, rx) = async_channel::bounded(16);
            let session = SessionBootstrapper::new(
                Arc::new(store),
                connection,
                tokio::runtime::Handle::current(),
                tx,
            );
            Self {
                session,
                rx,
                calls,
                closed,
            }
        }

        async fn pump(&mut self) -> SessionUpdate {
            let event = tokio::time::timeout(Duration::from_secs(5), self.rx.recv())
                .await
                .expect("timed out waiting for session event")
                .expect("event channel closed");
            self.session.handle_event(event)
        }

        fn calls(&self) -> Vec<Call> {
            self.calls.lock().clone()
        }

        fn connects(&self) -> usize {
            self.calls()
                .iter()
                .filter(|c| matches!(c, Call::Connect { .. }))
                .count()
        }
    }

    fn id(s: &str) -> ServerId {
        ServerId::new(s).unwrap()
    }

    #[tokio::test]
    async fn successful_bootstrap_connects_once() {
        let mut h = Harness::new(FakeStore::default().with_server("a1", "wss://node1", "tok1"));

        h.session.bootstrap(id("a1"));
        assert_eq!(h.session.state(), &ConnectionState::Loading);

        assert_eq!(h.pump().await, SessionUpdate::StateChanged);
        assert_eq!(h.session.state(), &ConnectionState::Connected);
        assert_eq!(h.session.socket_status(), &SocketStatus::Connecting);
        assert_eq!(h.session.server().unwrap().name, "Box");
        assert_eq!(
            h.calls(),
            vec![Call::Connect {
                endpoint: "wss://node1/v1/ws/a1".to_string(),
                token: "tok1".to_string(),
            }]
        );
    }

    #[tokio::test]
    async fn missing_server_record_errors_without_connecting() {
        let mut store = FakeStore::default().with_server("a1", "wss://node1", "tok1");
        store.servers.remove("a1");
        let mut h = Harness::new(store);

        h.session.bootstrap(id("a1"));
        h.pump().await;

        assert!(matches!(h.session.state(), ConnectionState::Error(msg) if msg.contains("not found")));
        assert_eq!(h.connects(), 0);
        assert!(h.session.server().is_none());
    }

    #[tokio::test]
    async fn missing_credentials_errors_without_connecting() {
        let mut store = FakeStore::default().with_server("a1", "wss://node1", "tok1");
        store.credentials.remove("a1");
        let mut h = Harness::new(store);

        h.session.bootstrap(id("a1"));
        h.pump().await;

        assert!(matches!(h.session.state(), ConnectionState::Error(msg) if msg.contains("not authorized")));
        assert_eq!(h.connects(), 0);
    }

    #[tokio::test]
    async fn fetches_run_concurrently() {
        // Neither lookup can finish until both have started
        let store = FakeStore::default()
            .with_server("a1", "wss://node1", "tok1")
            .rendezvous();
        let mut h = Harness::new(store);

        h.session.bootstrap(id("a1"));
        assert_eq!(h.pump().await, SessionUpdate::StateChanged);

        assert_eq!(h.session.state(), &ConnectionState::Connected);
        assert_eq!(h.connects(), 1);
    }

    #[tokio::test]
    async fn both_lookups_failing_reports_one_error() {
        let mut h = Harness::new(FakeStore::default().rendezvous());

        h.session.bootstrap(id("a1"));
        assert_eq!(h.pump().await, SessionUpdate::StateChanged);

        assert!(matches!(h.session.state(), ConnectionState::Error(_)));
        assert_eq!(h.connects(), 0);
        assert!(h.calls().is_empty());
        assert!(h.session.server().is_none());

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(h.rx.try_recv().is_err());
        assert!(matches!(h.session.state(), ConnectionState::Error(_)));
    }

    #[tokio::test]
    async fn failed_bootstrap_leaves_prior_connection_alone() {
        let mut h = Harness::new(FakeStore::default().with_server("a1", "wss://node1", "tok1"));
        h.session.bootstrap(id("a1"));
        h.pump().await;
        let live = h.session.connection().live_socket();

        // Re-bootstrap an unknown id directly: no disconnect, no connect
        h.session.bootstrap(id("zz"));
        h.pump().await;

        assert!(matches!(h.session.state(), ConnectionState::Error(_)));
        assert_eq!(h.connects(), 1);
        assert_eq!(h.session.connection().live_socket(), live);
        assert!(!h.calls().contains(&Call::Disconnect));
    }

    #[tokio::test]
    async fn same_identifier_is_a_no_op() {
        let mut h = Harness::new(FakeStore::default().with_server("a1", "wss://node1", "tok1"));
        assert!(h.session.on_identifier_changed(id("a1")));
        h.pump().await;
        let before = h.calls();

        assert!(!h.session.on_identifier_changed(id("a1")));
        assert_eq!(h.calls(), before);
        assert_eq!(h.session.state(), &ConnectionState::Connected);
    }

    #[tokio::test]
    async fn sub_page_navigation_does_not_reconnect() {
        let mut h = Harness::new(FakeStore::default().with_server("a1", "wss://node1", "tok1"));
        assert!(h.session.on_route_changed("/server/a1"));
        h.pump().await;
        let before = h.calls();

        assert!(!h.session.on_route_changed("/server/a1/files"));
        assert!(!h.session.on_route_changed("/account"));
        assert_eq!(h.calls(), before);
        assert_eq!(h.session.section(), ServerSection::Files);
    }

    #[tokio::test]
    async fn identifier_change_disconnects_then_connects() {
        let mut h = Harness::new(
            FakeStore::default()
                .with_server("a1", "wss://node1", "tok1")
                .with_server("b2", "wss://node2", "tok2"),
        );

        h.session.on_identifier_changed(id("a1"));
        h.pump().await;
        assert_eq!(h.session.state(), &ConnectionState::Connected);

        assert!(h.session.on_identifier_changed(id("b2")));
        assert_eq!(h.session.state(), &ConnectionState::Loading);
        assert!(h.session.server().is_none());
        h.pump().await;

        let calls = h.calls();
        // First navigation also issues a (no-op) disconnect
        assert_eq!(
            &calls[1..],
            &[
                Call::Connect {
                    endpoint: "wss://node1/v1/ws/a1".to_string(),
                    token: "tok1".to_string(),
                },
                Call::Disconnect,
                Call::Connect {
                    endpoint: "wss://node2/v1/ws/b2".to_string(),
                    token: "tok2".to_string(),
                },
            ]
        );
        assert_eq!(h.session.server().unwrap().uuid, "b2");
        assert_eq!(h.session.state(), &ConnectionState::Connected);
    }

    #[tokio::test]
    async fn teardown_is_idempotent() {
        let mut h = Harness::new(FakeStore::default().with_server("a1", "wss://node1", "tok1"));
        h.session.bootstrap(id("a1"));
        h.pump().await;

        h.session.teardown();
        h.session.teardown();

        assert_eq!(*h.closed.lock(), 1);
        assert_eq!(h.session.state(), &ConnectionState::Idle);
        assert_eq!(h.session.server_id(), None);
        assert_eq!(h.session.connection().live_socket(), None);
    }

    #[tokio::test]
    async fn superseded_fetch_never_connects() {
        let (store, gate) = FakeStore::default()
            .with_server("a1", "wss://node1", "tok1")
            .with_server("b2", "wss://node2", "tok2")
            .gated("a1");
        let mut h = Harness::new(store);

        h.session.on_identifier_changed(id("a1"));
        let stale_generation = h.session.generation();
        h.session.on_identifier_changed(id("b2"));
        gate.notify_one();

        h.pump().await;
        assert_eq!(h.session.server().unwrap().uuid, "b2");

        // A result for the old generation that slipped through is dropped
        let stale = ConnectionEvent::DataLoaded {
            generation: stale_generation,
            result: Ok((
                ServerRecord {
                    name: "Old".to_string(),
                    node: "Node 1".to_string(),
                    uuid: "a1".to_string(),
                    identifier: "a1".to_string(),
                },
                Credentials {
                    node: "wss://node1".to_string(),
                    token: "tok1".to_string(),
                },
            )),
        };
        assert_eq!(h.session.handle_event(stale), SessionUpdate::Ignored);

        let connects: Vec<_> = h
            .calls()
            .into_iter()
            .filter(|c| matches!(c, Call::Connect { .. }))
            .collect();
        assert_eq!(
            connects,
            vec![Call::Connect {
                endpoint: "wss://node2/v1/ws/b2".to_string(),
                token: "tok2".to_string(),
            }]
        );
    }

    #[tokio::test]
    async fn result_after_teardown_is_dropped() {
        let (store, gate) = FakeStore::default()
            .with_server("a1", "wss://node1", "tok1")
            .gated("a1");
        let mut h = Harness::new(store);

        h.session.bootstrap(id("a1"));
        let generation = h.session.generation();
        h.session.teardown();
        gate.notify_one();

        let late = ConnectionEvent::DataLoaded {
            generation,
            result: Err(FetchError::InvalidUrl("late".to_string())),
        };
        assert_eq!(h.session.handle_event(late), SessionUpdate::Ignored);
        assert_eq!(h.session.state(), &ConnectionState::Idle);
        assert_eq!(h.connects(), 0);
    }

    #[tokio::test]
    async fn socket_failure_keeps_session_data() {
        let mut h = Harness::new(FakeStore::default().with_server("a1", "wss://node1", "tok1"));
        h.session.bootstrap(id("a1"));
        h.pump().await;
        let socket_id = h.session.connection().live_socket().unwrap();

        let update = h.session.handle_event(ConnectionEvent::SocketOpened { socket_id });
        assert_eq!(update, SessionUpdate::SocketChanged);
        assert_eq!(h.session.socket_status(), &SocketStatus::Open);
        assert_eq!(h.session.connection_error(), None);

        h.session.handle_event(ConnectionEvent::SocketFailed {
            socket_id,
            message: "connection reset".to_string(),
        });
        assert_eq!(h.session.state(), &ConnectionState::Connected);
        assert!(h.session.server().is_some());
        assert_eq!(
            h.session.connection_error().as_deref(),
            Some("There was an error while attempting to connect to the Daemon websocket. Error reported was: \"connection reset\"")
        );
    }

    #[tokio::test]
    async fn events_from_closed_sockets_are_ignored() {
        let mut h = Harness::new(FakeStore::default().with_server("a1", "wss://node1", "tok1"));
        h.session.bootstrap(id("a1"));
        h.pump().await;
        let socket_id = h.session.connection().live_socket().unwrap();

        let update = h.session.handle_event(ConnectionEvent::SocketFailed {
            socket_id: socket_id + 100,
            message: "old socket".to_string(),
        });
        assert_eq!(update, SessionUpdate::Ignored);
        assert_eq!(h.session.socket_status(), &SocketStatus::Connecting);

        let update = h.session.handle_event(ConnectionEvent::SocketMessage {
            socket_id,
            text: "status running".to_string(),
        });
        assert_eq!(update, SessionUpdate::Message("status running".to_string()));
    }

    #[tokio::test]
    async fn scenario_switch_servers_before_teardown() {
        let mut h = Harness::new(
            FakeStore::default()
                .with_server("a1", "wss://node1", "tok1")
                .with_server("b2", "wss://node2", "tok2"),
        );

        h.session.on_route_changed("/server/a1");
        h.pump().await;
        assert_eq!(h.session.state(), &ConnectionState::Connected);
        let after_first = h.calls().len();

        h.session.on_route_changed("/server/b2/console");
        h.pump().await;
        assert_eq!(
            &h.calls()[after_first..],
            &[
                Call::Disconnect,
                Call::Connect {
                    endpoint: "wss://node2/v1/ws/b2".to_string(),
                    token: "tok2".to_string(),
                },
            ]
        );

        h.session.teardown();
        assert_eq!(*h.closed.lock(), 2);
    }
}
