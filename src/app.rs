//! Headless host for a server session: feeds navigation from stdin into the
//! bootstrapper and prints a JSON snapshot whenever the session changes.

use anyhow::{Context, Result};
use panelink_core::api::ServerRecord;
use panelink_core::client::{
    ConnectionManager, ConnectionState, CredentialStore, HttpCredentialStore, RealtimeConnection,
    ServerSection, SessionBootstrapper, SessionUpdate, SocketStatus,
};
use serde::Serialize;
use std::sync::Arc;
use tokio::io::AsyncBufReadExt;

use crate::settings::Settings;

/// One line of stdin input.
#[derive(Debug, PartialEq, Eq)]
pub enum Command {
    /// Navigate to a path
    Navigate(String),
    /// Unmount the server view, keep reading
    Close,
    Quit,
    Empty,
}

impl Command {
    pub fn parse(line: &str) -> Self {
        match line.trim() {
            "" => Command::Empty,
            "close" => Command::Close,
            "quit" | "exit" => Command::Quit,
            path => Command::Navigate(path.to_string()),
        }
    }
}

/// What the view would render for the current session.
#[derive(Debug, Serialize)]
pub struct SessionSnapshot<'a> {
    pub server_id: Option<&'a str>,
    pub section: ServerSection,
    pub state: &'a ConnectionState,
    pub socket: &'a SocketStatus,
    pub server: Option<&'a ServerRecord>,
    pub connection_error: Option<String>,
}

impl<'a> SessionSnapshot<'a> {
    pub fn capture<S: CredentialStore, C: RealtimeConnection>(
        session: &'a SessionBootstrapper<S, C>,
    ) -> Self {
        Self {
            server_id: session.server_id().map(|id| id.as_str()),
            section: session.section(),
            state: session.state(),
            socket: session.socket_status(),
            server: session.server(),
            connection_error: session.connection_error(),
        }
    }
}

fn print_snapshot<S: CredentialStore, C: RealtimeConnection>(
    session: &SessionBootstrapper<S, C>,
) {
    match serde_json::to_string(&SessionSnapshot::capture(session)) {
        Ok(json) => println!("{}", json),
        Err(e) => log::warn!("Failed to serialize session snapshot: {}", e),
    }
}

pub async fn run(settings: Settings, initial_route: Option<String>) -> Result<()> {
    let panel_config = settings.panel_config();
    let (event_tx, event_rx) = async_channel::bounded(settings.event_buffer.max(1));
    let runtime = tokio::runtime::Handle::current();

    let store = HttpCredentialStore::new(panel_config.clone())
        .context("Invalid panel configuration")?;
    let connection = ConnectionManager::new(
        runtime.clone(),
        event_tx.clone(),
        panel_config.connect_timeout(),
    );
    let mut session = SessionBootstrapper::new(Arc::new(store), connection, runtime, event_tx);

    log::info!("Panel session host ready ({})", panel_config.panel_url);

    if let Some(route) = initial_route {
        if session.on_route_changed(&route) {
            print_snapshot(&session);
        }
    }

    let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            line = lines.next_line(), if stdin_open => {
                match line.context("Failed to read navigation input")? {
                    Some(line) => match Command::parse(&line) {
                        Command::Navigate(path) => {
                            if session.on_route_changed(&path) {
                                print_snapshot(&session);
                            }
                        }
                        Command::Close => {
                            session.teardown();
                            print_snapshot(&session);
                        }
                        Command::Quit => break,
                        Command::Empty => {}
                    },
                    // Keep following the socket after input ends
                    None => stdin_open = false,
                }
            }
            event = event_rx.recv() => {
                let Ok(event) = event else { break };
                match session.handle_event(event) {
                    SessionUpdate::Ignored => {}
                    SessionUpdate::Message(text) => println!("{}", text),
                    SessionUpdate::StateChanged | SessionUpdate::SocketChanged => {
                        print_snapshot(&session);
                    }
                }
            }
            _ = &mut ctrl_c => {
                log::info!("Interrupted, closing session");
                break;
            }
        }
    }

    session.teardown();
    Ok(())
}
