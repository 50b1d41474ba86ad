//! ChatServer Actor implementation
//!
//! The central actor that owns all shared state: the session registry, the
//! room registry and the permission table. Connection tasks talk to it over
//! an mpsc channel, so every registry mutation is applied in one place and
//! composite operations (switching rooms, disconnect cleanup) never
//! interleave with other sessions.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::client::Client;
use crate::command::{Command, CommandProcessor, Outcome};
use crate::config::ServerConfig;
use crate::error::ChatError;
use crate::message::ServerMessage;
use crate::permission::PermissionTable;
use crate::registry::{RoomRegistry, SessionRegistry};
use crate::store::CredentialStore;
use crate::types::{Identity, SessionId};

/// Channel buffer size for server commands
pub const CHANNEL_BUFFER_SIZE: usize = 256;

/// Commands sent from sessions to the ChatServer actor
#[derive(Debug)]
pub enum ServerCommand {
    /// Session finished authenticating
    Connect {
        session_id: SessionId,
        identity: Identity,
        /// Outbound line queue; the server becomes its only owner
        sender: mpsc::Sender<String>,
        /// Cancelled by the server to end the session
        closer: CancellationToken,
    },
    /// Session's stream ended
    Disconnect { session_id: SessionId },
    /// A line starting with the command prefix
    Command { session_id: SessionId, input: String },
    /// Any other line
    Chat { session_id: SessionId, text: String },
}

/// Per-connection view of the server, shared by every session task
pub struct ServerContext {
    /// Display name sent in the login confirmation
    pub chat_name: String,
    pub host_password: String,
    pub max_auth_attempts: u32,
    pub store: Arc<dyn CredentialStore>,
    /// Command channel into the ChatServer actor
    pub commands: mpsc::Sender<ServerCommand>,
    /// Cancelled on server shutdown
    pub shutdown: CancellationToken,
}

/// The main ChatServer actor
pub struct ChatServer {
    sessions: SessionRegistry,
    rooms: RoomRegistry,
    permissions: Arc<PermissionTable>,
    store: Arc<dyn CredentialStore>,
    /// Command receiver channel
    receiver: mpsc::Receiver<ServerCommand>,
    shutdown: CancellationToken,
}

impl ChatServer {
    /// Create a new ChatServer with the given command receiver and state
    pub fn new(
        receiver: mpsc::Receiver<ServerCommand>,
        permissions: Arc<PermissionTable>,
        rooms: RoomRegistry,
        store: Arc<dyn CredentialStore>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            sessions: SessionRegistry::new(),
            rooms,
            permissions,
            store,
            receiver,
            shutdown,
        }
    }

    /// Build the actor from configuration and start it
    ///
    /// Returns the context that connection handlers need.
    pub fn spawn(
        config: &ServerConfig,
        store: Arc<dyn CredentialStore>,
        shutdown: CancellationToken,
    ) -> Arc<ServerContext> {
        let (cmd_tx, cmd_rx) = mpsc::channel(CHANNEL_BUFFER_SIZE);
        let server = ChatServer::new(
            cmd_rx,
            Arc::new(config.permission_table()),
            RoomRegistry::with_rooms(config.initial_rooms()),
            Arc::clone(&store),
            shutdown.clone(),
        );
        tokio::spawn(server.run());

        Arc::new(ServerContext {
            chat_name: config.chat_name.clone(),
            host_password: config.host_password.clone(),
            max_auth_attempts: config.max_auth_attempts,
            store,
            commands: cmd_tx,
            shutdown,
        })
    }

    /// Run the ChatServer event loop
    ///
    /// Processes commands until shutdown is signalled or all senders drop.
    pub async fn run(mut self) {
        info!(
            rooms = self.rooms.len(),
            levels = self.permissions.len(),
            owner = %self.permissions.owner(),
            "ChatServer started"
        );
        if self.permissions.is_empty() {
            warn!("No permission levels configured; only the owner has any capabilities");
        }

        loop {
            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => {
                    self.close_all();
                    break;
                }
                cmd = self.receiver.recv() => match cmd {
                    Some(cmd) => self.handle_command(cmd),
                    None => break,
                },
            }
        }

        info!("ChatServer shutting down");
    }

    /// Process a single command
    pub fn handle_command(&mut self, cmd: ServerCommand) {
        match cmd {
            ServerCommand::Connect {
                session_id,
                identity,
                sender,
                closer,
            } => self.handle_connect(session_id, identity, sender, closer),
            ServerCommand::Disconnect { session_id } => self.handle_disconnect(session_id),
            ServerCommand::Command { session_id, input } => {
                self.handle_line_command(session_id, &input)
            }
            ServerCommand::Chat { session_id, text } => self.handle_chat(session_id, &text),
        }
    }

    fn processor(&mut self) -> CommandProcessor<'_> {
        CommandProcessor::new(
            &mut self.sessions,
            &mut self.rooms,
            &self.permissions,
            self.store.as_ref(),
        )
    }

    fn report(&self, session_id: SessionId, err: ChatError) {
        debug!(session = %session_id, "Command rejected: {}", err);
        self.sessions
            .send_to(session_id, &ServerMessage::from(err).to_string());
    }

    /// Handle a newly authenticated session
    fn handle_connect(
        &mut self,
        session_id: SessionId,
        identity: Identity,
        sender: mpsc::Sender<String>,
        closer: CancellationToken,
    ) {
        info!(session = %session_id, user = %identity.username, "Session registered");
        let notice = ServerMessage::JoinedChat {
            username: identity.username.clone(),
        }
        .to_string();

        self.sessions
            .insert(Client::new(session_id, identity, sender, closer));
        self.sessions.broadcast(&notice);

        debug!(
            "Total sessions: {}, Total rooms: {}",
            self.sessions.len(),
            self.rooms.len()
        );
    }

    /// Remove a session from its room and the registry
    ///
    /// Unknown IDs are ignored, which makes this safe to reach from both an
    /// explicit `/quit` and the session's own end-of-stream.
    fn handle_disconnect(&mut self, session_id: SessionId) {
        let Some(state) = self.sessions.get(session_id).map(Client::state) else {
            return;
        };

        self.processor().leave_current(session_id);

        let Some(client) = self.sessions.remove(session_id) else {
            return;
        };
        info!(
            session = %session_id,
            user = %client.username,
            ?state,
            "Session disconnected"
        );

        self.sessions.broadcast(
            &ServerMessage::LeftChat {
                username: client.username.clone(),
            }
            .to_string(),
        );
        client.close();

        debug!(
            "Total sessions: {}, Total rooms: {}",
            self.sessions.len(),
            self.rooms.len()
        );
    }

    fn handle_line_command(&mut self, session_id: SessionId, input: &str) {
        if !self.sessions.contains(session_id) {
            return;
        }

        let result = Command::parse(input).and_then(|cmd| self.processor().execute(session_id, cmd));
        match result {
            Ok(Outcome::Continue) => {}
            Ok(Outcome::Disconnect) => self.handle_disconnect(session_id),
            Err(err) => self.report(session_id, err),
        }
    }

    fn handle_chat(&mut self, session_id: SessionId, text: &str) {
        if let Err(err) = self.processor().chat(session_id, text) {
            self.report(session_id, err);
        }
    }

    /// Tell everyone the server is going away and drop every session
    fn close_all(&mut self) {
        self.sessions
            .broadcast(&ServerMessage::ShuttingDown.to_string());
        let ids: Vec<SessionId> = self.sessions.iter().map(|c| c.id).collect();
        for id in ids {
            if let Some(client) = self.sessions.remove(id) {
                client.close();
            }
        }
    }
}
