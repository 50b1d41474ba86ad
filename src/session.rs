//! Per-connection session
//!
//! Drives one client through the handshake (host password, then login or
//! registration) and then forwards every line to the ChatServer actor until
//! the stream ends, the server closes the session, or shutdown begins.
//!
//! ```text
//! Unauthenticated -> Authenticating -> Authenticated <-> InRoom
//!        \                 \                 \             \
//!         +-----------------+-----------------+-------------+--> Disconnected
//! ```
//!
//! `InRoom` is tracked by the server, which owns room membership; see
//! `Client::state`. The session itself only moves as far as `Authenticated`.

use std::sync::Arc;

use futures_util::StreamExt;
use tokio::io::AsyncRead;
use tokio::sync::mpsc;
use tokio_util::codec::{FramedRead, LinesCodec};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::command::COMMAND_PREFIX;
use crate::error::{AppError, ChatError, StoreError};
use crate::message::ServerMessage;
use crate::server::{ServerCommand, ServerContext};
use crate::types::{Identity, SessionId};

/// Longest accepted inbound line, in bytes
pub const MAX_LINE_LENGTH: usize = 4096;

/// Longest accepted username, in characters
pub const MAX_USERNAME_LENGTH: usize = 32;

/// Lifecycle of a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unauthenticated,
    Authenticating,
    Authenticated,
    InRoom,
    Disconnected,
}

/// Result of one login or register branch
enum AuthAttempt {
    Success(Identity),
    Failed(ChatError),
    /// Stream ended mid-branch
    Closed,
}

/// Server-side state for one connection
pub struct Session<R> {
    id: SessionId,
    state: SessionState,
    identity: Option<Identity>,
    lines: FramedRead<R, LinesCodec>,
    /// Outbound queue, held only until it is handed to the server
    outbound: Option<mpsc::Sender<String>>,
    /// Cancelled on shutdown or when the server ends this session
    closer: CancellationToken,
    ctx: Arc<ServerContext>,
}

impl<R: AsyncRead + Unpin> Session<R> {
    pub fn new(reader: R, outbound: mpsc::Sender<String>, ctx: Arc<ServerContext>) -> Self {
        Self {
            id: SessionId::new(),
            state: SessionState::Unauthenticated,
            identity: None,
            lines: FramedRead::new(reader, LinesCodec::new_with_max_length(MAX_LINE_LENGTH)),
            outbound: Some(outbound),
            closer: ctx.shutdown.child_token(),
            ctx,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    /// Run the whole session and clean up afterwards
    pub async fn run(mut self) -> Result<(), AppError> {
        let result = match self.start().await {
            Ok(true) => self.message_loop().await,
            Ok(false) => Ok(()),
            Err(e) => Err(e),
        };
        self.disconnect().await;
        result
    }

    /// Handshake
    ///
    /// Returns true once the session is authenticated and registered with
    /// the server; false if the client was turned away or went away.
    pub async fn start(&mut self) -> Result<bool, AppError> {
        self.state = SessionState::Authenticating;

        if !self.check_host_password().await? {
            return Ok(false);
        }
        let Some(identity) = self.authenticate().await? else {
            return Ok(false);
        };

        self.send(ServerMessage::LoggedIn {
            chat_name: self.ctx.chat_name.clone(),
            username: identity.username.clone(),
        })
        .await;

        // From here on the server is the only writer
        let Some(sender) = self.outbound.take() else {
            return Ok(false);
        };
        self.ctx
            .commands
            .send(ServerCommand::Connect {
                session_id: self.id,
                identity: identity.clone(),
                sender,
                closer: self.closer.clone(),
            })
            .await
            .map_err(|_| AppError::ChannelSend)?;

        info!(session = %self.id, user = %identity.username, level = identity.level, "Logged in");
        self.identity = Some(identity);
        self.state = SessionState::Authenticated;
        Ok(true)
    }

    async fn check_host_password(&mut self) -> Result<bool, AppError> {
        self.send(ServerMessage::HostPasswordPrompt).await;
        let Some(entered) = self.read_line().await? else {
            return Ok(false);
        };

        if entered != self.ctx.host_password {
            warn!(session = %self.id, "Wrong host password");
            self.send(ServerMessage::HostPasswordRejected).await;
            return Ok(false);
        }
        Ok(true)
    }

    async fn authenticate(&mut self) -> Result<Option<Identity>, AppError> {
        self.send(ServerMessage::AuthChoicePrompt).await;
        let mut failures = 0;

        loop {
            let Some(choice) = self.read_line().await? else {
                return Ok(None);
            };

            let attempt = match choice.trim().to_ascii_lowercase().as_str() {
                "login" => self.login().await?,
                "register" => self.register().await?,
                _ => {
                    self.send(ChatError::InvalidOption).await;
                    continue;
                }
            };

            match attempt {
                AuthAttempt::Success(identity) => return Ok(Some(identity)),
                AuthAttempt::Closed => return Ok(None),
                AuthAttempt::Failed(err) => {
                    failures += 1;
                    warn!(session = %self.id, failures, "Authentication failed: {}", err);
                    self.send(err).await;

                    if failures >= self.ctx.max_auth_attempts {
                        self.send(ServerMessage::TooManyAttempts).await;
                        return Ok(None);
                    }
                    self.send(ServerMessage::AuthChoicePrompt).await;
                }
            }
        }
    }

    /// Prompt for a username and password pair
    async fn credentials(&mut self, new: bool) -> Result<Option<(String, String)>, AppError> {
        self.send(ServerMessage::UsernamePrompt { new }).await;
        let Some(username) = self.read_line().await? else {
            return Ok(None);
        };
        self.send(ServerMessage::PasswordPrompt { new }).await;
        let Some(password) = self.read_line().await? else {
            return Ok(None);
        };
        Ok(Some((username.trim().to_string(), password)))
    }

    async fn login(&mut self) -> Result<AuthAttempt, AppError> {
        let Some((username, password)) = self.credentials(false).await? else {
            return Ok(AuthAttempt::Closed);
        };

        let store = Arc::clone(&self.ctx.store);
        let result = tokio::task::spawn_blocking(move || store.login(&username, &password)).await?;
        Ok(self.attempt_from(result))
    }

    async fn register(&mut self) -> Result<AuthAttempt, AppError> {
        let Some((username, password)) = self.credentials(true).await? else {
            return Ok(AuthAttempt::Closed);
        };

        if let Err(err) = validate_username(&username) {
            return Ok(AuthAttempt::Failed(err));
        }
        if password.is_empty() {
            return Ok(AuthAttempt::Failed(ChatError::EmptyPassword));
        }

        let store = Arc::clone(&self.ctx.store);
        let result =
            tokio::task::spawn_blocking(move || store.register(&username, &password, 0)).await?;
        Ok(self.attempt_from(result))
    }

    fn attempt_from(&self, result: Result<Identity, StoreError>) -> AuthAttempt {
        match result {
            Ok(identity) => AuthAttempt::Success(identity),
            Err(err @ (StoreError::Hash(_) | StoreError::Io(_) | StoreError::Json(_))) => {
                error!(session = %self.id, "Credential store failure: {}", err);
                AuthAttempt::Failed(err.into())
            }
            Err(err) => AuthAttempt::Failed(err.into()),
        }
    }

    /// Forward lines to the server until the stream ends or is closed
    async fn message_loop(&mut self) -> Result<(), AppError> {
        while let Some(line) = self.read_line().await? {
            if line.trim().is_empty() {
                continue;
            }

            let cmd = if line.starts_with(COMMAND_PREFIX) {
                ServerCommand::Command {
                    session_id: self.id,
                    input: line,
                }
            } else {
                ServerCommand::Chat {
                    session_id: self.id,
                    text: line,
                }
            };

            self.ctx
                .commands
                .send(cmd)
                .await
                .map_err(|_| AppError::ChannelSend)?;
        }
        Ok(())
    }

    /// Next inbound line; `None` on end-of-stream or when closed
    async fn read_line(&mut self) -> Result<Option<String>, AppError> {
        tokio::select! {
            biased;
            _ = self.closer.cancelled() => Ok(None),
            next = self.lines.next() => match next {
                Some(Ok(line)) => Ok(Some(line)),
                Some(Err(e)) => Err(e.into()),
                None => Ok(None),
            },
        }
    }

    /// Write a line while this session still owns its outbound queue
    async fn send(&self, msg: impl Into<ServerMessage>) {
        if let Some(tx) = &self.outbound {
            if tx.send(msg.into().to_string()).await.is_err() {
                debug!(session = %self.id, "Writer closed before handshake finished");
            }
        }
    }

    /// Leave the server and release the outbound queue
    ///
    /// Only the first call has any effect.
    pub async fn disconnect(&mut self) {
        if self.state == SessionState::Disconnected {
            return;
        }
        let registered = self.state == SessionState::Authenticated;
        self.state = SessionState::Disconnected;
        self.outbound = None;

        if registered {
            let _ = self
                .ctx
                .commands
                .send(ServerCommand::Disconnect {
                    session_id: self.id,
                })
                .await;
        }

        let user = self
            .identity
            .as_ref()
            .map(|i| i.username.as_str())
            .unwrap_or("<unauthenticated>");
        info!(session = %self.id, user = %user, "Session ended");
    }
}

/// Usernames are single words so `/msg <user> <text>` can split them
pub fn validate_username(name: &str) -> Result<(), ChatError> {
    if name.is_empty()
        || name.chars().count() > MAX_USERNAME_LENGTH
        || name.chars().any(char::is_whitespace)
    {
        return Err(ChatError::InvalidUsername);
    }
    Ok(())
}
