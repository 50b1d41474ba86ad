//! Client struct definition
//!
//! The chat server's view of an authenticated session: identity, room,
//! reply target and the outbound line queue.

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;

use crate::error::SendError;
use crate::session::SessionState;
use crate::types::{Identity, Level, SessionId};

/// Connected, authenticated client
#[derive(Debug)]
pub struct Client {
    /// Unique identifier for this session
    pub id: SessionId,
    pub username: String,
    pub level: Level,
    /// Name of the room this session is a member of
    pub current_room: Option<String>,
    /// Whoever this session last whispered with, resolved at `/reply` time
    pub last_whisper: Option<SessionId>,
    /// Server -> client line queue
    sender: mpsc::Sender<String>,
    /// Cancelling this ends the session's read loop
    closer: CancellationToken,
}

impl Client {
    /// Create a client from an authenticated identity
    pub fn new(
        id: SessionId,
        identity: Identity,
        sender: mpsc::Sender<String>,
        closer: CancellationToken,
    ) -> Self {
        Self {
            id,
            username: identity.username,
            level: identity.level,
            current_room: None,
            last_whisper: None,
            sender,
            closer,
        }
    }

    /// Queue a line for this client without waiting
    ///
    /// A slow client whose queue is full loses the line rather than
    /// stalling the server.
    pub fn send(&self, line: impl Into<String>) -> Result<(), SendError> {
        self.sender.try_send(line.into()).map_err(|e| match e {
            TrySendError::Full(_) => SendError::ChannelFull,
            TrySendError::Closed(_) => SendError::ChannelClosed,
        })
    }

    /// Case-insensitive username match, Unicode-aware
    pub fn is_named(&self, name: &str) -> bool {
        self.username == name || self.username.to_lowercase() == name.to_lowercase()
    }

    pub fn is_in_room(&self) -> bool {
        self.current_room.is_some()
    }

    /// Session state as seen by the server
    pub fn state(&self) -> SessionState {
        if self.is_in_room() {
            SessionState::InRoom
        } else {
            SessionState::Authenticated
        }
    }

    /// Ask the session task to stop reading
    ///
    /// Queued lines are still flushed once the client is dropped.
    pub fn close(&self) {
        self.closer.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_client_creation() {
        let (tx, _rx) = mpsc::channel(32);
        let client = Client::new(SessionId::new(), Identity::new("Alice", 0), tx, CancellationToken::new());

        assert_eq!(client.username, "Alice");
        assert!(!client.is_in_room());
        assert!(client.last_whisper.is_none());
        assert_eq!(client.state(), SessionState::Authenticated);
    }

    #[test]
    fn test_state_and_close() {
        let (tx, _rx) = mpsc::channel(1);
        let closer = CancellationToken::new();
        let mut client = Client::new(SessionId::new(), Identity::new("Alice", 0), tx, closer.clone());

        client.current_room = Some("general".to_string());
        assert_eq!(client.state(), SessionState::InRoom);

        client.close();
        assert!(closer.is_cancelled());
    }

    #[tokio::test]
    async fn test_client_send() {
        let (tx, mut rx) = mpsc::channel(32);
        let client = Client::new(SessionId::new(), Identity::new("Alice", 0), tx, CancellationToken::new());

        client.send("hello").unwrap();
        assert_eq!(rx.recv().await.unwrap(), "hello");
    }

    #[tokio::test]
    async fn test_client_send_full_and_closed() {
        let (tx, rx) = mpsc::channel(1);
        let client = Client::new(SessionId::new(), Identity::new("Alice", 0), tx, CancellationToken::new());

        client.send("one").unwrap();
        assert!(matches!(client.send("two"), Err(SendError::ChannelFull)));

        drop(rx);
        assert!(matches!(client.send("three"), Err(SendError::ChannelClosed)));
    }

    #[test]
    fn test_is_named_case_insensitive() {
        let (tx, _rx) = mpsc::channel(1);
        let client = Client::new(SessionId::new(), Identity::new("Alice", 0), tx, CancellationToken::new());
        assert!(client.is_named("alice"));
        assert!(client.is_named("ALICE"));
        assert!(!client.is_named("alic"));
    }

    #[test]
    fn test_is_named_non_ascii() {
        let (tx, _rx) = mpsc::channel(1);
        let client = Client::new(SessionId::new(), Identity::new("Émile", 0), tx, CancellationToken::new());
        assert!(client.is_named("émile"));
        assert!(client.is_named("ÉMILE"));
        assert!(!client.is_named("emile"));
    }
}
