//! Error types for the chat server
//!
//! Defines infrastructure errors, client-facing chat errors,
//! credential store errors and message send errors.
//! Uses thiserror for ergonomic error definitions.

use thiserror::Error;
use tokio_util::codec::LinesCodecError;

/// Infrastructure-level errors
///
/// These end a session (or, at startup, the whole process).
/// They are never shown to other sessions.
#[derive(Debug, Error)]
pub enum AppError {
    /// IO error (fatal for the session)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Line framing error (over-long line or IO failure)
    #[error("Line codec error: {0}")]
    Lines(#[from] LinesCodecError),

    /// Configuration file could not be parsed
    #[error("Config parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Configuration parsed but is inconsistent
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// JSON serialization/deserialization error
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// Credential store failure
    #[error("Credential store error: {0}")]
    Store(#[from] StoreError),

    /// Channel send error (fatal - internal channel broken)
    #[error("Channel send error")]
    ChannelSend,

    /// A blocking store task panicked or was cancelled
    #[error("Background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Client-facing errors
///
/// Recovered locally: the `Display` text is sent to the issuing session
/// and no shared state changes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChatError {
    /// Missing or malformed command argument
    #[error("Usage: {0}")]
    Usage(&'static str),

    #[error("Unknown command.")]
    UnknownCommand,

    #[error("Room does not exist.")]
    RoomNotFound,

    #[error("Room already exists.")]
    RoomExists,

    /// Capability or room predicate denied the action
    #[error("You do not have permission to {0}.")]
    PermissionDenied(&'static str),

    #[error("You are not in a room.")]
    NotInRoom,

    /// Chat text sent outside of any room
    #[error("You are not in a room. Use /join <room> first.")]
    ChatOutsideRoom,

    #[error("You are already in room: {0}")]
    AlreadyInRoom(String),

    #[error("User not found.")]
    UserNotFound,

    #[error("No one to reply to.")]
    NoReplyTarget,

    /// Reply target has disconnected since the last whisper
    #[error("That user is no longer connected.")]
    PartnerGone,

    #[error("Insufficient privilege to change that user's permission level.")]
    InsufficientPrivilege,

    #[error("Invalid level: {0}")]
    InvalidLevel(String),

    #[error("Login failed: invalid username or password.")]
    InvalidCredentials,

    #[error("Registration failed: username already exists.")]
    DuplicateUsername,

    #[error("Username must be a single word of at most 32 characters.")]
    InvalidUsername,

    #[error("Password must not be empty.")]
    EmptyPassword,

    #[error("Invalid option. Type 'login' or 'register':")]
    InvalidOption,

    /// Credential store backend failed; the session survives
    #[error("The account service is unavailable. Try again later.")]
    Unavailable,
}

impl From<StoreError> for ChatError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::DuplicateUsername => ChatError::DuplicateUsername,
            StoreError::InvalidCredentials => ChatError::InvalidCredentials,
            StoreError::NotFound => ChatError::UserNotFound,
            StoreError::Hash(_) | StoreError::Io(_) | StoreError::Json(_) => {
                ChatError::Unavailable
            }
        }
    }
}

/// Credential store errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("username already exists")]
    DuplicateUsername,

    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("user not found")]
    NotFound,

    #[error("password hashing failed: {0}")]
    Hash(String),

    #[error("users file IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("users file format error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Message send errors
///
/// Occurs when a session's outbound queue cannot take another line.
#[derive(Debug, Error)]
pub enum SendError {
    /// The receiving end of the channel has been closed
    #[error("Channel closed")]
    ChannelClosed,

    /// The session is not draining its queue fast enough
    #[error("Channel full")]
    ChannelFull,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_error_text() {
        assert_eq!(
            ChatError::PermissionDenied("create rooms").to_string(),
            "You do not have permission to create rooms."
        );
        assert_eq!(
            ChatError::Usage("/join <roomname>").to_string(),
            "Usage: /join <roomname>"
        );
    }

    #[test]
    fn test_store_error_maps_to_chat_error() {
        assert_eq!(
            ChatError::from(StoreError::DuplicateUsername),
            ChatError::DuplicateUsername
        );
        assert_eq!(ChatError::from(StoreError::NotFound), ChatError::UserNotFound);
        assert_eq!(
            ChatError::from(StoreError::Hash("boom".into())),
            ChatError::Unavailable
        );
    }
}
