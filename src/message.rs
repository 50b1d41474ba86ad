//! Outbound line protocol
//!
//! Every line the server sends is a `ServerMessage`; its `Display` output is
//! the exact text written to the socket (without the trailing newline).

use std::fmt;

use crate::error::ChatError;
use crate::types::Level;

/// Server -> client line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerMessage {
    /* ---------- handshake ---------- */
    HostPasswordPrompt,
    HostPasswordRejected,
    AuthChoicePrompt,
    /// `new` selects the registration wording
    UsernamePrompt { new: bool },
    PasswordPrompt { new: bool },
    TooManyAttempts,
    LoggedIn { chat_name: String, username: String },

    /* ---------- server-wide notices ---------- */
    JoinedChat { username: String },
    LeftChat { username: String },
    ShuttingDown,

    /* ---------- room notices ---------- */
    JoinedRoom { username: String },
    LeftRoom { username: String },
    /// Room chat line: `[room] <Role>user: text`
    Chat {
        room_tag: Option<String>,
        role: String,
        username: String,
        text: String,
    },

    /* ---------- private messages ---------- */
    WhisperFrom { from: String, text: String },
    WhisperTo { to: String, text: String },

    /* ---------- command results ---------- */
    RoomCreated { name: String },
    RoomJoined { name: String },
    RoomLeft,
    RoomListHeader,
    RoomListEntry {
        name: String,
        members: usize,
        can_chat: bool,
        current: bool,
    },
    NoRoomsVisible,
    LevelSet {
        username: String,
        level: Level,
        role: String,
    },
    LevelChanged { level: Level, role: String },
    KickPlaceholder { target: String },
    BanPlaceholder { target: String },
    Disconnecting,

    /// Recoverable error reported to the issuing session
    Error(ChatError),
}

impl fmt::Display for ServerMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerMessage::HostPasswordPrompt => write!(f, "Enter host password to connect:"),
            ServerMessage::HostPasswordRejected => {
                write!(f, "Incorrect host password. Disconnecting.")
            }
            ServerMessage::AuthChoicePrompt => write!(f, "Welcome! Type 'login' or 'register':"),
            ServerMessage::UsernamePrompt { new: true } => write!(f, "Enter new username:"),
            ServerMessage::UsernamePrompt { new: false } => write!(f, "Enter username:"),
            ServerMessage::PasswordPrompt { new: true } => write!(f, "Enter new password:"),
            ServerMessage::PasswordPrompt { new: false } => write!(f, "Enter password:"),
            ServerMessage::TooManyAttempts => {
                write!(f, "Too many failed attempts. Disconnecting.")
            }
            ServerMessage::LoggedIn {
                chat_name,
                username,
            } => write!(f, "OK: Logged in to {} as {}", chat_name, username),

            ServerMessage::JoinedChat { username } => write!(f, "{} joined the chat.", username),
            ServerMessage::LeftChat { username } => write!(f, "{} left the chat.", username),
            ServerMessage::ShuttingDown => write!(f, "Server is shutting down."),

            ServerMessage::JoinedRoom { username } => write!(f, "{} joined the room.", username),
            ServerMessage::LeftRoom { username } => write!(f, "{} left the room.", username),
            ServerMessage::Chat {
                room_tag,
                role,
                username,
                text,
            } => {
                if let Some(room) = room_tag {
                    write!(f, "[{}] ", room)?;
                }
                write!(f, "<{}>{}: {}", role, username, text)
            }

            ServerMessage::WhisperFrom { from, text } => write!(f, "[From {}]: {}", from, text),
            ServerMessage::WhisperTo { to, text } => write!(f, "[To {}]: {}", to, text),

            ServerMessage::RoomCreated { name } => {
                write!(f, "Room '{}' created successfully.", name)
            }
            ServerMessage::RoomJoined { name } => write!(f, "Joined room: {}", name),
            ServerMessage::RoomLeft => write!(f, "You left the room."),
            ServerMessage::RoomListHeader => write!(f, "Available rooms:"),
            ServerMessage::RoomListEntry {
                name,
                members,
                can_chat,
                current,
            } => {
                write!(
                    f,
                    " - {} ({} users) ({})",
                    name,
                    members,
                    if *can_chat { "chat ✓" } else { "view only" }
                )?;
                if *current {
                    write!(f, " [current]")?;
                }
                Ok(())
            }
            ServerMessage::NoRoomsVisible => write!(f, "No rooms are visible to you."),
            ServerMessage::LevelSet {
                username,
                level,
                role,
            } => write!(
                f,
                "Set {}'s permission level to {} ({}).",
                username, level, role
            ),
            ServerMessage::LevelChanged { level, role } => {
                write!(f, "Your permission level is now {} ({}).", level, role)
            }
            ServerMessage::KickPlaceholder { target } => {
                write!(f, "Kick command executed for {} (placeholder).", target)
            }
            ServerMessage::BanPlaceholder { target } => {
                write!(f, "Ban command executed for {} (placeholder).", target)
            }
            ServerMessage::Disconnecting => write!(f, "Disconnecting from server..."),

            ServerMessage::Error(err) => write!(f, "{}", err),
        }
    }
}

/// Convert ChatError to ServerMessage for client notification
impl From<ChatError> for ServerMessage {
    fn from(err: ChatError) -> Self {
        ServerMessage::Error(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_line() {
        let msg = ServerMessage::Chat {
            room_tag: None,
            role: "Untrusted User".to_string(),
            username: "Alice".to_string(),
            text: "hello".to_string(),
        };
        assert_eq!(msg.to_string(), "<Untrusted User>Alice: hello");
    }

    #[test]
    fn test_tagged_chat_line() {
        let msg = ServerMessage::Chat {
            room_tag: Some("general".to_string()),
            role: "Untrusted User".to_string(),
            username: "Alice".to_string(),
            text: "hello".to_string(),
        };
        assert_eq!(msg.to_string(), "[general] <Untrusted User>Alice: hello");
    }

    #[test]
    fn test_room_list_entry() {
        let entry = ServerMessage::RoomListEntry {
            name: "general".to_string(),
            members: 2,
            can_chat: true,
            current: true,
        };
        assert_eq!(entry.to_string(), " - general (2 users) (chat ✓) [current]");

        let entry = ServerMessage::RoomListEntry {
            name: "news".to_string(),
            members: 0,
            can_chat: false,
            current: false,
        };
        assert_eq!(entry.to_string(), " - news (0 users) (view only)");
    }

    #[test]
    fn test_logged_in_prefix() {
        let msg = ServerMessage::LoggedIn {
            chat_name: "CoolRoom".to_string(),
            username: "Alice".to_string(),
        };
        assert!(msg.to_string().starts_with("OK: Logged in"));
        assert!(msg.to_string().contains("CoolRoom"));
    }

    #[test]
    fn test_error_uses_chat_error_text() {
        let msg: ServerMessage = ChatError::UserNotFound.into();
        assert_eq!(msg.to_string(), "User not found.");
    }
}
