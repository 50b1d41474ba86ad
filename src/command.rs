//! Command parsing and dispatch
//!
//! A command line is the prefix character, a case-insensitive command word
//! and an optional remainder. Parsing produces a closed `Command` enum;
//! `CommandProcessor` executes one against the shared registries on behalf
//! of the issuing session.

use tracing::{debug, info};

use crate::error::ChatError;
use crate::message::ServerMessage;
use crate::permission::{self, PermissionTable};
use crate::registry::{RoomRegistry, SessionRegistry};
use crate::room::Room;
use crate::store::CredentialStore;
use crate::types::{Level, SessionId};

/// Lines starting with this character are commands
pub const COMMAND_PREFIX: char = '/';

/// A parsed command line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `/create <room>`
    Create { room: String },
    /// `/join <room>`
    Join { room: String },
    /// `/leave`
    Leave,
    /// `/rooms`
    Rooms,
    /// `/msg <user> <text>` and aliases
    Whisper { target: String, text: String },
    /// `/r <text>`; the text is checked after the reply target
    Reply { text: Option<String> },
    /// `/editperms <user> <level>`
    EditPerms { target: String, level: Level },
    /// `/kick [user]`; permission is checked before arguments
    Kick { target: Option<String> },
    /// `/ban [user]`
    Ban { target: Option<String> },
    /// `/quit`
    Quit,
}

impl Command {
    /// Parse a line that starts with `COMMAND_PREFIX`
    pub fn parse(line: &str) -> Result<Self, ChatError> {
        let line = line.trim();
        let body = line
            .strip_prefix(COMMAND_PREFIX)
            .ok_or(ChatError::UnknownCommand)?;

        let (word, rest) = match body.split_once(char::is_whitespace) {
            Some((word, rest)) => (word, Some(rest.trim()).filter(|r| !r.is_empty())),
            None => (body, None),
        };

        match word.to_ascii_lowercase().as_str() {
            "create" => {
                let room = rest.ok_or(ChatError::Usage("/create <roomname>"))?;
                Ok(Command::Create {
                    room: room.to_string(),
                })
            }
            "join" => {
                let room = rest.ok_or(ChatError::Usage("/join <roomname>"))?;
                Ok(Command::Join {
                    room: room.to_string(),
                })
            }
            "leave" => Ok(Command::Leave),
            "rooms" => Ok(Command::Rooms),
            "msg" | "whisper" | "w" | "m" | "message" => {
                const USAGE: ChatError = ChatError::Usage("/msg <user> <message>");
                let rest = rest.ok_or(USAGE)?;
                let (target, text) = rest.split_once(char::is_whitespace).ok_or(USAGE)?;
                let text = text.trim_start();
                if text.is_empty() {
                    return Err(USAGE);
                }
                Ok(Command::Whisper {
                    target: target.to_string(),
                    text: text.to_string(),
                })
            }
            "r" | "reply" => Ok(Command::Reply {
                text: rest.map(str::to_string),
            }),
            "editperms" => {
                const USAGE: ChatError = ChatError::Usage("/editperms <user> <level>");
                let rest = rest.ok_or(USAGE)?;
                let mut args = rest.split_whitespace();
                let (Some(target), Some(raw_level), None) = (args.next(), args.next(), args.next())
                else {
                    return Err(USAGE);
                };
                let level = raw_level
                    .parse::<Level>()
                    .map_err(|_| ChatError::InvalidLevel(raw_level.to_string()))?;
                Ok(Command::EditPerms {
                    target: target.to_string(),
                    level,
                })
            }
            "kick" => Ok(Command::Kick {
                target: rest.map(str::to_string),
            }),
            "ban" => Ok(Command::Ban {
                target: rest.map(str::to_string),
            }),
            "quit" | "exit" => Ok(Command::Quit),
            _ => Err(ChatError::UnknownCommand),
        }
    }
}

/// What the issuing session should do after a command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Continue,
    /// The session asked to leave; run disconnect cleanup
    Disconnect,
}

/// Executes commands and chat lines against the shared state
///
/// Holds no state of its own; it borrows the registries for the duration of
/// one command.
pub struct CommandProcessor<'a> {
    sessions: &'a mut SessionRegistry,
    rooms: &'a mut RoomRegistry,
    permissions: &'a PermissionTable,
    store: &'a dyn CredentialStore,
}

impl<'a> CommandProcessor<'a> {
    pub fn new(
        sessions: &'a mut SessionRegistry,
        rooms: &'a mut RoomRegistry,
        permissions: &'a PermissionTable,
        store: &'a dyn CredentialStore,
    ) -> Self {
        Self {
            sessions,
            rooms,
            permissions,
            store,
        }
    }

    /// Run one command for `issuer`
    ///
    /// Errors are meant for the issuer only; no state has changed when one
    /// is returned.
    pub fn execute(&mut self, issuer: SessionId, command: Command) -> Result<Outcome, ChatError> {
        if !self.sessions.contains(issuer) {
            return Ok(Outcome::Continue);
        }
        debug!(session = %issuer, ?command, "Dispatching command");

        match command {
            Command::Create { room } => self.create_room(issuer, &room)?,
            Command::Join { room } => self.join(issuer, &room)?,
            Command::Leave => self.leave(issuer)?,
            Command::Rooms => self.list_rooms(issuer),
            Command::Whisper { target, text } => self.whisper(issuer, &target, &text)?,
            Command::Reply { text } => self.reply(issuer, text.as_deref())?,
            Command::EditPerms { target, level } => self.edit_perms(issuer, &target, level)?,
            Command::Kick { target } => self.kick(issuer, target.as_deref())?,
            Command::Ban { target } => self.ban(issuer, target.as_deref())?,
            Command::Quit => {
                self.reply_to(issuer, ServerMessage::Disconnecting);
                return Ok(Outcome::Disconnect);
            }
        }
        Ok(Outcome::Continue)
    }

    /// Deliver a chat line from `issuer` to their current room
    pub fn chat(&mut self, issuer: SessionId, text: &str) -> Result<(), ChatError> {
        let Some(client) = self.sessions.get(issuer) else {
            return Ok(());
        };
        let room_name = client
            .current_room
            .as_deref()
            .ok_or(ChatError::ChatOutsideRoom)?;
        let room = self.rooms.get(room_name).ok_or(ChatError::ChatOutsideRoom)?;

        if !room.can_chat(client.level) {
            return Err(ChatError::PermissionDenied("chat in this room"));
        }

        let line = ServerMessage::Chat {
            room_tag: room.tag_messages.then(|| room.name.clone()),
            role: self.permissions.name_of(client.level).to_string(),
            username: client.username.clone(),
            text: text.to_string(),
        }
        .to_string();

        let targets: Vec<SessionId> = if room.broadcast_all {
            self.sessions
                .iter()
                .filter(|c| room.can_view(c.level))
                .map(|c| c.id)
                .collect()
        } else {
            room.members()
        };
        self.sessions.send_many(&targets, &line);
        Ok(())
    }

    /// Remove `id` from its current room, if any, notifying the remaining
    /// members. Returns the room name it left.
    pub fn leave_current(&mut self, id: SessionId) -> Option<String> {
        let client = self.sessions.get_mut(id)?;
        let room_name = client.current_room.take()?;
        let username = client.username.clone();

        if let Some(room) = self.rooms.get_mut(&room_name) {
            room.remove_member(id);
            let notice = ServerMessage::LeftRoom { username }.to_string();
            self.sessions.send_many(&room.members(), &notice);
        }
        info!(session = %id, room = %room_name, "Left room");
        Some(room_name)
    }

    /// Put `id` into `room_name`, notifying every member including `id`
    fn enter(&mut self, id: SessionId, room_name: &str) {
        let Some(client) = self.sessions.get_mut(id) else {
            return;
        };
        let Some(room) = self.rooms.get_mut(room_name) else {
            return;
        };
        room.add_member(id);
        client.current_room = Some(room.name.clone());

        let notice = ServerMessage::JoinedRoom {
            username: client.username.clone(),
        }
        .to_string();
        self.sessions.send_many(&room.members(), &notice);
        info!(session = %id, room = %room_name, "Joined room");
    }

    fn reply_to(&self, id: SessionId, msg: ServerMessage) {
        self.sessions.send_to(id, &msg.to_string());
    }

    /// Username and level of a registered session
    fn caller(&self, id: SessionId) -> Result<(String, Level), ChatError> {
        self.sessions
            .get(id)
            .map(|c| (c.username.clone(), c.level))
            .ok_or(ChatError::UserNotFound)
    }

    fn require(&self, id: SessionId, action: &str, denied: &'static str) -> Result<(), ChatError> {
        let (username, level) = self.caller(id)?;
        if self.permissions.can_perform(&username, level, action) {
            Ok(())
        } else {
            Err(ChatError::PermissionDenied(denied))
        }
    }

    /* ---------- Command Implementations ---------- */

    fn create_room(&mut self, issuer: SessionId, name: &str) -> Result<(), ChatError> {
        self.require(issuer, permission::CREATE_ROOM, "create rooms")?;

        if self.rooms.contains(name) {
            return Err(ChatError::RoomExists);
        }
        self.rooms.create(Room::with_defaults(name))?;

        info!(session = %issuer, room = %name, "Room created");
        self.reply_to(
            issuer,
            ServerMessage::RoomCreated {
                name: name.to_string(),
            },
        );
        Ok(())
    }

    fn join(&mut self, issuer: SessionId, name: &str) -> Result<(), ChatError> {
        let (_, level) = self.caller(issuer)?;
        let room = self.rooms.get(name).ok_or(ChatError::RoomNotFound)?;

        if !room.can_view(level) {
            return Err(ChatError::PermissionDenied("view this room"));
        }

        let current = self
            .sessions
            .get(issuer)
            .and_then(|c| c.current_room.as_deref());
        if current == Some(name) {
            return Err(ChatError::AlreadyInRoom(name.to_string()));
        }

        self.leave_current(issuer);
        self.enter(issuer, name);
        self.reply_to(
            issuer,
            ServerMessage::RoomJoined {
                name: name.to_string(),
            },
        );
        Ok(())
    }

    fn leave(&mut self, issuer: SessionId) -> Result<(), ChatError> {
        self.leave_current(issuer).ok_or(ChatError::NotInRoom)?;
        self.reply_to(issuer, ServerMessage::RoomLeft);
        Ok(())
    }

    fn list_rooms(&self, issuer: SessionId) {
        let Some(client) = self.sessions.get(issuer) else {
            return;
        };
        self.reply_to(issuer, ServerMessage::RoomListHeader);

        let mut found_any = false;
        for room in self.rooms.iter().filter(|r| r.can_view(client.level)) {
            found_any = true;
            self.reply_to(
                issuer,
                ServerMessage::RoomListEntry {
                    name: room.name.clone(),
                    members: room.member_count(),
                    can_chat: room.can_chat(client.level),
                    current: client.current_room.as_deref() == Some(room.name.as_str()),
                },
            );
        }

        if !found_any {
            self.reply_to(issuer, ServerMessage::NoRoomsVisible);
        }
    }

    fn whisper(&mut self, issuer: SessionId, target: &str, text: &str) -> Result<(), ChatError> {
        let target_id = self
            .sessions
            .find_by_name(target)
            .ok_or(ChatError::UserNotFound)?;
        self.deliver_whisper(issuer, target_id, text);
        Ok(())
    }

    fn reply(&mut self, issuer: SessionId, text: Option<&str>) -> Result<(), ChatError> {
        let partner = self
            .sessions
            .get(issuer)
            .and_then(|c| c.last_whisper)
            .ok_or(ChatError::NoReplyTarget)?;
        let text = text.ok_or(ChatError::Usage("/r <message>"))?;

        if !self.sessions.contains(partner) {
            if let Some(client) = self.sessions.get_mut(issuer) {
                client.last_whisper = None;
            }
            return Err(ChatError::PartnerGone);
        }
        self.deliver_whisper(issuer, partner, text);
        Ok(())
    }

    /// Send a private line both ways and point each side at the other
    fn deliver_whisper(&mut self, from: SessionId, to: SessionId, text: &str) {
        let (Some(sender), Some(target)) = (self.sessions.get(from), self.sessions.get(to)) else {
            return;
        };
        let sender_name = sender.username.clone();
        let target_name = target.username.clone();

        if let Some(target) = self.sessions.get_mut(to) {
            target.last_whisper = Some(from);
        }
        if let Some(sender) = self.sessions.get_mut(from) {
            sender.last_whisper = Some(to);
        }

        self.reply_to(
            to,
            ServerMessage::WhisperFrom {
                from: sender_name,
                text: text.to_string(),
            },
        );
        self.reply_to(
            from,
            ServerMessage::WhisperTo {
                to: target_name,
                text: text.to_string(),
            },
        );
    }

    fn edit_perms(&mut self, issuer: SessionId, target: &str, level: Level) -> Result<(), ChatError> {
        let (caller_name, caller_level) = self.caller(issuer)?;

        // Prefer the canonical spelling of a connected user's name
        let target_name = self
            .sessions
            .find_by_name(target)
            .and_then(|id| self.sessions.get(id))
            .map(|c| c.username.clone())
            .unwrap_or_else(|| target.to_string());
        let target_identity = self.store.get(&target_name)?;

        let is_owner = self.permissions.is_owner(&caller_name);
        if !is_owner && !(caller_level > target_identity.level && caller_level > level) {
            return Err(ChatError::InsufficientPrivilege);
        }

        self.store.set_level(&target_identity.username, level)?;
        info!(
            session = %issuer,
            user = %target_identity.username,
            from = target_identity.level,
            to = level,
            "Permission level changed"
        );

        let role = self.permissions.name_of(level).to_string();
        let live: Vec<SessionId> = self
            .sessions
            .iter()
            .filter(|c| c.username == target_identity.username)
            .map(|c| c.id)
            .collect();
        for id in live {
            if let Some(client) = self.sessions.get_mut(id) {
                client.level = level;
            }
            self.reply_to(
                id,
                ServerMessage::LevelChanged {
                    level,
                    role: role.clone(),
                },
            );
        }

        self.reply_to(
            issuer,
            ServerMessage::LevelSet {
                username: target_identity.username,
                level,
                role,
            },
        );
        Ok(())
    }

    fn kick(&mut self, issuer: SessionId, target: Option<&str>) -> Result<(), ChatError> {
        self.require(issuer, permission::KICK, "kick users")?;
        let target = target.ok_or(ChatError::Usage("/kick <user>"))?;
        self.reply_to(
            issuer,
            ServerMessage::KickPlaceholder {
                target: target.to_string(),
            },
        );
        Ok(())
    }

    fn ban(&mut self, issuer: SessionId, target: Option<&str>) -> Result<(), ChatError> {
        self.require(issuer, permission::BAN, "ban users")?;
        let target = target.ok_or(ChatError::Usage("/ban <user>"))?;
        self.reply_to(
            issuer,
            ServerMessage::BanPlaceholder {
                target: target.to_string(),
            },
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_basic_commands() {
        assert_eq!(
            Command::parse("/join general").unwrap(),
            Command::Join {
                room: "general".to_string()
            }
        );
        assert_eq!(Command::parse("/leave").unwrap(), Command::Leave);
        assert_eq!(Command::parse("/rooms").unwrap(), Command::Rooms);
        assert_eq!(Command::parse("/quit").unwrap(), Command::Quit);
        assert_eq!(Command::parse("/exit").unwrap(), Command::Quit);
    }

    #[test]
    fn test_parse_is_case_insensitive() {
        assert_eq!(
            Command::parse("/JOIN General").unwrap(),
            Command::Join {
                room: "General".to_string()
            }
        );
        assert_eq!(Command::parse("/Rooms").unwrap(), Command::Rooms);
    }

    #[test]
    fn test_parse_whisper_aliases() {
        let expected = Command::Whisper {
            target: "bob".to_string(),
            text: "hi there  friend".to_string(),
        };
        for word in ["msg", "whisper", "w", "m", "message"] {
            let line = format!("/{} bob hi there  friend", word);
            assert_eq!(Command::parse(&line).unwrap(), expected);
        }
    }

    #[test]
    fn test_parse_whisper_usage() {
        let usage = ChatError::Usage("/msg <user> <message>");
        assert_eq!(Command::parse("/msg").unwrap_err(), usage);
        assert_eq!(Command::parse("/msg bob").unwrap_err(), usage);
        assert_eq!(Command::parse("/msg bob   ").unwrap_err(), usage);
    }

    #[test]
    fn test_parse_reply() {
        assert_eq!(
            Command::parse("/r hey").unwrap(),
            Command::Reply {
                text: Some("hey".to_string())
            }
        );
        assert_eq!(Command::parse("/reply").unwrap(), Command::Reply { text: None });
    }

    #[test]
    fn test_parse_missing_room() {
        assert_eq!(
            Command::parse("/join").unwrap_err(),
            ChatError::Usage("/join <roomname>")
        );
        assert_eq!(
            Command::parse("/create   ").unwrap_err(),
            ChatError::Usage("/create <roomname>")
        );
    }

    #[test]
    fn test_parse_editperms() {
        assert_eq!(
            Command::parse("/editperms Alice 50").unwrap(),
            Command::EditPerms {
                target: "Alice".to_string(),
                level: 50
            }
        );
        assert_eq!(
            Command::parse("/editperms Alice fifty").unwrap_err(),
            ChatError::InvalidLevel("fifty".to_string())
        );
        assert_eq!(
            Command::parse("/editperms Alice").unwrap_err(),
            ChatError::Usage("/editperms <user> <level>")
        );
        assert_eq!(
            Command::parse("/editperms Alice 1 2").unwrap_err(),
            ChatError::Usage("/editperms <user> <level>")
        );
    }

    #[test]
    fn test_parse_kick_ban() {
        assert_eq!(
            Command::parse("/kick mallory").unwrap(),
            Command::Kick {
                target: Some("mallory".to_string())
            }
        );
        assert_eq!(Command::parse("/ban").unwrap(), Command::Ban { target: None });
    }

    #[test]
    fn test_parse_unknown() {
        assert_eq!(
            Command::parse("/dance").unwrap_err(),
            ChatError::UnknownCommand
        );
        assert_eq!(Command::parse("/").unwrap_err(), ChatError::UnknownCommand);
    }
}
