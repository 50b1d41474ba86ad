//! Room struct definition
//!
//! Represents a named broadcast group gated by two permission sets.

use std::collections::HashSet;

use crate::types::{Level, SessionId};

/// View/chat levels given to rooms created with `/create`
pub const DEFAULT_ROOM_LEVELS: [Level; 3] = [0, 1, 100];

/// Chat Room
///
/// Membership is a set of session IDs; the sessions themselves live in the
/// session registry. A session is a member of at most one room at a time.
#[derive(Debug)]
pub struct Room {
    /// Unique room name
    pub name: String,
    /// Levels allowed to see, list and join the room
    pub view_levels: HashSet<Level>,
    /// Levels allowed to post in the room
    pub chat_levels: HashSet<Level>,
    /// Carried from configuration; no history is kept
    pub save_history: bool,
    /// Deliver chat to every connected viewer instead of just members
    pub broadcast_all: bool,
    /// Prefix chat lines with `[name]`
    pub tag_messages: bool,
    /// Current members
    members: HashSet<SessionId>,
}

impl Room {
    /// Create a room with the given name and permission sets, all flags off
    pub fn new(
        name: impl Into<String>,
        view_levels: HashSet<Level>,
        chat_levels: HashSet<Level>,
    ) -> Self {
        Self {
            name: name.into(),
            view_levels,
            chat_levels,
            save_history: false,
            broadcast_all: false,
            tag_messages: false,
            members: HashSet::new(),
        }
    }

    /// Room with the default permission sets used by `/create`
    pub fn with_defaults(name: impl Into<String>) -> Self {
        let levels: HashSet<Level> = DEFAULT_ROOM_LEVELS.into_iter().collect();
        Self::new(name, levels.clone(), levels)
    }

    pub fn with_save_history(mut self, on: bool) -> Self {
        self.save_history = on;
        self
    }

    pub fn with_broadcast_all(mut self, on: bool) -> Self {
        self.broadcast_all = on;
        self
    }

    pub fn with_tag_messages(mut self, on: bool) -> Self {
        self.tag_messages = on;
        self
    }

    /// Check if a level may see, list and join this room
    pub fn can_view(&self, level: Level) -> bool {
        self.view_levels.contains(&level)
    }

    /// Check if a level may post in this room
    pub fn can_chat(&self, level: Level) -> bool {
        self.chat_levels.contains(&level)
    }

    /// Add a member; returns false if already present
    pub fn add_member(&mut self, id: SessionId) -> bool {
        self.members.insert(id)
    }

    /// Remove a member; returns false if not present
    pub fn remove_member(&mut self, id: SessionId) -> bool {
        self.members.remove(&id)
    }

    /// Check if a session is in this room
    pub fn contains(&self, id: SessionId) -> bool {
        self.members.contains(&id)
    }

    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    /// Point-in-time copy of the membership, for broadcasting
    pub fn members(&self) -> Vec<SessionId> {
        self.members.iter().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn levels(l: &[Level]) -> HashSet<Level> {
        l.iter().copied().collect()
    }

    #[test]
    fn test_room_creation() {
        let room = Room::new("general", levels(&[0, 1]), levels(&[1]));

        assert_eq!(room.name, "general");
        assert_eq!(room.member_count(), 0);
        assert!(!room.broadcast_all);
        assert!(!room.tag_messages);
    }

    #[test]
    fn test_predicates() {
        let room = Room::new("general", levels(&[0, 1]), levels(&[1]));

        assert!(room.can_view(0));
        assert!(room.can_view(1));
        assert!(!room.can_view(2));

        assert!(!room.can_chat(0));
        assert!(room.can_chat(1));
    }

    #[test]
    fn test_empty_sets_deny() {
        let room = Room::new("locked", HashSet::new(), HashSet::new());
        assert!(!room.can_view(0));
        assert!(!room.can_chat(0));
    }

    #[test]
    fn test_defaults() {
        let room = Room::with_defaults("lobby");
        for level in DEFAULT_ROOM_LEVELS {
            assert!(room.can_view(level));
            assert!(room.can_chat(level));
        }
        assert!(!room.can_view(50));
    }

    #[test]
    fn test_membership() {
        let mut room = Room::with_defaults("lobby");
        let a = SessionId::new();
        let b = SessionId::new();

        assert!(room.add_member(a));
        assert!(!room.add_member(a));
        assert!(room.add_member(b));
        assert_eq!(room.member_count(), 2);
        assert!(room.contains(a));

        assert!(room.remove_member(a));
        assert!(!room.remove_member(a));
        assert!(!room.contains(a));
        assert_eq!(room.members(), vec![b]);
    }
}
