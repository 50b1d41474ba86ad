//! Permission table
//!
//! Maps numeric levels to a role name and a set of allowed action keys.
//! Built once at startup and never mutated afterwards, so it is shared
//! behind an `Arc` and read without locking.

use std::collections::HashMap;

use crate::types::Level;

/// Action key for `/create`
pub const CREATE_ROOM: &str = "command.createroom";
/// Action key for `/kick`
pub const KICK: &str = "command.kick";
/// Action key for `/ban`
pub const BAN: &str = "command.ban";
/// Action key for `/editperms`
pub const EDIT_PERMS: &str = "command.editperms";

/// Role name reported for levels missing from the table
pub const UNKNOWN_ROLE: &str = "Unknown";

/// One configured permission tier
#[derive(Debug, Clone, Default)]
pub struct PermissionLevel {
    /// Display name used in chat lines, e.g. `<Untrusted User>`
    pub name: String,
    /// Action key -> allowed
    pub actions: HashMap<String, bool>,
}

impl PermissionLevel {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            actions: HashMap::new(),
        }
    }

    /// Builder-style helper to grant or deny an action
    pub fn with_action(mut self, action: impl Into<String>, allowed: bool) -> Self {
        self.actions.insert(action.into(), allowed);
        self
    }
}

/// Immutable level -> capabilities mapping plus the owner identity
#[derive(Debug, Clone)]
pub struct PermissionTable {
    levels: HashMap<Level, PermissionLevel>,
    owner: String,
}

impl PermissionTable {
    pub fn new(owner: impl Into<String>, levels: HashMap<Level, PermissionLevel>) -> Self {
        Self {
            levels,
            owner: owner.into(),
        }
    }

    /// The username that bypasses every action check
    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn is_owner(&self, username: &str) -> bool {
        username == self.owner
    }

    /// Check whether `username` at `level` may perform `action`
    ///
    /// The owner is always allowed. Everyone else gets exactly the boolean
    /// configured for their level, and unknown levels or actions deny.
    pub fn can_perform(&self, username: &str, level: Level, action: &str) -> bool {
        if self.is_owner(username) {
            return true;
        }
        self.levels
            .get(&level)
            .and_then(|pl| pl.actions.get(action))
            .copied()
            .unwrap_or(false)
    }

    /// Role name for a level, or `"Unknown"` if the level is undefined
    pub fn name_of(&self, level: Level) -> &str {
        self.levels
            .get(&level)
            .map(|pl| pl.name.as_str())
            .unwrap_or(UNKNOWN_ROLE)
    }

    pub fn len(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }
}
