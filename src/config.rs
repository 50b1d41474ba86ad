//! Server configuration
//!
//! Loaded once at startup from a TOML file. Every field has a default so an
//! empty file (or no file at all) yields a working server.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::AppError;
use crate::permission::{self, PermissionLevel, PermissionTable};
use crate::room::Room;
use crate::types::Level;

/// Default listen address
pub const DEFAULT_BIND: &str = "0.0.0.0:5000";

/// Top-level configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address
    pub bind: String,
    /// Display name sent in the login confirmation
    pub chat_name: String,
    /// Shared secret every client must present first
    pub host_password: String,
    /// Username that bypasses all permission checks
    pub owner: String,
    /// Failed login/register attempts before the connection is closed
    pub max_auth_attempts: u32,
    /// JSON snapshot of registered accounts; in-memory only when absent
    pub users_file: Option<PathBuf>,
    /// Optional name-lookup service to announce ourselves to
    pub lookup: Option<LookupConfig>,
    pub permissions: Vec<PermissionConfig>,
    pub rooms: Vec<RoomConfig>,
}

/// Name-lookup service endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct LookupConfig {
    pub addr: String,
    /// Port advertised to the lookup service (defaults to the bound port)
    pub port: Option<u16>,
}

/// One `[[permissions]]` entry
#[derive(Debug, Clone, Deserialize)]
pub struct PermissionConfig {
    pub level: Level,
    pub name: String,
    #[serde(default)]
    pub actions: HashMap<String, bool>,
}

/// One `[[rooms]]` entry
#[derive(Debug, Clone, Deserialize)]
pub struct RoomConfig {
    pub name: String,
    #[serde(default)]
    pub view: BTreeSet<Level>,
    #[serde(default)]
    pub chat: BTreeSet<Level>,
    #[serde(default)]
    pub save_history: bool,
    #[serde(default)]
    pub broadcast_all: bool,
    #[serde(default)]
    pub tag_messages: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        let all: BTreeSet<Level> = [0, 1, 100].into_iter().collect();
        Self {
            bind: DEFAULT_BIND.to_string(),
            chat_name: "CoolRoom".to_string(),
            host_password: "secret123".to_string(),
            owner: "Owner".to_string(),
            max_auth_attempts: 3,
            users_file: None,
            lookup: None,
            permissions: vec![
                PermissionConfig {
                    level: 0,
                    name: "Untrusted User".to_string(),
                    actions: HashMap::new(),
                },
                PermissionConfig {
                    level: 1,
                    name: "Trusted User".to_string(),
                    actions: [(permission::CREATE_ROOM.to_string(), true)]
                        .into_iter()
                        .collect(),
                },
                PermissionConfig {
                    level: 100,
                    name: "Administrator".to_string(),
                    actions: [
                        permission::CREATE_ROOM,
                        permission::KICK,
                        permission::BAN,
                        permission::EDIT_PERMS,
                    ]
                    .into_iter()
                    .map(|a| (a.to_string(), true))
                    .collect(),
                },
            ],
            rooms: vec![RoomConfig {
                name: "general".to_string(),
                view: all.clone(),
                chat: all,
                save_history: false,
                broadcast_all: false,
                tag_messages: false,
            }],
        }
    }
}

impl ServerConfig {
    /// Read and validate a TOML config file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, AppError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml(&raw)
    }

    /// Parse and validate TOML text
    pub fn from_toml(raw: &str) -> Result<Self, AppError> {
        let config: ServerConfig = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject duplicate levels, duplicate or empty room names
    pub fn validate(&self) -> Result<(), AppError> {
        let mut levels = HashSet::new();
        for p in &self.permissions {
            if !levels.insert(p.level) {
                return Err(AppError::Config(format!(
                    "permission level {} defined twice",
                    p.level
                )));
            }
        }

        let mut names = HashSet::new();
        for r in &self.rooms {
            let name = r.name.trim();
            if name.is_empty() {
                return Err(AppError::Config("room with empty name".to_string()));
            }
            if !names.insert(name) {
                return Err(AppError::Config(format!("room '{}' defined twice", name)));
            }
        }

        if self.max_auth_attempts == 0 {
            return Err(AppError::Config(
                "max_auth_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Build the immutable permission table
    pub fn permission_table(&self) -> PermissionTable {
        let levels = self
            .permissions
            .iter()
            .map(|p| {
                let level = PermissionLevel {
                    name: p.name.clone(),
                    actions: p.actions.clone(),
                };
                (p.level, level)
            })
            .collect();
        PermissionTable::new(self.owner.clone(), levels)
    }

    /// Build the rooms that exist at startup
    pub fn initial_rooms(&self) -> Vec<Room> {
        self.rooms
            .iter()
            .map(|r| {
                Room::new(
                    r.name.trim(),
                    r.view.iter().copied().collect(),
                    r.chat.iter().copied().collect(),
                )
                .with_save_history(r.save_history)
                .with_broadcast_all(r.broadcast_all)
                .with_tag_messages(r.tag_messages)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ServerConfig::default();
        assert!(config.validate().is_ok());

        let table = config.permission_table();
        assert_eq!(table.name_of(0), "Untrusted User");
        assert!(!table.can_perform("Alice", 0, permission::CREATE_ROOM));
        assert!(table.can_perform("Alice", 100, permission::EDIT_PERMS));

        let rooms = config.initial_rooms();
        assert_eq!(rooms.len(), 1);
        assert_eq!(rooms[0].name, "general");
        assert!(rooms[0].can_chat(0));
    }

    #[test]
    fn test_empty_file_uses_defaults() {
        let config = ServerConfig::from_toml("").unwrap();
        assert_eq!(config.bind, DEFAULT_BIND);
        assert_eq!(config.owner, "Owner");
    }

    #[test]
    fn test_parse_full_file() {
        let raw = r#"
            bind = "127.0.0.1:7000"
            chat_name = "Lounge"
            host_password = "hunter2"
            owner = "Bob"

            [lookup]
            addr = "127.0.0.1:6000"

            [[permissions]]
            level = 0
            name = "Guest"

            [[permissions]]
            level = 5
            name = "Mod"
            [permissions.actions]
            "command.createroom" = true
            "command.kick" = true

            [[rooms]]
            name = "announcements"
            view = [0, 5]
            chat = [5]
            broadcast_all = true
            tag_messages = true
        "#;
        let config = ServerConfig::from_toml(raw).unwrap();
        assert_eq!(config.chat_name, "Lounge");
        assert_eq!(config.lookup.as_ref().unwrap().addr, "127.0.0.1:6000");

        let table = config.permission_table();
        assert!(table.is_owner("Bob"));
        assert!(table.can_perform("Carol", 5, permission::KICK));
        assert!(!table.can_perform("Carol", 5, permission::BAN));

        let rooms = config.initial_rooms();
        assert_eq!(rooms.len(), 1);
        assert!(rooms[0].can_view(0));
        assert!(!rooms[0].can_chat(0));
        assert!(rooms[0].broadcast_all);
        assert!(rooms[0].tag_messages);
        assert!(!rooms[0].save_history);
    }

    #[test]
    fn test_sample_config_parses() {
        let config = ServerConfig::from_toml(include_str!("../config/server.toml")).unwrap();
        assert_eq!(config.users_file, Some(PathBuf::from("users.json")));
        assert!(config.lookup.is_none());
        assert_eq!(config.initial_rooms().len(), 2);
        assert!(config
            .permission_table()
            .can_perform("Alice", 100, permission::EDIT_PERMS));
    }

    #[test]
    fn test_duplicate_room_rejected() {
        let raw = r#"
            [[rooms]]
            name = "general"
            [[rooms]]
            name = "general"
        "#;
        assert!(matches!(
            ServerConfig::from_toml(raw),
            Err(AppError::Config(_))
        ));
    }

    #[test]
    fn test_duplicate_level_rejected() {
        let raw = r#"
            [[permissions]]
            level = 1
            name = "A"
            [[permissions]]
            level = 1
            name = "B"
        "#;
        assert!(matches!(
            ServerConfig::from_toml(raw),
            Err(AppError::Config(_))
        ));
    }

    #[test]
    fn test_malformed_toml() {
        assert!(matches!(
            ServerConfig::from_toml("bind = "),
            Err(AppError::Toml(_))
        ));
    }
}
