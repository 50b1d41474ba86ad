//! Credential store
//!
//! The chat core only talks to the `CredentialStore` trait. `MemoryStore`
//! is the bundled implementation: accounts live in a `DashMap`, passwords
//! are argon2 PHC strings, and an optional JSON file keeps accounts across
//! restarts.
//!
//! All methods are synchronous and may hash passwords, so async callers
//! should go through `tokio::task::spawn_blocking`.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::StoreError;
use crate::types::{Identity, Level};

/// Account lookup and registration
pub trait CredentialStore: Send + Sync {
    /// Create an account; fails with `DuplicateUsername` if the name is taken
    fn register(&self, username: &str, password: &str, level: Level)
        -> Result<Identity, StoreError>;

    /// Check a username/password pair
    fn login(&self, username: &str, password: &str) -> Result<Identity, StoreError>;

    /// Persist a new permission level
    fn set_level(&self, username: &str, level: Level) -> Result<(), StoreError>;

    /// Look up an account without checking a password
    fn get(&self, username: &str) -> Result<Identity, StoreError>;
}

/// Stored account record
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Account {
    password_hash: String,
    level: Level,
}

/// In-memory store with optional JSON snapshot
#[derive(Debug, Default)]
pub struct MemoryStore {
    accounts: DashMap<String, Account>,
    path: Option<PathBuf>,
    /// Serializes snapshot writes
    write_lock: Mutex<()>,
}

impl MemoryStore {
    /// Store that forgets everything on exit
    pub fn new() -> Self {
        Self::default()
    }

    /// Store backed by a JSON file; a missing file starts empty
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let accounts = DashMap::new();

        if path.exists() {
            let raw = fs::read_to_string(&path)?;
            let saved: BTreeMap<String, Account> = serde_json::from_str(&raw)?;
            for (name, account) in saved {
                accounts.insert(name, account);
            }
            info!("Loaded {} accounts from {}", accounts.len(), path.display());
        }

        Ok(Self {
            accounts,
            path: Some(path),
            write_lock: Mutex::new(()),
        })
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    /// Rewrite the snapshot file, if any
    fn persist(&self) -> Result<(), StoreError> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let _guard = self.write_lock.lock();
        let snapshot: BTreeMap<String, Account> = self
            .accounts
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect();

        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(&snapshot)?)?;
        fs::rename(&tmp, path)?;
        debug!("Saved {} accounts to {}", snapshot.len(), path.display());
        Ok(())
    }
}

fn hash_password(plain: &str) -> Result<String, StoreError> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(plain.as_bytes(), &salt)
        .map_err(|e| StoreError::Hash(e.to_string()))?
        .to_string();
    Ok(hash)
}

fn verify_password(hash: &str, plain: &str) -> bool {
    let parsed_hash = match PasswordHash::new(hash) {
        Ok(h) => h,
        Err(_) => return false,
    };
    Argon2::default()
        .verify_password(plain.as_bytes(), &parsed_hash)
        .is_ok()
}

impl CredentialStore for MemoryStore {
    fn register(
        &self,
        username: &str,
        password: &str,
        level: Level,
    ) -> Result<Identity, StoreError> {
        if self.accounts.contains_key(username) {
            return Err(StoreError::DuplicateUsername);
        }

        // Hash before taking the shard lock; the entry check below still
        // decides concurrent registrations of the same name.
        let password_hash = hash_password(password)?;

        match self.accounts.entry(username.to_string()) {
            Entry::Occupied(_) => return Err(StoreError::DuplicateUsername),
            Entry::Vacant(slot) => {
                slot.insert(Account {
                    password_hash,
                    level,
                });
            }
        }

        if let Err(e) = self.persist() {
            self.accounts.remove(username);
            return Err(e);
        }
        Ok(Identity::new(username, level))
    }

    fn login(&self, username: &str, password: &str) -> Result<Identity, StoreError> {
        let account = self
            .accounts
            .get(username)
            .map(|a| a.value().clone())
            .ok_or(StoreError::InvalidCredentials)?;

        if !verify_password(&account.password_hash, password) {
            return Err(StoreError::InvalidCredentials);
        }
        Ok(Identity::new(username, account.level))
    }

    fn set_level(&self, username: &str, level: Level) -> Result<(), StoreError> {
        let previous = match self.accounts.get_mut(username) {
            Some(mut account) => std::mem::replace(&mut account.level, level),
            None => return Err(StoreError::NotFound),
        };

        if let Err(e) = self.persist() {
            if let Some(mut account) = self.accounts.get_mut(username) {
                account.level = previous;
            }
            return Err(e);
        }
        Ok(())
    }

    fn get(&self, username: &str) -> Result<Identity, StoreError> {
        self.accounts
            .get(username)
            .map(|a| Identity::new(username, a.level))
            .ok_or(StoreError::NotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_login() {
        let store = MemoryStore::new();
        let identity = store.register("Alice", "pw", 0).unwrap();
        assert_eq!(identity, Identity::new("Alice", 0));

        let identity = store.login("Alice", "pw").unwrap();
        assert_eq!(identity.level, 0);
    }

    #[test]
    fn test_duplicate_register() {
        let store = MemoryStore::new();
        store.register("Alice", "pw", 0).unwrap();
        assert!(matches!(
            store.register("Alice", "other", 0),
            Err(StoreError::DuplicateUsername)
        ));
    }

    #[test]
    fn test_bad_password_and_unknown_user() {
        let store = MemoryStore::new();
        store.register("Alice", "pw", 0).unwrap();
        assert!(matches!(
            store.login("Alice", "nope"),
            Err(StoreError::InvalidCredentials)
        ));
        assert!(matches!(
            store.login("Nobody", "pw"),
            Err(StoreError::InvalidCredentials)
        ));
    }

    #[test]
    fn test_set_level_and_get() {
        let store = MemoryStore::new();
        store.register("Alice", "pw", 0).unwrap();
        store.set_level("Alice", 50).unwrap();

        assert_eq!(store.get("Alice").unwrap().level, 50);
        assert_eq!(store.login("Alice", "pw").unwrap().level, 50);
        assert!(matches!(store.set_level("Bob", 1), Err(StoreError::NotFound)));
        assert!(matches!(store.get("Bob"), Err(StoreError::NotFound)));
    }

    #[test]
    fn test_password_is_not_stored_plain() {
        let store = MemoryStore::new();
        store.register("Alice", "pw", 0).unwrap();
        let account = store.accounts.get("Alice").unwrap();
        assert_ne!(account.password_hash, "pw");
        assert!(account.password_hash.starts_with("$argon2"));
    }

    #[test]
    fn test_snapshot_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("users.json");

        {
            let store = MemoryStore::open(&path).unwrap();
            assert!(store.is_empty());
            store.register("Alice", "pw", 0).unwrap();
            store.set_level("Alice", 7).unwrap();
        }

        let store = MemoryStore::open(&path).unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(store.login("Alice", "pw").unwrap().level, 7);
    }

    #[test]
    fn test_failed_snapshot_write_rolls_back() {
        let dir = tempfile::tempdir().unwrap();
        let store = MemoryStore::open(dir.path().join("users.json")).unwrap();
        store.register("Bob", "pw", 0).unwrap();

        // Point the snapshot into a directory that does not exist
        let store = MemoryStore {
            path: Some(dir.path().join("missing").join("users.json")),
            ..store
        };

        assert!(matches!(store.register("Alice", "pw", 0), Err(StoreError::Io(_))));
        assert!(matches!(store.get("Alice"), Err(StoreError::NotFound)));
        assert!(matches!(
            store.login("Alice", "pw"),
            Err(StoreError::InvalidCredentials)
        ));

        assert!(matches!(store.set_level("Bob", 50), Err(StoreError::Io(_))));
        assert_eq!(store.get("Bob").unwrap().level, 0);
    }

    #[test]
    fn test_corrupt_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("users.json");
        fs::write(&path, "not json").unwrap();
        assert!(matches!(MemoryStore::open(&path), Err(StoreError::Json(_))));
    }
}
