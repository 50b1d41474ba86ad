//! Basic type definitions for the chat server
//!
//! Provides newtype wrappers and small value types:
//! - `SessionId`: UUID-based unique session identifier
//! - `Level`: numeric permission tier
//! - `Identity`: an authenticated user's name and level

use uuid::Uuid;

/// Numeric permission tier
pub type Level = i32;

/// Unique session identifier (newtype pattern)
///
/// Wraps a UUID v4 for type-safe session identification.
/// Implements Hash and Eq for use as HashMap keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(pub Uuid);

impl SessionId {
    /// Create a new random session ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Authenticated user identity as returned by the credential store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub username: String,
    pub level: Level,
}

impl Identity {
    pub fn new(username: impl Into<String>, level: Level) -> Self {
        Self {
            username: username.into(),
            level,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_id_unique() {
        let id1 = SessionId::new();
        let id2 = SessionId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_identity_new() {
        let identity = Identity::new("Alice", 0);
        assert_eq!(identity.username, "Alice");
        assert_eq!(identity.level, 0);
    }
}
