//! Session and room registries
//!
//! Both are plain maps owned by the `ChatServer` actor. All access goes
//! through the actor's command loop, so every mutation is atomic with
//! respect to other sessions.

use std::collections::{BTreeMap, HashMap};

use tracing::warn;

use crate::client::Client;
use crate::error::ChatError;
use crate::room::Room;
use crate::types::SessionId;

/// All live, authenticated sessions
#[derive(Debug, Default)]
pub struct SessionRegistry {
    clients: HashMap<SessionId, Client>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, client: Client) {
        self.clients.insert(client.id, client);
    }

    pub fn remove(&mut self, id: SessionId) -> Option<Client> {
        self.clients.remove(&id)
    }

    pub fn get(&self, id: SessionId) -> Option<&Client> {
        self.clients.get(&id)
    }

    pub fn get_mut(&mut self, id: SessionId) -> Option<&mut Client> {
        self.clients.get_mut(&id)
    }

    pub fn contains(&self, id: SessionId) -> bool {
        self.clients.contains_key(&id)
    }

    /// Case-insensitive username lookup
    pub fn find_by_name(&self, name: &str) -> Option<SessionId> {
        self.clients
            .values()
            .find(|c| c.is_named(name))
            .map(|c| c.id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Client> {
        self.clients.values()
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    /// Send a line to one session; unknown IDs and full queues are dropped
    pub fn send_to(&self, id: SessionId, line: &str) {
        if let Some(client) = self.clients.get(&id) {
            if let Err(e) = client.send(line) {
                warn!(session = %id, user = %client.username, "Dropped outbound line: {}", e);
            }
        }
    }

    /// Send a line to every listed session
    pub fn send_many(&self, ids: &[SessionId], line: &str) {
        for id in ids {
            self.send_to(*id, line);
        }
    }

    /// Send a line to every connected session
    pub fn broadcast(&self, line: &str) {
        let ids: Vec<SessionId> = self.clients.keys().copied().collect();
        self.send_many(&ids, line);
    }
}

/// All rooms, keyed by exact name
///
/// Ordered so `/rooms` lists deterministically.
#[derive(Debug, Default)]
pub struct RoomRegistry {
    rooms: BTreeMap<String, Room>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-populated with the configured rooms
    ///
    /// Later duplicates lose to earlier ones.
    pub fn with_rooms(rooms: impl IntoIterator<Item = Room>) -> Self {
        let mut registry = Self::new();
        for room in rooms {
            let _ = registry.create(room);
        }
        registry
    }

    /// Register a new room; the first creator of a name wins
    pub fn create(&mut self, room: Room) -> Result<&mut Room, ChatError> {
        use std::collections::btree_map::Entry;
        match self.rooms.entry(room.name.clone()) {
            Entry::Occupied(_) => Err(ChatError::RoomExists),
            Entry::Vacant(slot) => Ok(slot.insert(room)),
        }
    }

    /// Return the named room, creating it with default permissions if absent
    pub fn get_or_create(&mut self, name: &str) -> &mut Room {
        self.rooms
            .entry(name.to_string())
            .or_insert_with(|| Room::with_defaults(name))
    }

    pub fn get(&self, name: &str) -> Option<&Room> {
        self.rooms.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Room> {
        self.rooms.get_mut(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.rooms.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Room> {
        self.rooms.values()
    }

    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Identity;
    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;

    fn client(name: &str) -> (Client, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(8);
        (
            Client::new(SessionId::new(), Identity::new(name, 0), tx, CancellationToken::new()),
            rx,
        )
    }

    #[test]
    fn test_find_by_name_case_insensitive() {
        let mut sessions = SessionRegistry::new();
        let (alice, _rx) = client("Alice");
        let id = alice.id;
        sessions.insert(alice);

        assert_eq!(sessions.find_by_name("alice"), Some(id));
        assert_eq!(sessions.find_by_name("ALICE"), Some(id));
        assert_eq!(sessions.find_by_name("bob"), None);
    }

    #[test]
    fn test_find_by_name_non_ascii() {
        let mut sessions = SessionRegistry::new();
        let (emile, _rx) = client("Émile");
        let id = emile.id;
        sessions.insert(emile);

        assert_eq!(sessions.find_by_name("émile"), Some(id));
    }

    #[test]
    fn test_broadcast_reaches_everyone() {
        let mut sessions = SessionRegistry::new();
        let (alice, mut alice_rx) = client("Alice");
        let (bob, mut bob_rx) = client("Bob");
        sessions.insert(alice);
        sessions.insert(bob);

        sessions.broadcast("hi all");
        assert_eq!(alice_rx.try_recv().unwrap(), "hi all");
        assert_eq!(bob_rx.try_recv().unwrap(), "hi all");
    }

    #[test]
    fn test_send_to_removed_session_is_noop() {
        let mut sessions = SessionRegistry::new();
        let (alice, mut rx) = client("Alice");
        let id = alice.id;
        sessions.insert(alice);
        assert!(sessions.remove(id).is_some());

        sessions.send_to(id, "anyone?");
        assert!(rx.try_recv().is_err());
        assert!(sessions.is_empty());
    }

    #[test]
    fn test_create_first_wins() {
        let mut rooms = RoomRegistry::new();
        assert!(rooms.create(Room::with_defaults("lobby").with_tag_messages(true)).is_ok());
        assert_eq!(
            rooms.create(Room::with_defaults("lobby")).unwrap_err(),
            ChatError::RoomExists
        );
        assert!(rooms.get("lobby").unwrap().tag_messages);
        assert_eq!(rooms.len(), 1);
    }

    #[test]
    fn test_get_or_create_returns_existing() {
        let mut rooms = RoomRegistry::new();
        rooms
            .create(Room::with_defaults("lobby").with_broadcast_all(true))
            .unwrap();

        assert!(rooms.get_or_create("lobby").broadcast_all);
        assert!(!rooms.get_or_create("other").broadcast_all);
        assert_eq!(rooms.len(), 2);
    }

    #[test]
    fn test_names_are_case_sensitive() {
        let rooms = RoomRegistry::with_rooms([Room::with_defaults("General")]);
        assert!(rooms.contains("General"));
        assert!(!rooms.contains("general"));
    }

    #[test]
    fn test_iter_is_sorted() {
        let rooms = RoomRegistry::with_rooms([
            Room::with_defaults("zeta"),
            Room::with_defaults("alpha"),
        ]);
        let names: Vec<&str> = rooms.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["alpha", "zeta"]);
    }
}
