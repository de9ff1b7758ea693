use std::collections::{HashMap, HashSet};

use inkroom_shared::{RoomId, ServerMessage};
use tokio::sync::mpsc;
use uuid::Uuid;

pub type ConnectionId = Uuid;

/// What the router hands to a connection's writer task.
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    Message(ServerMessage),
    /// Another login for the same identity took over this connection.
    Evicted,
}

pub struct Connection {
    pub id: ConnectionId,
    pub sender: mpsc::UnboundedSender<Outbound>,
    pub rooms: HashSet<RoomId>,
}

/// Live identity-to-socket table. Owned by the room router task, which is
/// its only mutator.
#[derive(Default)]
pub struct ConnectionRegistry {
    connections: HashMap<String, Connection>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `user_id` to a new socket. A previous socket for the same user
    /// is told to close and its id is returned.
    pub fn register(
        &mut self,
        user_id: &str,
        id: ConnectionId,
        sender: mpsc::UnboundedSender<Outbound>,
    ) -> Option<ConnectionId> {
        let connection = Connection {
            id,
            sender,
            rooms: HashSet::new(),
        };
        let previous = self.connections.insert(user_id.to_string(), connection)?;
        let _ = previous.sender.send(Outbound::Evicted);
        Some(previous.id)
    }

    /// Removes the binding, unless it already belongs to a newer connection.
    pub fn unregister(&mut self, user_id: &str, id: ConnectionId) -> bool {
        match self.connections.get(user_id) {
            Some(connection) if connection.id == id => {
                self.connections.remove(user_id);
                true
            }
            _ => false,
        }
    }

    pub fn join_room(&mut self, user_id: &str, id: ConnectionId, room_id: RoomId) {
        if let Some(connection) = self.current_mut(user_id, id) {
            connection.rooms.insert(room_id);
        }
    }

    pub fn leave_room(&mut self, user_id: &str, id: ConnectionId, room_id: &RoomId) {
        if let Some(connection) = self.current_mut(user_id, id) {
            connection.rooms.remove(room_id);
        }
    }

    /// Connections whose membership includes `room_id`, sender included.
    pub fn members<'a>(
        &'a self,
        room_id: &'a RoomId,
    ) -> impl Iterator<Item = (&'a str, &'a Connection)> {
        self.connections
            .iter()
            .filter(move |(_, connection)| connection.rooms.contains(room_id))
            .map(|(user_id, connection)| (user_id.as_str(), connection))
    }

    /// Whether `id` is still the live connection for `user_id`.
    pub fn is_current(&self, user_id: &str, id: ConnectionId) -> bool {
        self.connections
            .get(user_id)
            .is_some_and(|connection| connection.id == id)
    }

    pub fn get(&self, user_id: &str) -> Option<&Connection> {
        self.connections.get(user_id)
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    fn current_mut(&mut self, user_id: &str, id: ConnectionId) -> Option<&mut Connection> {
        self.connections
            .get_mut(user_id)
            .filter(|connection| connection.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connect(
        registry: &mut ConnectionRegistry,
        user_id: &str,
    ) -> (ConnectionId, mpsc::UnboundedReceiver<Outbound>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = Uuid::new_v4();
        registry.register(user_id, id, tx);
        (id, rx)
    }

    #[test]
    fn second_login_evicts_first() {
        let mut registry = ConnectionRegistry::new();
        let (first, mut first_rx) = connect(&mut registry, "alice");
        let (tx, _rx) = mpsc::unbounded_channel();
        let second = Uuid::new_v4();
        assert_eq!(registry.register("alice", second, tx), Some(first));
        assert_eq!(first_rx.try_recv().unwrap(), Outbound::Evicted);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("alice").unwrap().id, second);
    }

    #[test]
    fn stale_unregister_keeps_newer_connection() {
        let mut registry = ConnectionRegistry::new();
        let (first, _first_rx) = connect(&mut registry, "alice");
        let (second, _second_rx) = connect(&mut registry, "alice");
        assert!(!registry.is_current("alice", first));
        assert!(registry.is_current("alice", second));
        assert!(!registry.unregister("alice", first));
        assert_eq!(registry.get("alice").unwrap().id, second);
        assert!(registry.unregister("alice", second));
        assert!(!registry.is_current("alice", second));
        assert!(registry.is_empty());
    }

    #[test]
    fn membership_is_idempotent() {
        let mut registry = ConnectionRegistry::new();
        let (id, _rx) = connect(&mut registry, "bob");
        let room = RoomId::new("42");
        registry.join_room("bob", id, room.clone());
        registry.join_room("bob", id, room.clone());
        assert_eq!(registry.get("bob").unwrap().rooms.len(), 1);
        registry.leave_room("bob", id, &room);
        registry.leave_room("bob", id, &room);
        assert!(registry.get("bob").unwrap().rooms.is_empty());
    }

    #[test]
    fn unknown_identity_is_a_no_op() {
        let mut registry = ConnectionRegistry::new();
        let id = Uuid::new_v4();
        registry.join_room("ghost", id, RoomId::new("1"));
        registry.leave_room("ghost", id, &RoomId::new("1"));
        assert!(!registry.unregister("ghost", id));
        assert!(registry.is_empty());
    }

    #[test]
    fn members_are_scoped_to_room() {
        let mut registry = ConnectionRegistry::new();
        let room_r = RoomId::new("r");
        let room_s = RoomId::new("s");
        let mut receivers = Vec::new();
        for user in ["a", "b", "c"] {
            let (id, rx) = connect(&mut registry, user);
            receivers.push(rx);
            registry.join_room(user, id, room_r.clone());
        }
        let (id, _rx) = connect(&mut registry, "d");
        registry.join_room("d", id, room_s.clone());

        let mut members = registry.members(&room_r).map(|(user, _)| user).collect::<Vec<_>>();
        members.sort();
        assert_eq!(members, ["a", "b", "c"]);
        assert_eq!(registry.members(&room_s).count(), 1);
    }
}
