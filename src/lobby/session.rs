//! Connection to room index

use std::collections::HashMap;

use uuid::Uuid;

/// Which room each connection currently occupies
#[derive(Debug, Default)]
pub struct SessionIndex {
    rooms_by_connection: HashMap<Uuid, String>,
}

impl SessionIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach(&mut self, connection_id: Uuid, code: &str) {
        self.rooms_by_connection.insert(connection_id, code.to_string());
    }

    /// Forget a connection's room, returning the code it held
    pub fn detach(&mut self, connection_id: Uuid) -> Option<String> {
        self.rooms_by_connection.remove(&connection_id)
    }

    pub fn room_of(&self, connection_id: Uuid) -> Option<&str> {
        self.rooms_by_connection.get(&connection_id).map(String::as_str)
    }

    /// Number of connections seated in a room
    pub fn len(&self) -> usize {
        self.rooms_by_connection.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms_by_connection.is_empty()
    }
}
