//! Registry of live rooms keyed by their shareable code

use std::collections::HashMap;

use rand::Rng;

use super::room::Room;

/// Generate a random 6-digit room code
pub fn random_room_code<R: Rng + ?Sized>(rng: &mut R) -> String {
    rng.gen_range(100_000..1_000_000u32).to_string()
}

/// Draw codes from `next_code` until one is not held by a live room
pub fn unique_room_code(existing: &HashMap<String, Room>, mut next_code: impl FnMut() -> String) -> String {
    loop {
        let code = next_code();
        if !existing.contains_key(&code) {
            return code;
        }
    }
}

/// All live rooms. Removal is final; there is no soft delete.
#[derive(Debug, Default)]
pub struct RoomRegistry {
    rooms: HashMap<String, Room>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self {
            rooms: HashMap::new(),
        }
    }

    /// Insert a room under a fresh random code and return the code
    pub fn create<R: Rng + ?Sized>(&mut self, rng: &mut R, build: impl FnOnce(String) -> Room) -> String {
        self.create_with_codes(|| random_room_code(&mut *rng), build)
    }

    /// Insert a room under the first code from `next_code` that is free
    pub fn create_with_codes(
        &mut self,
        next_code: impl FnMut() -> String,
        build: impl FnOnce(String) -> Room,
    ) -> String {
        let code = unique_room_code(&self.rooms, next_code);
        self.rooms.insert(code.clone(), build(code.clone()));
        code
    }

    pub fn get(&self, code: &str) -> Option<&Room> {
        self.rooms.get(code)
    }

    pub fn get_mut(&mut self, code: &str) -> Option<&mut Room> {
        self.rooms.get_mut(code)
    }

    pub fn remove(&mut self, code: &str) -> Option<Room> {
        self.rooms.remove(code)
    }

    pub fn contains(&self, code: &str) -> bool {
        self.rooms.contains_key(code)
    }

    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }

    /// Total seated players across all rooms
    pub fn total_players(&self) -> usize {
        self.rooms.values().map(|r| r.members.len()).sum()
    }
}
