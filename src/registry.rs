//! Process-wide room registry
//!
//! Maps room identifiers to rooms. Built once at server start and shared
//! with every session task. Entries are created on demand and never removed.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use tracing::{debug, info};

use crate::error::AppError;
use crate::room::Room;
use crate::types::RoomId;

/// Registry of all rooms
#[derive(Debug, Default)]
pub struct RoomRegistry {
    rooms: RwLock<HashMap<RoomId, Arc<Room>>>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a room that must not exist yet
    ///
    /// Check and insert happen under one write lock, so of two racing
    /// creations of the same id exactly one succeeds.
    pub fn create(&self, id: RoomId) -> Result<Arc<Room>, AppError> {
        let mut rooms = self.rooms.write().unwrap_or_else(PoisonError::into_inner);
        if rooms.contains_key(&id) {
            return Err(AppError::RoomConflict(id));
        }

        let room = Arc::new(Room::new(id.clone()));
        rooms.insert(id.clone(), Arc::clone(&room));
        info!(room = %id, total_rooms = rooms.len(), "Room created");
        Ok(room)
    }

    /// Look up an existing room
    pub fn open(&self, id: &RoomId) -> Result<Arc<Room>, AppError> {
        let room = self.get(id).ok_or_else(|| AppError::RoomConflict(id.clone()))?;
        debug!(room = %id, members = room.member_count(), "Room opened");
        Ok(room)
    }

    pub fn get(&self, id: &RoomId) -> Option<Arc<Room>> {
        self.rooms
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }

    pub fn contains(&self, id: &RoomId) -> bool {
        self.rooms
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(id)
    }

    /// Get the number of rooms ever created
    pub fn room_count(&self) -> usize {
        self.rooms.read().unwrap_or_else(PoisonError::into_inner).len()
    }
}
