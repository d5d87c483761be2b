//! Room and its user registry
//!
//! A room maps display names to the outbound sinks of the sessions holding
//! them. Every operation takes the room's own lock for its duration only;
//! the lock is never held across an await point.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::debug;

use crate::error::AppError;
use crate::sink::Sink;
use crate::types::{DisplayName, RoomId};

/// Chat room
///
/// Names are unique within a room at any instant. Rooms are never
/// destroyed, so an empty room stays joinable.
#[derive(Debug)]
pub struct Room {
    /// Room identifier
    pub id: RoomId,
    /// Registered users: name -> sink
    members: RwLock<HashMap<DisplayName, Sink>>,
}

impl Room {
    /// Create an empty room
    pub fn new(id: RoomId) -> Self {
        Self {
            id,
            members: RwLock::new(HashMap::new()),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<DisplayName, Sink>> {
        self.members.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<DisplayName, Sink>> {
        self.members.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Remove `name` if it is still registered to `sink`
    fn remove(&self, name: &DisplayName, sink: &Sink) -> bool {
        let mut members = self.write();
        match members.get(name) {
            Some(current) if current.same_channel(sink) => {
                members.remove(name);
                true
            }
            _ => false,
        }
    }

    /// Claim a name for a session
    ///
    /// The returned guard unregisters the name when dropped.
    pub fn join(self: &Arc<Self>, name: DisplayName, sink: Sink) -> Result<Membership, AppError> {
        self.join_with(name, sink, || {})
    }

    /// Claim a name, running `admitted` before the name becomes visible
    ///
    /// `admitted` runs under the write lock, so anything it queues on the
    /// joining sink precedes every broadcast addressed to the new member.
    pub fn join_with<F>(
        self: &Arc<Self>,
        name: DisplayName,
        sink: Sink,
        admitted: F,
    ) -> Result<Membership, AppError>
    where
        F: FnOnce(),
    {
        {
            let mut members = self.write();
            if members.contains_key(&name) {
                return Err(AppError::NameConflict(name));
            }
            admitted();
            members.insert(name.clone(), sink.clone());
        }
        debug!(room = %self.id, name = %name, "Name registered");
        Ok(Membership {
            room: Arc::clone(self),
            name,
            sink,
        })
    }

    /// Names registered right now, in no particular order
    pub fn names(&self) -> Vec<DisplayName> {
        self.read().keys().cloned().collect()
    }

    /// Point-in-time copy of every registration
    pub fn snapshot(&self) -> Vec<(DisplayName, Sink)> {
        self.read()
            .iter()
            .map(|(name, sink)| (name.clone(), sink.clone()))
            .collect()
    }

    pub fn contains(&self, name: &DisplayName) -> bool {
        self.read().contains_key(name)
    }

    /// Get the number of registered users
    pub fn member_count(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }
}

/// A session's registration in a room
///
/// Exists exactly as long as the session is admitted to chat.
#[derive(Debug)]
pub struct Membership {
    room: Arc<Room>,
    name: DisplayName,
    sink: Sink,
}

impl Membership {
    pub fn room(&self) -> &Arc<Room> {
        &self.room
    }

    pub fn name(&self) -> &DisplayName {
        &self.name
    }

    pub fn sink(&self) -> &Sink {
        &self.sink
    }
}

impl Drop for Membership {
    fn drop(&mut self) {
        if self.room.remove(&self.name, &self.sink) {
            debug!(room = %self.room.id, name = %self.name, "Name released");
        }
    }
}
