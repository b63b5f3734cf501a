//! The room directory: the `RoomId → RoomHandle` registry.

use std::collections::HashMap;

use keel_protocol::RoomId;
use tokio::sync::RwLock;

use crate::{RoomError, RoomHandle};

/// Tracks every live room in the server.
///
/// Handles are cheap clones of a room's command sender, so lookups copy
/// them out and the lock is never held across an await into a room
/// actor. Registration is rare (startup, new gameplay domains);
/// transition-time lookups are the hot path, hence the read/write lock.
#[derive(Default)]
pub struct RoomDirectory {
    rooms: RwLock<HashMap<RoomId, RoomHandle>>,
}

impl RoomDirectory {
    /// Creates an empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a room.
    ///
    /// # Errors
    /// Returns [`RoomError::DuplicateRoom`] if the id is taken — room
    /// ids, like opcodes, are a fixed configuration, and colliding ones
    /// are a startup error.
    pub async fn register(&self, handle: RoomHandle) -> Result<(), RoomError> {
        let mut rooms = self.rooms.write().await;
        let room_id = handle.room_id();
        if rooms.contains_key(&room_id) {
            return Err(RoomError::DuplicateRoom(room_id));
        }
        rooms.insert(room_id, handle);
        tracing::info!(%room_id, "room registered");
        Ok(())
    }

    /// Looks up a room's handle.
    pub async fn get(&self, room_id: RoomId) -> Result<RoomHandle, RoomError> {
        self.rooms
            .read()
            .await
            .get(&room_id)
            .cloned()
            .ok_or(RoomError::NotFound(room_id))
    }

    /// Removes a room and shuts its actor down.
    pub async fn remove(&self, room_id: RoomId) -> Result<(), RoomError> {
        let handle = self
            .rooms
            .write()
            .await
            .remove(&room_id)
            .ok_or(RoomError::NotFound(room_id))?;
        let _ = handle.shutdown().await;
        tracing::info!(%room_id, "room removed");
        Ok(())
    }

    /// Number of registered rooms.
    pub async fn len(&self) -> usize {
        self.rooms.read().await.len()
    }

    /// Returns `true` if no rooms are registered.
    pub async fn is_empty(&self) -> bool {
        self.rooms.read().await.is_empty()
    }
}
