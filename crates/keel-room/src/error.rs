//! Error types for the room layer.

use keel_protocol::{Opcode, RoomId};
use keel_transport::Entity;

/// Errors that can occur during room construction and operation.
#[derive(Debug, thiserror::Error)]
pub enum RoomError {
    /// Two handlers claimed the same opcode at table-build time.
    ///
    /// Always a startup-time configuration error — silently overwriting
    /// would make routing depend on registration order, so construction
    /// fails instead.
    #[error("opcode {0} registered by more than one handler")]
    DuplicateOpcode(Opcode),

    /// A room with this id is already registered.
    #[error("room {0} already exists")]
    DuplicateRoom(RoomId),

    /// The room does not exist in the directory.
    #[error("room {0} not found")]
    NotFound(RoomId),

    /// The entity is already a member of this room.
    #[error("{0} is already a member of {1}")]
    AlreadyMember(Entity, RoomId),

    /// The entity is not a member of this room.
    #[error("{0} is not a member of {1}")]
    NotMember(Entity, RoomId),

    /// The room's command channel is closed — the actor is gone.
    #[error("room {0} is unavailable")]
    Unavailable(RoomId),
}
