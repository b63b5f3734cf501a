//! The handler contract: protocol logic bound to a fixed set of opcodes.

use std::collections::HashMap;
use std::fmt;

use keel_protocol::{Opcode, OutMessage, RoomId};
use keel_transport::Entity;

use crate::ClientHandle;

// ---------------------------------------------------------------------------
// CloseReason
// ---------------------------------------------------------------------------

/// Why a connection is being closed.
///
/// Recorded on every close and carried in logs — a liveness timeout must
/// be distinguishable from a transport failure when diagnosing peers
/// that keep dropping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// The heartbeat retry budget was exhausted.
    HeartbeatTimeout,
    /// The peer sent bytes that do not decode as a frame.
    ProtocolViolation,
    /// The peer declared a body above the configured per-message ceiling.
    MessageTooLarge,
    /// The peer failed authentication too many times.
    AuthFailed,
    /// The peer asked for an orderly disconnect.
    Requested,
    /// The peer closed its end of the stream at a frame boundary.
    PeerClosed,
    /// The transport failed underneath the session.
    TransportFailed,
    /// The server is shutting down.
    ServerShutdown,
    /// A server-side failure unrelated to the peer (e.g. a transition
    /// target that is not registered).
    Internal,
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::HeartbeatTimeout => "heartbeat timeout",
            Self::ProtocolViolation => "protocol violation",
            Self::MessageTooLarge => "message too large",
            Self::AuthFailed => "authentication failed",
            Self::Requested => "requested by peer",
            Self::PeerClosed => "peer closed the stream",
            Self::TransportFailed => "transport failed",
            Self::ServerShutdown => "server shutdown",
            Self::Internal => "internal server error",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// Effect
// ---------------------------------------------------------------------------

/// An action a handler wants performed.
///
/// Deliberately data, not a side-effecting call: the room actor applies
/// effects under its serialized execution, so a handler can never race
/// the dispatch loop over membership. "No effect" is the empty vec.
#[derive(Debug)]
pub enum Effect {
    /// Queue a frame for the given member connection.
    Send(Entity, OutMessage),
    /// Move the connection into another room. Applied atomically with
    /// respect to dispatch order: the connection is a member of exactly
    /// the target room before its next frame is dispatched.
    Transition(Entity, RoomId),
    /// Close the connection with the given reason.
    Close(Entity, CloseReason),
}

// ---------------------------------------------------------------------------
// RoomContext
// ---------------------------------------------------------------------------

/// Read access to the dispatching room, passed to handlers.
///
/// Handlers may look members up (e.g. to reset a liveness counter) but
/// never mutate membership directly — that is what [`Effect`]s are for.
pub struct RoomContext<'a> {
    room_id: RoomId,
    members: &'a HashMap<Entity, ClientHandle>,
}

impl<'a> RoomContext<'a> {
    /// Builds a context over a membership map. Normally done by the room
    /// actor per dispatch; public so handler tests can drive `process`
    /// without a running room.
    pub fn new(
        room_id: RoomId,
        members: &'a HashMap<Entity, ClientHandle>,
    ) -> Self {
        Self { room_id, members }
    }

    /// The id of the room this dispatch is running in.
    pub fn room_id(&self) -> RoomId {
        self.room_id
    }

    /// Looks up a member connection.
    pub fn client(&self, entity: Entity) -> Option<&ClientHandle> {
        self.members.get(&entity)
    }

    /// Number of member connections.
    pub fn member_count(&self) -> usize {
        self.members.len()
    }
}

// ---------------------------------------------------------------------------
// Handler
// ---------------------------------------------------------------------------

/// A polymorphic unit of protocol logic bound to a fixed set of opcodes.
///
/// The concrete handler set of a room is a closed enum implementing this
/// trait (exhaustive, compile-checked dispatch) rather than a trait
/// object — see the core `CoreHandler` in the `keel` crate.
///
/// `process` runs inside the owning room actor and must not block the
/// thread; awaiting an external async capability (a credential check) is
/// the only sanctioned suspension, and it serializes within the room.
pub trait Handler: Send + 'static {
    /// The opcodes this handler claims. Fixed at registration; claiming
    /// an opcode another handler owns fails table construction.
    fn opcodes(&self) -> Vec<Opcode>;

    /// Processes one inbound frame and returns the effects to apply.
    fn process(
        &mut self,
        entity: Entity,
        opcode: Opcode,
        payload: &[u8],
        ctx: &RoomContext<'_>,
    ) -> impl std::future::Future<Output = Vec<Effect>> + Send;

    /// Join-time setup when a connection enters the owning room.
    ///
    /// Invoked exactly once per enter, after the member is inserted.
    /// Only sends and closes are honored here — a transition from an
    /// enter hook would break enter atomicity and is discarded with a
    /// warning.
    fn on_client_entered(
        &mut self,
        _entity: Entity,
        _ctx: &RoomContext<'_>,
    ) -> Vec<Effect> {
        Vec::new()
    }

    /// Cleanup when a connection leaves the owning room, whether by an
    /// explicit leave or by transitioning elsewhere.
    ///
    /// Invoked after the member is removed. Session ids are never
    /// reused, so per-entity handler state must be dropped here or it
    /// accumulates for the life of the room.
    fn on_client_left(&mut self, _entity: Entity) {}
}
