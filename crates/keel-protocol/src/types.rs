//! Message and identifier types shared across the stack.

use std::fmt;

use keel_transport::Entity;

use crate::{MessageHeader, ProtocolError};

// ---------------------------------------------------------------------------
// Opcode
// ---------------------------------------------------------------------------

/// Identifier at the start of a frame's body selecting which handler
/// processes it.
///
/// Two bytes, big-endian on the wire. The assignments below are part of
/// the versioned contract ([`PROTOCOL_VERSION`](crate::PROTOCOL_VERSION));
/// gameplay extensions claim ranges above the core block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Opcode(pub u16);

impl Opcode {
    /// Encoded size of an opcode on the wire.
    pub const WIDTH: usize = 2;

    /// Returns the opcode in wire byte order.
    pub fn to_be_bytes(self) -> [u8; Self::WIDTH] {
        self.0.to_be_bytes()
    }

    /// Reads an opcode from wire byte order.
    pub fn from_be_bytes(bytes: [u8; Self::WIDTH]) -> Self {
        Self(u16::from_be_bytes(bytes))
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:04X}", self.0)
    }
}

/// The core opcode assignments.
pub mod opcode {
    use super::Opcode;

    /// Liveness probe, server → client.
    pub const HEARTBEAT: Opcode = Opcode(0x0001);
    /// Liveness acknowledgement, client → server. Empty payload.
    pub const HEARTBEAT_ACK: Opcode = Opcode(0x0002);
    /// Client-requested orderly disconnect. Empty payload.
    pub const DISCONNECT: Opcode = Opcode(0x0003);

    /// Credential submission, client → server. JSON `Credentials` payload.
    pub const LOGIN: Opcode = Opcode(0x0010);
    /// Login accepted, server → client. JSON `{ "player_id": u64 }`.
    pub const LOGIN_OK: Opcode = Opcode(0x0011);
    /// Login rejected, server → client. JSON `{ "reason": string }`.
    pub const LOGIN_FAIL: Opcode = Opcode(0x0012);
}

// ---------------------------------------------------------------------------
// RoomId
// ---------------------------------------------------------------------------

/// Identifier of a dispatch domain (a room).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RoomId(pub u64);

impl RoomId {
    /// The distinguished entry room every accepted connection lands in
    /// before authentication.
    pub const ENTRY: RoomId = RoomId(0);
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "room-{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// InMessage
// ---------------------------------------------------------------------------

/// A decoded inbound unit: one frame, tagged with its sender.
///
/// Transient — constructed by the connection's read loop and consumed by
/// exactly one handler dispatch.
#[derive(Debug)]
pub struct InMessage {
    /// The connection this frame arrived on.
    pub entity: Entity,
    /// Which handler this frame selects.
    pub opcode: Opcode,
    /// The frame body after the opcode.
    pub payload: Vec<u8>,
}

impl InMessage {
    /// Creates an inbound message.
    pub fn new(entity: Entity, opcode: Opcode, payload: Vec<u8>) -> Self {
        Self {
            entity,
            opcode,
            payload,
        }
    }
}

// ---------------------------------------------------------------------------
// OutMessage
// ---------------------------------------------------------------------------

/// A ready-to-send unit: one contiguous `header ++ opcode ++ payload`
/// buffer, built once and immutable after construction.
#[derive(Debug, Clone)]
pub struct OutMessage {
    data: Vec<u8>,
}

impl OutMessage {
    /// Builds a frame around `payload`.
    ///
    /// # Errors
    /// Returns [`ProtocolError::FrameOverflow`] when the body (opcode +
    /// payload) would not fit the 16-bit length field. Splitting larger
    /// messages is a higher layer's responsibility.
    pub fn new(op: Opcode, payload: &[u8]) -> Result<Self, ProtocolError> {
        let body_size = Opcode::WIDTH + payload.len();
        if body_size > u16::MAX as usize {
            return Err(ProtocolError::FrameOverflow { size: body_size });
        }

        let header = MessageHeader {
            body_size: body_size as u16,
        };
        let mut prefix = [0u8; MessageHeader::SIZE];
        header.serialize(&mut prefix);

        let mut data = Vec::with_capacity(MessageHeader::SIZE + body_size);
        data.extend_from_slice(&prefix);
        data.extend_from_slice(&op.to_be_bytes());
        data.extend_from_slice(payload);

        Ok(Self { data })
    }

    /// The complete wire buffer, header included.
    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    /// The body length this frame declares.
    pub fn body_size(&self) -> u16 {
        (self.data.len() - MessageHeader::SIZE) as u16
    }

    /// The opcode this frame carries.
    pub fn opcode(&self) -> Opcode {
        // Construction wrote these two bytes; they are always present.
        let bytes: [u8; Opcode::WIDTH] = self.data
            [MessageHeader::SIZE..MessageHeader::SIZE + Opcode::WIDTH]
            .try_into()
            .expect("frame has an opcode");
        Opcode::from_be_bytes(bytes)
    }
}
