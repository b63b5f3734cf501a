//! The frame codec: pure functions between frames and bytes.
//!
//! All multi-byte fields travel in network (big-endian) byte order. The
//! conversions go through `u16::to_be_bytes` / `from_be_bytes`, which are
//! a byte swap on little-endian hosts and a pass-through on big-endian
//! ones — the wire bytes are identical either way.

use crate::{Opcode, ProtocolError};

/// The fixed-size prefix of every frame: the body length in bytes.
///
/// The body is everything after the header — opcode plus payload — so
/// `body_size` is bounded below by [`Opcode::WIDTH`] and above by the
/// 16-bit field itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageHeader {
    /// Length of the body (opcode + payload) in bytes.
    pub body_size: u16,
}

impl MessageHeader {
    /// Encoded size of the header on the wire.
    pub const SIZE: usize = 2;

    /// Writes the header into `target` in wire byte order.
    pub fn serialize(&self, target: &mut [u8; Self::SIZE]) {
        *target = self.body_size.to_be_bytes();
    }

    /// Reads a header from two wire bytes.
    pub fn deserialize(source: [u8; Self::SIZE]) -> Self {
        Self {
            body_size: u16::from_be_bytes(source),
        }
    }
}

/// Decodes a frame header from the start of `bytes`.
///
/// # Errors
/// Returns [`ProtocolError::MalformedHeader`] if fewer than
/// [`MessageHeader::SIZE`] bytes are available (buffering enough bytes is
/// the caller's job), or if the declared body could not even hold an
/// opcode.
pub fn decode_header(bytes: &[u8]) -> Result<MessageHeader, ProtocolError> {
    let prefix: [u8; MessageHeader::SIZE] = bytes
        .get(..MessageHeader::SIZE)
        .and_then(|b| b.try_into().ok())
        .ok_or(ProtocolError::MalformedHeader("short header"))?;

    let header = MessageHeader::deserialize(prefix);
    if (header.body_size as usize) < Opcode::WIDTH {
        return Err(ProtocolError::MalformedHeader(
            "declared body smaller than an opcode",
        ));
    }
    Ok(header)
}

/// Splits a frame body into its opcode and payload.
///
/// `body` is the exact `body_size` bytes that followed the header.
///
/// # Errors
/// Returns [`ProtocolError::MalformedHeader`] if the body is too short to
/// contain an opcode — which a validated header rules out, but this
/// function makes no assumptions about its caller.
pub fn decode_body(body: &[u8]) -> Result<(Opcode, &[u8]), ProtocolError> {
    let (op, payload) = body
        .split_at_checked(Opcode::WIDTH)
        .ok_or(ProtocolError::MalformedHeader("body shorter than opcode"))?;

    // split_at_checked guarantees exactly Opcode::WIDTH bytes here.
    let op: [u8; Opcode::WIDTH] = op.try_into().expect("exact split");
    Ok((Opcode::from_be_bytes(op), payload))
}
