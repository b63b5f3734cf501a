//! Wire protocol for Keel.
//!
//! Every frame on the wire is `[2-byte big-endian body length][2-byte
//! big-endian opcode][payload]`. This crate defines that contract:
//!
//! - **Codec** ([`MessageHeader`], [`decode_header`], [`decode_body`]) —
//!   pure conversions between frames and bytes. No I/O, no state.
//! - **Types** ([`Opcode`], [`InMessage`], [`OutMessage`], [`RoomId`]) —
//!   the units the session and room layers pass around.
//! - **Errors** ([`ProtocolError`]) — what can go wrong while framing.
//!
//! # Architecture
//!
//! The protocol layer sits between transport (raw bytes) and the room
//! dispatch layer. It doesn't know about sockets, rooms, or handlers —
//! it only knows how a frame is laid out.
//!
//! ```text
//! Transport (bytes) → Protocol (InMessage) → Room (handler dispatch)
//! ```

mod codec;
mod error;
mod types;

pub use codec::{decode_body, decode_header, MessageHeader};
pub use error::ProtocolError;
pub use types::{opcode, InMessage, Opcode, OutMessage, RoomId};

/// The wire contract version. Bump when the frame layout or the core
/// opcode assignments change incompatibly.
pub const PROTOCOL_VERSION: u16 = 1;
