//! Unified error type for the Keel server core.

use keel_protocol::ProtocolError;
use keel_room::RoomError;
use keel_session::SessionError;
use keel_transport::TransportError;

/// Top-level error that wraps all layer-specific errors.
///
/// Code built on the `keel` meta-crate deals with this single type
/// instead of importing errors from each sub-crate. The `#[from]`
/// attribute on each variant auto-generates `From` impls, so the `?`
/// operator converts sub-crate errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum KeelError {
    /// A transport-level error (accept, read, write, closed).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level error (malformed header, frame overflow).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A session-level error (authentication, backing store).
    #[error(transparent)]
    Session(#[from] SessionError),

    /// A room-level error (duplicate opcode, unknown room).
    #[error(transparent)]
    Room(#[from] RoomError),

    /// A peer declared a frame body above the configured ceiling. The
    /// body is never buffered; the connection is closed instead.
    #[error("declared body of {size} bytes exceeds the {limit} byte limit")]
    MessageTooLarge {
        /// The declared body size.
        size: usize,
        /// The configured per-message ceiling.
        limit: usize,
    },

    /// A configuration file could not be read.
    #[error("failed to read configuration: {0}")]
    ConfigRead(#[from] std::io::Error),

    /// A configuration file could not be parsed.
    #[error("failed to parse configuration: {0}")]
    ConfigParse(#[from] serde_json::Error),
}
