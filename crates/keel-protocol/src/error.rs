//! Error types for the protocol layer.

/// Errors that can occur while framing or unframing messages.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// The header bytes are missing or declare an impossible body.
    ///
    /// A body always starts with an opcode, so a declared `body_size`
    /// smaller than [`Opcode::WIDTH`](crate::Opcode::WIDTH) can never
    /// be valid.
    #[error("malformed header: {0}")]
    MalformedHeader(&'static str),

    /// The message body would not fit in the 16-bit length field.
    ///
    /// Larger logical messages must be split at a higher protocol layer;
    /// the frame format itself tops out at 65535 body bytes.
    #[error("frame overflow: body of {size} bytes exceeds the 16-bit length field")]
    FrameOverflow {
        /// The attempted body size (opcode + payload).
        size: usize,
    },
}
