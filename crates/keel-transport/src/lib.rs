//! Transport abstraction layer for Keel.
//!
//! Provides the [`Transport`] and [`Connection`] traits that abstract over
//! the byte stream beneath the framing layer. The framing protocol never
//! sees anything below "read exactly N bytes" / "write all of these bytes",
//! so a TLS stream can slot in beneath it as just another implementation.
//!
//! # Feature Flags
//!
//! - `tcp` (default) — plain TCP transport via `tokio::net`

#![allow(async_fn_in_trait)]

mod error;
#[cfg(feature = "tcp")]
mod tcp;

pub use error::TransportError;
#[cfg(feature = "tcp")]
pub use tcp::{TcpConnection, TcpReader, TcpTransport, TcpWriter};

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counter for allocating entity handles.
static NEXT_ENTITY: AtomicU64 = AtomicU64::new(1);

/// Opaque identifier for a connected session.
///
/// Allocated from a process-wide monotonic counter, so a handle is never
/// reused while its connection is alive — nor, in practice, afterwards
/// (the 64-bit space outlives any server process). Dispatch code can
/// therefore treat a stale `Entity` as simply absent rather than as a
/// different live connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Entity(u64);

impl Entity {
    /// Allocates the next unused entity handle.
    pub fn next() -> Self {
        Self(NEXT_ENTITY.fetch_add(1, Ordering::Relaxed))
    }

    /// Creates an `Entity` from a raw `u64`.
    pub fn from_raw(id: u64) -> Self {
        Self(id)
    }

    /// Returns the underlying `u64` value.
    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "entity-{}", self.0)
    }
}

/// Accepts new incoming connections.
pub trait Transport: Send + 'static {
    /// The connection type produced by this transport.
    type Connection: Connection;
    /// The error type for transport operations.
    type Error: std::error::Error + Send + Sync;

    /// Waits for and accepts the next incoming connection.
    async fn accept(&mut self) -> Result<Self::Connection, Self::Error>;

    /// Returns the local address the transport is bound to.
    fn local_addr(&self) -> std::io::Result<std::net::SocketAddr>;
}

/// An accepted byte-stream connection.
///
/// Splitting yields independently owned read and write halves so a session
/// can run its read loop and its write queue in separate tasks. Dropping
/// both halves closes the underlying stream.
pub trait Connection: Send + 'static {
    /// The error type for connection operations.
    type Error: std::error::Error + Send + Sync;
    /// Owned read half.
    type Reader: ConnectionReader<Error = Self::Error>;
    /// Owned write half.
    type Writer: ConnectionWriter<Error = Self::Error>;

    /// Splits the connection into its read and write halves.
    fn split(self) -> (Self::Reader, Self::Writer);

    /// Returns the remote peer's address.
    fn peer_addr(&self) -> std::io::Result<std::net::SocketAddr>;
}

/// The receiving half of a [`Connection`].
pub trait ConnectionReader: Send + 'static {
    /// The error type for read operations.
    type Error: std::error::Error + Send + Sync;

    /// Reads exactly `buf.len()` bytes, suspending until complete.
    ///
    /// Returns [`TransportError::Closed`]-equivalent when the peer hangs
    /// up before the buffer is filled.
    async fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), Self::Error>;
}

/// The sending half of a [`Connection`].
pub trait ConnectionWriter: Send + 'static {
    /// The error type for write operations.
    type Error: std::error::Error + Send + Sync;

    /// Writes the entire buffer, suspending until it is accepted by the OS.
    async fn write_all(&mut self, data: &[u8]) -> Result<(), Self::Error>;
}
