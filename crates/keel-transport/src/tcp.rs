//! Plain TCP transport built on `tokio::net`.
//!
//! Bound through `TcpSocket` rather than `TcpListener::bind` so the
//! configured listen backlog is actually applied. `TCP_NODELAY` is set on
//! every accepted stream when requested — frames here are small and
//! latency-sensitive, so Nagle buffering is usually unwanted.

use std::net::SocketAddr;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpSocket, TcpStream};

use crate::{Connection, ConnectionReader, ConnectionWriter, Transport, TransportError};

/// A TCP-based [`Transport`] that listens for incoming connections.
pub struct TcpTransport {
    listener: TcpListener,
    no_delay: bool,
}

impl TcpTransport {
    /// Binds to `addr` with the given listen backlog.
    ///
    /// `no_delay` is applied to each accepted stream, not the listener.
    pub fn bind(
        addr: SocketAddr,
        backlog: u32,
        no_delay: bool,
    ) -> Result<Self, TransportError> {
        let socket = if addr.is_ipv4() {
            TcpSocket::new_v4()
        } else {
            TcpSocket::new_v6()
        }
        .map_err(TransportError::AcceptFailed)?;

        socket
            .set_reuseaddr(true)
            .map_err(TransportError::AcceptFailed)?;
        socket.bind(addr).map_err(TransportError::AcceptFailed)?;

        let listener = socket
            .listen(backlog)
            .map_err(TransportError::AcceptFailed)?;
        tracing::info!(%addr, backlog, "TCP transport listening");

        Ok(Self { listener, no_delay })
    }
}

impl Transport for TcpTransport {
    type Connection = TcpConnection;
    type Error = TransportError;

    async fn accept(&mut self) -> Result<Self::Connection, Self::Error> {
        let (stream, peer) = self
            .listener
            .accept()
            .await
            .map_err(TransportError::AcceptFailed)?;

        if self.no_delay {
            stream
                .set_nodelay(true)
                .map_err(TransportError::AcceptFailed)?;
        }

        tracing::debug!(%peer, "accepted TCP connection");
        Ok(TcpConnection { stream })
    }

    fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }
}

/// A single accepted TCP connection.
pub struct TcpConnection {
    stream: TcpStream,
}

impl Connection for TcpConnection {
    type Error = TransportError;
    type Reader = TcpReader;
    type Writer = TcpWriter;

    fn split(self) -> (TcpReader, TcpWriter) {
        let (read, write) = self.stream.into_split();
        (TcpReader { inner: read }, TcpWriter { inner: write })
    }

    fn peer_addr(&self) -> std::io::Result<SocketAddr> {
        self.stream.peer_addr()
    }
}

/// Owned read half of a [`TcpConnection`].
pub struct TcpReader {
    inner: OwnedReadHalf,
}

impl ConnectionReader for TcpReader {
    type Error = TransportError;

    async fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), Self::Error> {
        match self.inner.read_exact(buf).await {
            Ok(_) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                Err(TransportError::Closed)
            }
            Err(e) if e.kind() == std::io::ErrorKind::ConnectionReset => {
                Err(TransportError::Closed)
            }
            Err(e) => Err(TransportError::ReadFailed(e)),
        }
    }
}

/// Owned write half of a [`TcpConnection`].
pub struct TcpWriter {
    inner: OwnedWriteHalf,
}

impl ConnectionWriter for TcpWriter {
    type Error = TransportError;

    async fn write_all(&mut self, data: &[u8]) -> Result<(), Self::Error> {
        self.inner
            .write_all(data)
            .await
            .map_err(TransportError::WriteFailed)
    }
}
