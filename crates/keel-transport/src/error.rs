/// Errors that can occur in the transport layer.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The peer closed the connection (EOF mid-read or reset).
    #[error("connection closed by peer")]
    Closed,

    /// Reading from the stream failed.
    #[error("read failed: {0}")]
    ReadFailed(#[source] std::io::Error),

    /// Writing to the stream failed.
    #[error("write failed: {0}")]
    WriteFailed(#[source] std::io::Error),

    /// Binding or accepting connections failed.
    #[error("accept failed: {0}")]
    AcceptFailed(#[source] std::io::Error),
}
