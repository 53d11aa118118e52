use thiserror::Error;

/// All errors produced by the keylink drivers.
#[derive(Debug, Error)]
pub enum LinkError {
    /// The peer closed the transport before the handshake finished.
    #[error("transport closed before the handshake completed")]
    ConnectionClosed,

    /// No message arrived within the configured read deadline.
    #[error("handshake timed out")]
    HandshakeTimeout,

    /// The transport itself failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The handshake machinery reported a local fault.
    #[error("handshake failed: {0}")]
    Auth(#[from] keyproof::AuthError),
}

pub type Result<T> = std::result::Result<T, LinkError>;
