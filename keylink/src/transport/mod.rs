//! The message-transport seam the handshake drivers run over.
//!
//! Production transports (a WebSocket connection or similar) implement
//! [`MessageTransport`] next to their own I/O stack; the in-memory duplex
//! shipped here backs tests and examples.

pub mod memory;

use std::io;

use async_trait::async_trait;

/// One bidirectional, message-oriented connection.
///
/// Implementations deliver whole text messages, in order, exactly once per
/// direction. `recv` resolves to `None` once the peer has closed its end.
#[async_trait]
pub trait MessageTransport: Send {
    /// Resolve once the transport is open for traffic. Transports that are
    /// born open keep the default implementation.
    async fn ready(&mut self) -> io::Result<()> {
        Ok(())
    }

    /// Send one text message to the peer.
    async fn send(&mut self, text: String) -> io::Result<()>;

    /// Receive the next text message, `None` after the peer closed.
    async fn recv(&mut self) -> io::Result<Option<String>>;

    /// Close this end. Later sends from either side fail.
    async fn close(&mut self) -> io::Result<()>;
}
