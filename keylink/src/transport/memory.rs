//! In-memory duplex transport over bounded channels.

use std::io;

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::MessageTransport;

/// One end of an in-memory duplex connection.
#[derive(Debug)]
pub struct MemoryTransport {
    tx: Option<mpsc::Sender<String>>,
    rx: mpsc::Receiver<String>,
}

/// Create a connected pair of in-memory transports, each direction buffering
/// up to `capacity` messages (clamped to at least one).
pub fn pair(capacity: usize) -> (MemoryTransport, MemoryTransport) {
    let capacity = capacity.max(1);
    let (tx_a, rx_b) = mpsc::channel(capacity);
    let (tx_b, rx_a) = mpsc::channel(capacity);
    (
        MemoryTransport {
            tx: Some(tx_a),
            rx: rx_a,
        },
        MemoryTransport {
            tx: Some(tx_b),
            rx: rx_b,
        },
    )
}

#[async_trait]
impl MessageTransport for MemoryTransport {
    async fn send(&mut self, text: String) -> io::Result<()> {
        let tx = self.tx.as_ref().ok_or_else(closed_pipe)?;
        tx.send(text).await.map_err(|_| closed_pipe())
    }

    async fn recv(&mut self) -> io::Result<Option<String>> {
        Ok(self.rx.recv().await)
    }

    async fn close(&mut self) -> io::Result<()> {
        // Dropping the sender is what the peer observes as end-of-stream;
        // closing the receiver fails the peer's later sends.
        self.tx = None;
        self.rx.close();
        Ok(())
    }
}

fn closed_pipe() -> io::Error {
    io::Error::new(io::ErrorKind::BrokenPipe, "transport closed")
}
