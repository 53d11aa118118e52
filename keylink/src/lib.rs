//! Keylink -- async transport seam and handshake drivers for keyproof.
//!
//! The keyproof state machines are pure; this crate supplies the I/O around
//! them:
//! - a [`MessageTransport`] trait for any bidirectional text-message channel
//! - an in-memory duplex implementation for tests and examples
//! - server and client drivers that pump one handshake with read deadlines

pub mod client;
pub mod error;
pub mod server;
pub mod transport;

// Re-export key public types at crate root.
pub use client::authenticate;
pub use error::{LinkError, Result};
pub use server::{handshake, HandshakeConfig, HandshakeOutcome};
pub use transport::memory::{pair, MemoryTransport};
pub use transport::MessageTransport;
