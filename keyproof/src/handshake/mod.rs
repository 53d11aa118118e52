// Handshake module declarations

pub mod client;
pub mod server;

/// Terminal outcome of a handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// The peer proved possession of the claimed key.
    Authenticated,
    /// The handshake failed.
    Rejected,
}
