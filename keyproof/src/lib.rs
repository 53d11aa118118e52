// Keyproof — public-key challenge-response authentication.
//
// Crate root: module declarations and public re-exports. The client proves
// possession of a P-256 private key by signing a server-issued random
// challenge; both sides run small exhaustive state machines over a tagged
// JSON message grammar. This crate is transport-free; drivers live in the
// keylink crate.

pub mod error;
pub mod identity;
pub mod crypto;
pub mod wire;
pub mod handshake;

// Re-export key types at crate root for convenience.
pub use error::{AuthError, Result};
pub use identity::{ClientIdentity, CurveKind};
pub use crypto::challenge::Challenge;
pub use crypto::keys::{ChallengeSigner, EcdsaKeyPair};
pub use handshake::client::{ClientAction, ClientHandshake, ClientState};
pub use handshake::server::{ServerHandshake, ServerState};
pub use handshake::Verdict;
pub use wire::{Envelope, Message, MessageKind, ResponsePayload};
