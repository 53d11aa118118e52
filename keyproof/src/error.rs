// Keyproof error types

use thiserror::Error;

/// Top-level error type for the keyproof crate.
#[derive(Debug, Error)]
pub enum AuthError {
    // ── Identity errors ─────────────────────────────────────────────────
    #[error("malformed client identifier: {0}")]
    MalformedIdentity(String),

    #[error("invalid key material: {0}")]
    InvalidKey(String),

    // ── Crypto errors ───────────────────────────────────────────────────
    #[error("challenge entropy unavailable: {0}")]
    InsufficientEntropy(String),

    #[error("signing failed: {0}")]
    Signing(String),

    #[error("signature verification failed")]
    SignatureVerification,

    // ── Wire errors ─────────────────────────────────────────────────────
    #[error("malformed envelope: {0}")]
    InvalidEnvelope(#[from] serde_json::Error),

    #[error("invalid {kind} payload: {detail}")]
    InvalidPayload { kind: String, detail: String },

    // ── Handshake errors ────────────────────────────────────────────────
    #[error("expected a {expected} message, got {got}")]
    UnexpectedMessage { expected: String, got: String },

    #[error("handshake rejected: {0}")]
    Rejected(String),

    #[error("handshake already terminal in state {0}")]
    AlreadyTerminal(String),
}

/// Crate-level result alias.
pub type Result<T> = std::result::Result<T, AuthError>;
