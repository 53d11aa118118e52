// Challenge generation: fixed-size random material from the OS CSPRNG

use base64::prelude::*;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};

use crate::error::{AuthError, Result};

/// Number of random bytes in a handshake challenge.
pub const CHALLENGE_LEN: usize = 128;

/// A single-use random challenge.
///
/// Generated fresh per handshake attempt, held in memory only until a
/// verdict is produced, never persisted or reused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Challenge {
    bytes: [u8; CHALLENGE_LEN],
}

impl Challenge {
    /// Draw a fresh challenge from the OS random source.
    ///
    /// Entropy failure is a fatal local error; it must never be reported to
    /// the remote peer as a wire message.
    pub fn generate() -> Result<Self> {
        let mut bytes = [0u8; CHALLENGE_LEN];
        OsRng
            .try_fill_bytes(&mut bytes)
            .map_err(|e| AuthError::InsufficientEntropy(format!("{e}")))?;
        Ok(Self { bytes })
    }

    /// Wrap fixed bytes. Deterministic handshakes for tests.
    pub fn from_bytes(bytes: [u8; CHALLENGE_LEN]) -> Self {
        Self { bytes }
    }

    /// The raw challenge bytes. This is what the client signs.
    pub fn bytes(&self) -> &[u8; CHALLENGE_LEN] {
        &self.bytes
    }

    /// SHA-256 of the raw bytes. This is what verification checks against.
    pub fn digest(&self) -> [u8; 32] {
        let hash = Sha256::digest(self.bytes);
        let mut digest = [0u8; 32];
        digest.copy_from_slice(&hash);
        digest
    }

    /// Standard padded base64 of the raw bytes, the CHALLENGE payload.
    pub fn to_base64(&self) -> String {
        BASE64_STANDARD.encode(self.bytes)
    }
}
