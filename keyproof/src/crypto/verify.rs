// Fixed-width ECDSA signature verification against a challenge digest

use p256::ecdsa::signature::hazmat::PrehashVerifier;
use p256::ecdsa::{Signature, VerifyingKey};

use crate::error::{AuthError, Result};

/// Length of a fixed-width `r || s` signature on P-256.
pub const SIGNATURE_LEN: usize = 64;

/// Verify a 64-byte `r || s` signature against a SHA-256 digest.
///
/// The two halves are big-endian unsigned scalars, never DER. A structurally
/// unusable pair (zero or out-of-range scalar) fails identically to a wrong
/// signature.
pub fn verify_signature(
    key: &VerifyingKey,
    digest: &[u8; 32],
    signature: &[u8; SIGNATURE_LEN],
) -> Result<()> {
    let sig = Signature::from_slice(signature).map_err(|_| AuthError::SignatureVerification)?;
    key.verify_prehash(digest, &sig)
        .map_err(|_| AuthError::SignatureVerification)
}
