// P-256 keypair generation, raw-point export, fixed-width signing

use p256::ecdsa::signature::Signer;
use p256::ecdsa::{Signature, SigningKey, VerifyingKey};
use rand::rngs::OsRng;

use crate::error::{AuthError, Result};
use crate::identity::RAW_POINT_LEN;

/// Signing capability injected into the client handshake.
///
/// Key custody stays behind this boundary: a software keypair, a hardware
/// token, or a remote signer only has to expose the one operation.
pub trait ChallengeSigner {
    /// Sign the raw challenge bytes, returning the 64-byte `r || s` signature.
    fn sign(&self, data: &[u8]) -> Result<[u8; 64]>;
}

impl<S: ChallengeSigner + ?Sized> ChallengeSigner for &S {
    fn sign(&self, data: &[u8]) -> Result<[u8; 64]> {
        (**self).sign(data)
    }
}

/// An ECDSA P-256 keypair held in process memory.
#[derive(Debug)]
pub struct EcdsaKeyPair {
    signing_key: SigningKey,
    verifying_key: VerifyingKey,
}

impl EcdsaKeyPair {
    /// Generate a fresh random P-256 keypair.
    pub fn generate() -> Self {
        let signing_key = SigningKey::random(&mut OsRng);
        let verifying_key = VerifyingKey::from(&signing_key);
        Self {
            signing_key,
            verifying_key,
        }
    }

    /// Reconstruct from a 32-byte big-endian secret scalar.
    pub fn from_secret_bytes(secret: &[u8; 32]) -> Result<Self> {
        let signing_key = SigningKey::from_slice(secret)
            .map_err(|e| AuthError::InvalidKey(format!("{e}")))?;
        let verifying_key = VerifyingKey::from(&signing_key);
        Ok(Self {
            signing_key,
            verifying_key,
        })
    }

    /// Access the verifying (public) key.
    pub fn verifying_key(&self) -> &VerifyingKey {
        &self.verifying_key
    }

    /// The 65-byte uncompressed SEC1 encoding `0x04 || x || y` of the
    /// public key.
    pub fn public_point_bytes(&self) -> [u8; RAW_POINT_LEN] {
        let point = self.verifying_key.to_encoded_point(false);
        let mut bytes = [0u8; RAW_POINT_LEN];
        bytes.copy_from_slice(point.as_bytes());
        bytes
    }

    /// Sign arbitrary data, returning the fixed-width `r || s` form.
    ///
    /// The data is hashed with SHA-256 internally, so raw challenge bytes go
    /// in directly, matching what WebCrypto clients produce.
    pub fn sign(&self, data: &[u8]) -> [u8; 64] {
        let sig: Signature = self.signing_key.sign(data);
        let mut bytes = [0u8; 64];
        bytes.copy_from_slice(&sig.to_bytes());
        bytes
    }
}

impl ChallengeSigner for EcdsaKeyPair {
    fn sign(&self, data: &[u8]) -> Result<[u8; 64]> {
        Ok(EcdsaKeyPair::sign(self, data))
    }
}
