// Client identifier codec: scheme tag plus base64-encoded raw EC point

use std::fmt;

use base64::prelude::*;
use p256::ecdsa::VerifyingKey;

use crate::error::{AuthError, Result};

/// Scheme tag of the only supported identifier format: a raw uncompressed
/// WebCrypto EC point on P-256.
pub const P256_SCHEME: &str = "WebCrypto-raw.EC.P-256";

/// Length of an uncompressed SEC1 P-256 point: `0x04 || x || y`.
pub const RAW_POINT_LEN: usize = 65;

const UNCOMPRESSED_TAG: u8 = 0x04;

/// Elliptic curve named by an identifier's scheme tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CurveKind {
    /// NIST P-256 (secp256r1).
    P256,
}

impl CurveKind {
    /// Curve name as it appears in the scheme tag.
    pub const fn name(self) -> &'static str {
        match self {
            CurveKind::P256 => "P-256",
        }
    }

    /// Full scheme tag carried by identifiers on this curve.
    pub const fn scheme(self) -> &'static str {
        match self {
            CurveKind::P256 => P256_SCHEME,
        }
    }
}

/// A claimed public key, parsed from or encodable to the wire identifier
/// `WebCrypto-raw.EC.P-256$<base64 of the 65-byte point>`.
///
/// Constructed once per connection attempt and immutable afterwards. The
/// scheme rides inside the identifier itself, so the server can reject an
/// unsupported key type before doing any cryptographic work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIdentity {
    curve: CurveKind,
    key: VerifyingKey,
}

impl ClientIdentity {
    /// Wrap an already-validated P-256 verifying key.
    pub fn from_verifying_key(key: VerifyingKey) -> Self {
        Self {
            curve: CurveKind::P256,
            key,
        }
    }

    /// The curve this identity claims.
    pub fn curve(&self) -> CurveKind {
        self.curve
    }

    /// The parsed public key.
    pub fn verifying_key(&self) -> &VerifyingKey {
        &self.key
    }

    /// The 65-byte uncompressed point `0x04 || x || y`.
    pub fn point_bytes(&self) -> [u8; RAW_POINT_LEN] {
        let point = self.key.to_encoded_point(false);
        let mut bytes = [0u8; RAW_POINT_LEN];
        bytes.copy_from_slice(point.as_bytes());
        bytes
    }

    /// Encode to the wire identifier string. Standard base64 with padding,
    /// no wrapping.
    pub fn encode(&self) -> String {
        format!(
            "{}${}",
            self.curve.scheme(),
            BASE64_STANDARD.encode(self.point_bytes())
        )
    }

    /// Parse a wire identifier string.
    ///
    /// Checks run in order: exactly one `$` separator, supported scheme tag,
    /// valid base64, 65-byte decoded length, leading `0x04` marker, and
    /// coordinates that name a point on the curve. Every failure is a
    /// [`AuthError::MalformedIdentity`].
    pub fn decode(identifier: &str) -> Result<Self> {
        let parts: Vec<&str> = identifier.split('$').collect();
        if parts.len() != 2 {
            return Err(AuthError::MalformedIdentity(format!(
                "expected exactly one '$' separator, found {}",
                parts.len() - 1
            )));
        }
        if parts[0] != P256_SCHEME {
            return Err(AuthError::MalformedIdentity(format!(
                "unsupported scheme {:?}, expected {P256_SCHEME}",
                parts[0]
            )));
        }
        let raw = BASE64_STANDARD.decode(parts[1]).map_err(|e| {
            AuthError::MalformedIdentity(format!("key material is not valid base64: {e}"))
        })?;
        if raw.len() != RAW_POINT_LEN {
            return Err(AuthError::MalformedIdentity(format!(
                "expected a {RAW_POINT_LEN} byte point, got {} bytes",
                raw.len()
            )));
        }
        if raw[0] != UNCOMPRESSED_TAG {
            return Err(AuthError::MalformedIdentity(format!(
                "expected uncompressed point marker 0x04, got 0x{:02x}",
                raw[0]
            )));
        }
        let key = VerifyingKey::from_sec1_bytes(&raw)
            .map_err(|e| AuthError::MalformedIdentity(format!("point is not on P-256: {e}")))?;
        Ok(Self {
            curve: CurveKind::P256,
            key,
        })
    }
}

impl fmt::Display for ClientIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}
