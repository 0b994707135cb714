//! # Identity Addresses
//!
//! An [`Identity`] is the opaque principal every registry and vault
//! operation is keyed by: a 20-byte address, rendered as `0x`-prefixed
//! lowercase hex. The system never creates identities; callers arrive
//! already authenticated by the surrounding session layer.
//!
//! Addresses can be derived from an Ed25519 verifying key:
//!
//! ```text
//! public_key (32 bytes)
//!     -> BLAKE3(public_key) -> 32 bytes
//!     -> last 20 bytes      -> address
//! ```
//!
//! ## Field encoding
//!
//! The attestation circuit binds a proof to an identity through its
//! `externalNullifier` public signal, which must equal
//! [`Identity::to_field`]: the big-endian integer value of the 20 address
//! bytes. 160 bits always fit below the BN254 scalar modulus, so the
//! encoding is injective.

use std::fmt;
use std::str::FromStr;

use ark_bn254::Fr;
use ark_ff::PrimeField;
use ed25519_dalek::VerifyingKey;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

use crate::config::IDENTITY_LENGTH;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors that can occur while parsing an identity.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum IdentityError {
    /// The string is not valid hex.
    #[error("invalid identity hex: {0}")]
    InvalidHex(String),

    /// The decoded address has the wrong length.
    #[error("invalid identity length: expected {expected} bytes, got {got}")]
    InvalidLength {
        /// Expected number of bytes.
        expected: usize,
        /// Actual number of bytes.
        got: usize,
    },

    /// The bytes are not a valid Ed25519 verifying key.
    #[error("invalid ed25519 public key: {0}")]
    InvalidPublicKey(String),
}

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// A 20-byte account address.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Identity([u8; IDENTITY_LENGTH]);

impl Identity {
    /// Wrap raw address bytes.
    pub const fn from_bytes(bytes: [u8; IDENTITY_LENGTH]) -> Self {
        Self(bytes)
    }

    /// Derive the address of an Ed25519 verifying key.
    pub fn from_public_key(key: &VerifyingKey) -> Self {
        let digest = blake3::hash(key.as_bytes());
        let mut bytes = [0u8; IDENTITY_LENGTH];
        bytes.copy_from_slice(&digest.as_bytes()[32 - IDENTITY_LENGTH..]);
        Self(bytes)
    }

    /// Derive the address of a hex-encoded Ed25519 verifying key
    /// (`0x` optional).
    pub fn from_public_key_hex(s: &str) -> Result<Self, IdentityError> {
        let trimmed = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(trimmed).map_err(|e| IdentityError::InvalidHex(e.to_string()))?;
        let raw: [u8; 32] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| IdentityError::InvalidLength {
                expected: 32,
                got: bytes.len(),
            })?;
        let key = VerifyingKey::from_bytes(&raw)
            .map_err(|e| IdentityError::InvalidPublicKey(e.to_string()))?;
        Ok(Self::from_public_key(&key))
    }

    /// Raw address bytes. Also used as the ledger key.
    pub fn as_bytes(&self) -> &[u8; IDENTITY_LENGTH] {
        &self.0
    }

    /// The numeric encoding the circuit commits to as `externalNullifier`.
    pub fn to_field(&self) -> Fr {
        Fr::from_be_bytes_mod_order(&self.0)
    }

    /// `0x`-prefixed lowercase hex.
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }

    /// Decode a ledger key back into an identity.
    pub(crate) fn from_key(key: &[u8]) -> Result<Self, IdentityError> {
        let bytes: [u8; IDENTITY_LENGTH] =
            key.try_into().map_err(|_| IdentityError::InvalidLength {
                expected: IDENTITY_LENGTH,
                got: key.len(),
            })?;
        Ok(Self(bytes))
    }
}

impl FromStr for Identity {
    type Err = IdentityError;

    /// Accepts hex with or without the `0x` prefix.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(trimmed).map_err(|e| IdentityError::InvalidHex(e.to_string()))?;
        Self::from_key(&bytes)
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Identity({})", self.to_hex())
    }
}

impl Serialize for Identity {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Identity {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::SigningKey;
    use rand::rngs::OsRng;

    #[test]
    fn hex_round_trip() {
        let id = Identity::from_bytes([0xAB; IDENTITY_LENGTH]);
        let text = id.to_string();
        assert!(text.starts_with("0x"));
        assert_eq!(text.len(), 2 + 2 * IDENTITY_LENGTH);
        assert_eq!(text.parse::<Identity>().unwrap(), id);
    }

    #[test]
    fn prefix_is_optional() {
        let with: Identity = "0x00112233445566778899aabbccddeeff00112233".parse().unwrap();
        let without: Identity = "00112233445566778899aabbccddeeff00112233".parse().unwrap();
        assert_eq!(with, without);
    }

    #[test]
    fn wrong_length_rejected() {
        let err = "0x0011".parse::<Identity>().unwrap_err();
        assert_eq!(
            err,
            IdentityError::InvalidLength {
                expected: IDENTITY_LENGTH,
                got: 2
            }
        );
    }

    #[test]
    fn bad_hex_rejected() {
        assert!(matches!(
            "0xzz".parse::<Identity>(),
            Err(IdentityError::InvalidHex(_))
        ));
    }

    #[test]
    fn field_encoding_is_big_endian_integer() {
        let mut bytes = [0u8; IDENTITY_LENGTH];
        bytes[IDENTITY_LENGTH - 1] = 7;
        bytes[IDENTITY_LENGTH - 2] = 1;
        let id = Identity::from_bytes(bytes);
        assert_eq!(id.to_field(), Fr::from(256u64 + 7));
    }

    #[test]
    fn distinct_identities_encode_distinctly() {
        let a = Identity::from_bytes([1; IDENTITY_LENGTH]);
        let b = Identity::from_bytes([2; IDENTITY_LENGTH]);
        assert_ne!(a.to_field(), b.to_field());
    }

    #[test]
    fn derived_from_public_key_is_deterministic() {
        let signing = SigningKey::generate(&mut OsRng);
        let key = signing.verifying_key();
        assert_eq!(
            Identity::from_public_key(&key),
            Identity::from_public_key(&key)
        );

        let other = SigningKey::generate(&mut OsRng).verifying_key();
        assert_ne!(
            Identity::from_public_key(&key),
            Identity::from_public_key(&other)
        );
    }

    #[test]
    fn derived_from_public_key_hex() {
        let key = SigningKey::generate(&mut OsRng).verifying_key();
        let text = format!("0x{}", hex::encode(key.as_bytes()));
        assert_eq!(
            Identity::from_public_key_hex(&text).unwrap(),
            Identity::from_public_key(&key)
        );
        assert!(matches!(
            Identity::from_public_key_hex("0x0011"),
            Err(IdentityError::InvalidLength { expected: 32, got: 2 })
        ));
        assert!(matches!(
            Identity::from_public_key_hex("not hex"),
            Err(IdentityError::InvalidHex(_))
        ));
    }

    #[test]
    fn serde_uses_hex_string() {
        let id = Identity::from_bytes([0x11; IDENTITY_LENGTH]);
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{}\"", id.to_hex()));
        let back: Identity = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);

        let bytes = bincode::serialize(&id).unwrap();
        let back: Identity = bincode::deserialize(&bytes).unwrap();
        assert_eq!(back, id);
    }
}
