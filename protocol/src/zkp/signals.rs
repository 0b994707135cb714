//! # Public Signals & Nullifiers
//!
//! The attestation circuit exposes exactly four public signals, in a fixed
//! order (see [`crate::config`]):
//!
//! | index | signal              | registry treatment                     |
//! |-------|---------------------|----------------------------------------|
//! | 0     | biometric commitment| opaque                                 |
//! | 1     | `nullifierHash`     | must equal the caller's nullifier      |
//! | 2     | similarity threshold| opaque                                 |
//! | 3     | `externalNullifier` | must equal `encode(identity)`          |
//!
//! On the wire (snarkjs `public.json`) signals are decimal strings. Parsing
//! is strict: a value is accepted only if it is the canonical decimal form
//! of a BN254 scalar. Out-of-field values, leading zeros, signs, and
//! whitespace are all rejected instead of being silently reduced, so two
//! different strings can never name the same signal.

use std::fmt;
use std::ops::Index;
use std::str::FromStr;

use ark_bn254::Fr;
use ark_ff::{BigInteger, PrimeField};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

use crate::config::{
    NULLIFIER_LENGTH, PUBLIC_SIGNAL_COUNT, SIGNAL_COMMITMENT, SIGNAL_EXTERNAL_NULLIFIER,
    SIGNAL_NULLIFIER_HASH, SIGNAL_THRESHOLD,
};
use crate::identity::Identity;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors raised while parsing public signals or nullifiers.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignalError {
    #[error("expected {expected} public signals, got {got}")]
    WrongLength { expected: usize, got: usize },

    #[error("public signal {index} is not a canonical field element: {value:?}")]
    NonCanonical { index: usize, value: String },

    #[error("invalid nullifier: {0}")]
    InvalidNullifier(String),
}

// ---------------------------------------------------------------------------
// Field helpers
// ---------------------------------------------------------------------------

/// Parse the canonical decimal form of a prime-field element.
///
/// Returns `None` for anything that is not exactly what
/// [`field_to_decimal`] would print for some element.
pub fn parse_field<F: PrimeField>(s: &str) -> Option<F> {
    let value = F::from_str(s).ok()?;
    (field_to_decimal(&value) == s).then_some(value)
}

/// Canonical decimal form of a prime-field element.
pub fn field_to_decimal<F: PrimeField>(value: &F) -> String {
    value.into_bigint().to_string()
}

// ---------------------------------------------------------------------------
// Nullifier
// ---------------------------------------------------------------------------

/// A one-time-use attestation tag: the big-endian bytes of a BN254 scalar.
///
/// Once registered a nullifier is consumed forever, by every identity.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Nullifier([u8; NULLIFIER_LENGTH]);

impl Nullifier {
    pub const fn from_bytes(bytes: [u8; NULLIFIER_LENGTH]) -> Self {
        Self(bytes)
    }

    /// Encode a field element the way it appears in public signal 1.
    pub fn from_field(value: &Fr) -> Self {
        let be = value.into_bigint().to_bytes_be();
        let mut bytes = [0u8; NULLIFIER_LENGTH];
        bytes[NULLIFIER_LENGTH - be.len()..].copy_from_slice(&be);
        Self(bytes)
    }

    /// Decode to a field element. `None` if the bytes are not a canonical
    /// scalar (i.e. the integer is >= the field modulus).
    pub fn to_field(&self) -> Option<Fr> {
        let value = Fr::from_be_bytes_mod_order(&self.0);
        (Self::from_field(&value) == *self).then_some(value)
    }

    pub fn as_bytes(&self) -> &[u8; NULLIFIER_LENGTH] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }
}

impl FromStr for Nullifier {
    type Err = SignalError;

    /// `0x`-prefixed hex (up to 32 bytes, left-padded) or a canonical
    /// decimal field element, as snarkjs prints it.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(hex_part) = s.strip_prefix("0x") {
            let raw = hex::decode(hex_part)
                .map_err(|e| SignalError::InvalidNullifier(e.to_string()))?;
            if raw.is_empty() || raw.len() > NULLIFIER_LENGTH {
                return Err(SignalError::InvalidNullifier(format!(
                    "expected 1..={NULLIFIER_LENGTH} bytes, got {}",
                    raw.len()
                )));
            }
            let mut bytes = [0u8; NULLIFIER_LENGTH];
            bytes[NULLIFIER_LENGTH - raw.len()..].copy_from_slice(&raw);
            return Ok(Self(bytes));
        }

        parse_field::<Fr>(s)
            .map(|value| Self::from_field(&value))
            .ok_or_else(|| SignalError::InvalidNullifier(format!("not a field element: {s:?}")))
    }
}

impl fmt::Display for Nullifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Nullifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Nullifier({})", self.to_hex())
    }
}

impl Serialize for Nullifier {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Nullifier {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// PublicSignals
// ---------------------------------------------------------------------------

/// The fixed-layout public outputs of the attestation circuit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PublicSignals([Fr; PUBLIC_SIGNAL_COUNT]);

impl PublicSignals {
    pub fn new(values: [Fr; PUBLIC_SIGNAL_COUNT]) -> Self {
        Self(values)
    }

    /// Parse the snarkjs `public.json` representation.
    pub fn from_decimal_strings<S: AsRef<str>>(values: &[S]) -> Result<Self, SignalError> {
        if values.len() != PUBLIC_SIGNAL_COUNT {
            return Err(SignalError::WrongLength {
                expected: PUBLIC_SIGNAL_COUNT,
                got: values.len(),
            });
        }

        let mut out = [Fr::from(0u64); PUBLIC_SIGNAL_COUNT];
        for (index, (slot, raw)) in out.iter_mut().zip(values).enumerate() {
            let raw = raw.as_ref();
            *slot = parse_field(raw).ok_or_else(|| SignalError::NonCanonical {
                index,
                value: raw.to_string(),
            })?;
        }
        Ok(Self(out))
    }

    pub fn to_decimal_strings(&self) -> Vec<String> {
        self.0.iter().map(field_to_decimal).collect()
    }

    /// The ordered public-input vector handed to the verifier.
    pub fn as_slice(&self) -> &[Fr] {
        &self.0
    }

    pub fn commitment(&self) -> Fr {
        self.0[SIGNAL_COMMITMENT]
    }

    /// Signal 1, re-encoded as a [`Nullifier`].
    pub fn nullifier_hash(&self) -> Nullifier {
        Nullifier::from_field(&self.0[SIGNAL_NULLIFIER_HASH])
    }

    pub fn threshold(&self) -> Fr {
        self.0[SIGNAL_THRESHOLD]
    }

    pub fn external_nullifier(&self) -> Fr {
        self.0[SIGNAL_EXTERNAL_NULLIFIER]
    }

    /// Binding check A: signal 1 names the supplied nullifier.
    pub fn binds_nullifier(&self, nullifier: &Nullifier) -> bool {
        self.nullifier_hash() == *nullifier
    }

    /// Binding check B: signal 3 is the field encoding of `identity`.
    pub fn binds_identity(&self, identity: &Identity) -> bool {
        self.external_nullifier() == identity.to_field()
    }
}

impl Index<usize> for PublicSignals {
    type Output = Fr;

    fn index(&self, index: usize) -> &Fr {
        &self.0[index]
    }
}

impl Serialize for PublicSignals {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.to_decimal_strings())
    }
}

impl<'de> Deserialize<'de> for PublicSignals {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Vec::<String>::deserialize(deserializer)?;
        Self::from_decimal_strings(&raw).map_err(serde::de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
