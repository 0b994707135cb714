//! # Protocol Configuration & Constants
//!
//! Every fixed number the registry and the vault depend on lives here,
//! together with [`LedgerPolicy`], the operator-tunable knobs (attestation
//! freshness, risk-score bounds, band limits, bootstrap settlement agents).
//!
//! The public-signal layout below is contractual. Reordering the circuit's
//! public outputs is a breaking change that needs a coordinated verifier
//! key rotation and a registry upgrade, not a config tweak.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::identity::Identity;

// ---------------------------------------------------------------------------
// Protocol Version
// ---------------------------------------------------------------------------

/// Crate-level protocol version, reported by `zkcredit version`.
pub const PROTOCOL_VERSION: &str = "0.1.0";

/// Ledger schema version. Bump when the on-disk record layout changes.
pub const LEDGER_SCHEMA_VERSION: u32 = 1;

// ---------------------------------------------------------------------------
// Proof System
// ---------------------------------------------------------------------------

/// ZKP curve: BN254 (alt_bn128). snarkjs calls it `bn128`.
pub const ZKP_CURVE: &str = "BN254";

/// Curve tag as written by snarkjs into `proof.json` / `verification_key.json`.
pub const SNARKJS_CURVE: &str = "bn128";

/// Proof system tag as written by snarkjs.
pub const PROOF_PROTOCOL: &str = "groth16";

/// Number of public signals the attestation circuit exposes.
pub const PUBLIC_SIGNAL_COUNT: usize = 4;

/// Index 0: circuit-internal biometric commitment. Opaque to the registry.
pub const SIGNAL_COMMITMENT: usize = 0;

/// Index 1: nullifier hash. Must equal the caller-supplied nullifier.
pub const SIGNAL_NULLIFIER_HASH: usize = 1;

/// Index 2: circuit-internal similarity threshold. Opaque to the registry.
pub const SIGNAL_THRESHOLD: usize = 2;

/// Index 3: external nullifier. Must equal `encode(identity)`.
pub const SIGNAL_EXTERNAL_NULLIFIER: usize = 3;

/// Bit width of the similarity range check in the reference circuit.
/// Similarity scores are basis points of cosine similarity (0..=10_000).
pub const SIMILARITY_BITS: usize = 16;

/// Default similarity threshold (basis points) used by the dev tooling.
pub const DEFAULT_SIMILARITY_THRESHOLD: u64 = 8_500;

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// Identity (address) length in bytes.
pub const IDENTITY_LENGTH: usize = 20;

/// Nullifier length in bytes: one big-endian BN254 scalar.
pub const NULLIFIER_LENGTH: usize = 32;

// ---------------------------------------------------------------------------
// Credit Policy
// ---------------------------------------------------------------------------

/// Lowest risk score the vault accepts.
pub const MIN_RISK_SCORE: u32 = 300;

/// Highest risk score the vault accepts.
pub const MAX_RISK_SCORE: u32 = 850;

/// Score floor of the VERY_LOW risk band.
pub const BAND_VERY_LOW_FLOOR: u32 = 750;

/// Score floor of the LOW risk band.
pub const BAND_LOW_FLOOR: u32 = 650;

/// Score floor of the MEDIUM risk band.
pub const BAND_MEDIUM_FLOOR: u32 = 550;

/// Score floor of the HIGH risk band. Anything below is VERY_HIGH.
pub const BAND_HIGH_FLOOR: u32 = 450;

/// How long an attestation stays valid for vault operations: 30 days.
pub const DEFAULT_ATTESTATION_MAX_AGE_SECS: i64 = 30 * 24 * 60 * 60;

// ---------------------------------------------------------------------------
// LedgerPolicy
// ---------------------------------------------------------------------------

/// Errors raised while loading or validating a [`LedgerPolicy`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read policy file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse policy file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid policy: {0}")]
    Invalid(String),
}

/// Credit limits (minor units) granted per risk band.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BandLimits {
    pub very_low: u64,
    pub low: u64,
    pub medium: u64,
    pub high: u64,
    /// Usually zero, which makes the vault decline the line.
    pub very_high: u64,
}

impl Default for BandLimits {
    fn default() -> Self {
        Self {
            very_low: 500_000,
            low: 250_000,
            medium: 100_000,
            high: 25_000,
            very_high: 0,
        }
    }
}

/// Operator-tunable policy for the registry and the vault.
///
/// Loaded from JSON; every field has a default so a partial file (or no
/// file at all) is valid.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerPolicy {
    /// Maximum attestation age (seconds) for opening a line or disbursing.
    /// `None` means attestations never go stale.
    pub attestation_max_age_secs: Option<i64>,

    /// Inclusive lower bound for accepted risk scores.
    pub min_risk_score: u32,

    /// Inclusive upper bound for accepted risk scores.
    pub max_risk_score: u32,

    /// Limits per risk band.
    pub band_limits: BandLimits,

    /// Settlement agents authorized by `CreditVault::bootstrap_agents`.
    pub settlement_agents: Vec<Identity>,
}

impl Default for LedgerPolicy {
    fn default() -> Self {
        Self {
            attestation_max_age_secs: Some(DEFAULT_ATTESTATION_MAX_AGE_SECS),
            min_risk_score: MIN_RISK_SCORE,
            max_risk_score: MAX_RISK_SCORE,
            band_limits: BandLimits::default(),
            settlement_agents: Vec::new(),
        }
    }
}

impl LedgerPolicy {
    /// Load and validate a policy from a JSON file.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    /// Parse and validate a policy from a JSON string.
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let policy: Self = serde_json::from_str(raw)?;
        policy.validate()?;
        Ok(policy)
    }

    /// Reject internally inconsistent settings.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_risk_score > self.max_risk_score {
            return Err(ConfigError::Invalid(format!(
                "min_risk_score {} exceeds max_risk_score {}",
                self.min_risk_score, self.max_risk_score
            )));
        }
        if let Some(secs) = self.attestation_max_age_secs {
            if secs < 0 {
                return Err(ConfigError::Invalid(format!(
                    "attestation_max_age_secs must be non-negative, got {secs}"
                )));
            }
        }
        Ok(())
    }

    /// Freshness window as a `chrono::Duration`.
    pub fn attestation_max_age(&self) -> Option<chrono::Duration> {
        self.attestation_max_age_secs.map(chrono::Duration::seconds)
    }

    /// Returns `true` if `score` lies within the accepted range.
    pub fn accepts_score(&self, score: u32) -> bool {
        (self.min_risk_score..=self.max_risk_score).contains(&score)
    }
}
