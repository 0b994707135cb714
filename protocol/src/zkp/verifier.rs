//! # Groth16 Proof Verification
//!
//! The verifier is the registry's only cryptographic dependency and by far
//! its dominant cost: three pairings plus a four-term multi-scalar
//! multiplication per call. It is injected into the registrar as a
//! [`ProofVerifier`] so the proving system or circuit version can change
//! without touching binding or replay logic.
//!
//! The contract is deliberately narrow: `verify` answers `true` or `false`
//! and nothing else. Malformed proofs (bad encodings, points off the curve
//! or outside the subgroup, foreign protocol tags) are `false`, never an
//! error and never a panic, so callers treat "invalid" uniformly.

use ark_bn254::{Bn254, Fr};
use ark_groth16::{Groth16, PreparedVerifyingKey, VerifyingKey};
use ark_serialize::{CanonicalDeserialize, CanonicalSerialize};
use ark_snark::SNARK;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::proof::{g1_from_strings, g1_to_strings, g2_from_strings, g2_to_strings, Proof};
use super::signals::PublicSignals;
use crate::config::{PROOF_PROTOCOL, PUBLIC_SIGNAL_COUNT, SNARKJS_CURVE};

// ---------------------------------------------------------------------------
// ProofVerifier
// ---------------------------------------------------------------------------

/// A stateless `verify(proof, signals) -> bool` oracle.
pub trait ProofVerifier: Send + Sync {
    /// Returns `true` iff `proof` is valid for exactly these public signals.
    ///
    /// A `false` answer is final for the pair; callers must obtain a new
    /// proof rather than retry.
    fn verify(&self, proof: &Proof, signals: &PublicSignals) -> bool;
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors raised while loading a verification key.
#[derive(Debug, Error)]
pub enum VerifierError {
    /// The key was generated for a circuit with a different number of
    /// public inputs.
    #[error("verifying key expects {got} public inputs, attestation circuit has {expected}")]
    Arity { expected: usize, got: usize },

    #[error("verifying key encoding error: {0}")]
    Encoding(String),

    #[error("verifying key preparation failed: {0}")]
    Prepare(String),

    #[error("verifying key json error: {0}")]
    Json(#[from] serde_json::Error),
}

// ---------------------------------------------------------------------------
// Groth16Verifier
// ---------------------------------------------------------------------------

/// Holds the prepared Groth16 verification key for the attestation circuit.
///
/// Small (well under 1 KB compressed), immutable, and cheap to share behind
/// an `Arc`.
#[derive(Clone)]
pub struct Groth16Verifier {
    pvk: PreparedVerifyingKey<Bn254>,
}

impl Groth16Verifier {
    /// Prepare an arkworks verification key.
    ///
    /// # Errors
    ///
    /// [`VerifierError::Arity`] unless the key has exactly
    /// [`PUBLIC_SIGNAL_COUNT`] public inputs.
    pub fn new(vk: VerifyingKey<Bn254>) -> Result<Self, VerifierError> {
        let got = vk.gamma_abc_g1.len().saturating_sub(1);
        if got != PUBLIC_SIGNAL_COUNT {
            return Err(VerifierError::Arity {
                expected: PUBLIC_SIGNAL_COUNT,
                got,
            });
        }

        let pvk = <Groth16<Bn254> as SNARK<Fr>>::process_vk(&vk)
            .map_err(|e| VerifierError::Prepare(e.to_string()))?;
        Ok(Self { pvk })
    }

    /// The underlying (unprepared) verification key.
    pub fn verifying_key(&self) -> &VerifyingKey<Bn254> {
        &self.pvk.vk
    }

    /// Serialize the verification key to compressed bytes.
    pub fn vk_to_bytes(&self) -> Result<Vec<u8>, VerifierError> {
        let mut buf = Vec::new();
        self.pvk
            .vk
            .serialize_compressed(&mut buf)
            .map_err(|e| VerifierError::Encoding(e.to_string()))?;
        Ok(buf)
    }

    /// Deserialize (and validate) a compressed verification key.
    pub fn vk_from_bytes(data: &[u8]) -> Result<Self, VerifierError> {
        let vk = VerifyingKey::<Bn254>::deserialize_compressed(data)
            .map_err(|e| VerifierError::Encoding(e.to_string()))?;
        Self::new(vk)
    }

    /// Load a snarkjs `verification_key.json`.
    pub fn from_snarkjs_json(raw: &str) -> Result<Self, VerifierError> {
        let key: SnarkjsVerifyingKey = serde_json::from_str(raw)?;
        Self::new(key.to_ark()?)
    }

    /// Export the key in snarkjs form.
    pub fn to_snarkjs(&self) -> SnarkjsVerifyingKey {
        SnarkjsVerifyingKey::from_ark(&self.pvk.vk)
    }
}

impl ProofVerifier for Groth16Verifier {
    fn verify(&self, proof: &Proof, signals: &PublicSignals) -> bool {
        let ark_proof = match proof.to_ark() {
            Ok(p) => p,
            Err(e) => {
                tracing::debug!(error = %e, "malformed proof rejected");
                return false;
            }
        };

        match <Groth16<Bn254> as SNARK<Fr>>::verify_with_processed_vk(
            &self.pvk,
            signals.as_slice(),
            &ark_proof,
        ) {
            Ok(valid) => valid,
            Err(e) => {
                tracing::warn!(error = %e, "groth16 verification algorithm failed");
                false
            }
        }
    }
}

// ---------------------------------------------------------------------------
// snarkjs verification key
// ---------------------------------------------------------------------------

/// The subset of snarkjs `verification_key.json` Groth16 verification needs.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnarkjsVerifyingKey {
    pub protocol: String,
    pub curve: String,
    #[serde(rename = "nPublic")]
    pub n_public: usize,
    pub vk_alpha_1: Vec<String>,
    pub vk_beta_2: Vec<Vec<String>>,
    pub vk_gamma_2: Vec<Vec<String>>,
    pub vk_delta_2: Vec<Vec<String>>,
    #[serde(rename = "IC")]
    pub ic: Vec<Vec<String>>,
}

impl SnarkjsVerifyingKey {
    pub fn from_ark(vk: &VerifyingKey<Bn254>) -> Self {
        Self {
            protocol: PROOF_PROTOCOL.to_string(),
            curve: SNARKJS_CURVE.to_string(),
            n_public: vk.gamma_abc_g1.len().saturating_sub(1),
            vk_alpha_1: g1_to_strings(&vk.alpha_g1),
            vk_beta_2: g2_to_strings(&vk.beta_g2),
            vk_gamma_2: g2_to_strings(&vk.gamma_g2),
            vk_delta_2: g2_to_strings(&vk.delta_g2),
            ic: vk.gamma_abc_g1.iter().map(g1_to_strings).collect(),
        }
    }

    pub fn to_ark(&self) -> Result<VerifyingKey<Bn254>, VerifierError> {
        if self.protocol != PROOF_PROTOCOL || self.curve != SNARKJS_CURVE {
            return Err(VerifierError::Encoding(format!(
                "unsupported key {}/{}",
                self.protocol, self.curve
            )));
        }
        if self.ic.len() != self.n_public + 1 {
            return Err(VerifierError::Encoding(format!(
                "IC has {} points for nPublic = {}",
                self.ic.len(),
                self.n_public
            )));
        }

        let enc = |e: super::proof::ProofDecodeError| VerifierError::Encoding(e.to_string());
        Ok(VerifyingKey {
            alpha_g1: g1_from_strings("vk_alpha_1", &self.vk_alpha_1).map_err(enc)?,
            beta_g2: g2_from_strings("vk_beta_2", &self.vk_beta_2).map_err(enc)?,
            gamma_g2: g2_from_strings("vk_gamma_2", &self.vk_gamma_2).map_err(enc)?,
            delta_g2: g2_from_strings("vk_delta_2", &self.vk_delta_2).map_err(enc)?,
            gamma_abc_g1: self
                .ic
                .iter()
                .map(|p| g1_from_strings("IC", p))
                .collect::<Result<Vec<_>, _>>()
                .map_err(enc)?,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
