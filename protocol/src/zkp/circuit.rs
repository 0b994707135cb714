//! # Reference Attestation Circuit
//!
//! Production attestation proofs come from an external circom pipeline; the
//! registry only ever sees `(proof, publicSignals)`. This module is the
//! in-tree reference circuit with the *same public-signal layout*, used by
//! the development ceremony, the `zkcredit prove` command, benchmarks, and
//! tests. The statement being proved is:
//!
//! ```text
//! "I know (secret, blinding, session, similarity) such that:
//!     1. secret * g + blinding * h                      = commitment
//!     2. secret * n + session * s + externalNullifier   = nullifierHash
//!     3. similarity >= threshold"
//! ```
//!
//! The scalar generators `g, h, n, s` are random constants fixed at setup
//! and baked into the constraint system, so the CRS is bound to one
//! parameter set.
//!
//! ## Range check
//!
//! `delta = similarity - threshold` is decomposed into [`SIMILARITY_BITS`]
//! boolean witnesses. Both scores live in basis points (`0..=10_000`), so
//! `2^16` comfortably bounds every honest delta while a negative delta wraps
//! to a value near the field modulus that no 16-bit decomposition can hit.
//!
//! ## Public inputs (in order)
//!
//! | index | value |
//! |-------|-------|
//! | 0     | commitment |
//! | 1     | nullifierHash |
//! | 2     | threshold |
//! | 3     | externalNullifier (field encoding of the identity) |

use ark_bn254::Fr;
use ark_ff::{PrimeField, UniformRand};
use ark_r1cs_std::{
    alloc::AllocVar,
    boolean::Boolean,
    eq::EqGadget,
    fields::{fp::FpVar, FieldVar},
};
use ark_relations::r1cs::{ConstraintSynthesizer, ConstraintSystemRef, SynthesisError};
use ark_serialize::{CanonicalDeserialize, CanonicalSerialize};
use ark_std::rand::Rng;

use super::prover::AttestationWitness;
use super::signals::PublicSignals;
use crate::config::SIMILARITY_BITS;

// ---------------------------------------------------------------------------
// Parameters
// ---------------------------------------------------------------------------

/// Scalar generators baked into the circuit.
#[derive(Clone, Debug, PartialEq, Eq, CanonicalSerialize, CanonicalDeserialize)]
pub struct CircuitParams {
    /// Commitment generator for the secret.
    pub g: Fr,
    /// Commitment generator for the blinding factor.
    pub h: Fr,
    /// Nullifier generator for the secret.
    pub n: Fr,
    /// Nullifier generator for the session randomness.
    pub s: Fr,
}

impl CircuitParams {
    pub fn setup<R: Rng>(rng: &mut R) -> Self {
        Self {
            g: Fr::rand(rng),
            h: Fr::rand(rng),
            n: Fr::rand(rng),
            s: Fr::rand(rng),
        }
    }

    pub fn commit(&self, secret: Fr, blinding: Fr) -> Fr {
        secret * self.g + blinding * self.h
    }

    pub fn nullifier_hash(&self, secret: Fr, session: Fr, external_nullifier: Fr) -> Fr {
        secret * self.n + session * self.s + external_nullifier
    }

    /// Public signals a witness produces, in circuit order.
    pub fn public_signals(&self, witness: &AttestationWitness) -> PublicSignals {
        let external = witness.identity.to_field();
        PublicSignals::new([
            self.commit(witness.secret, witness.blinding),
            self.nullifier_hash(witness.secret, witness.session, external),
            Fr::from(witness.threshold),
            external,
        ])
    }
}

// ---------------------------------------------------------------------------
// Circuit definition
// ---------------------------------------------------------------------------

/// Groth16 R1CS circuit for a biometric attestation.
///
/// Witness and input slots are `Option<_>` so a blank instance can drive
/// key generation.
#[derive(Clone)]
pub struct AttestationCircuit {
    params: CircuitParams,

    // private
    secret: Option<Fr>,
    blinding: Option<Fr>,
    session: Option<Fr>,
    similarity: Option<Fr>,

    // public
    signals: Option<PublicSignals>,
}

impl AttestationCircuit {
    pub fn new(params: &CircuitParams, witness: &AttestationWitness) -> Self {
        Self {
            params: params.clone(),
            secret: Some(witness.secret),
            blinding: Some(witness.blinding),
            session: Some(witness.session),
            similarity: Some(Fr::from(witness.similarity)),
            signals: Some(params.public_signals(witness)),
        }
    }

    /// Override the claimed public signals (used to check that the circuit
    /// rejects inconsistent statements).
    pub fn with_signals(mut self, signals: PublicSignals) -> Self {
        self.signals = Some(signals);
        self
    }

    /// A witness-free instance for CRS generation.
    pub fn blank(params: &CircuitParams) -> Self {
        Self {
            params: params.clone(),
            secret: None,
            blinding: None,
            session: None,
            similarity: None,
            signals: None,
        }
    }

    fn signal(&self, index: usize) -> Result<Fr, SynthesisError> {
        self.signals
            .as_ref()
            .map(|s| s[index])
            .ok_or(SynthesisError::AssignmentMissing)
    }
}

impl ConstraintSynthesizer<Fr> for AttestationCircuit {
    fn generate_constraints(self, cs: ConstraintSystemRef<Fr>) -> Result<(), SynthesisError> {
        // Public inputs, allocated in signal order.
        let commitment =
            FpVar::<Fr>::new_input(ark_relations::ns!(cs, "commitment"), || self.signal(0))?;
        let nullifier_hash =
            FpVar::<Fr>::new_input(ark_relations::ns!(cs, "nullifier_hash"), || self.signal(1))?;
        let threshold =
            FpVar::<Fr>::new_input(ark_relations::ns!(cs, "threshold"), || self.signal(2))?;
        let external_nullifier =
            FpVar::<Fr>::new_input(ark_relations::ns!(cs, "external_nullifier"), || {
                self.signal(3)
            })?;

        let secret = FpVar::<Fr>::new_witness(ark_relations::ns!(cs, "secret"), || {
            self.secret.ok_or(SynthesisError::AssignmentMissing)
        })?;
        let blinding = FpVar::<Fr>::new_witness(ark_relations::ns!(cs, "blinding"), || {
            self.blinding.ok_or(SynthesisError::AssignmentMissing)
        })?;
        let session = FpVar::<Fr>::new_witness(ark_relations::ns!(cs, "session"), || {
            self.session.ok_or(SynthesisError::AssignmentMissing)
        })?;
        let similarity = FpVar::<Fr>::new_witness(ark_relations::ns!(cs, "similarity"), || {
            self.similarity.ok_or(SynthesisError::AssignmentMissing)
        })?;

        let g = FpVar::<Fr>::constant(self.params.g);
        let h = FpVar::<Fr>::constant(self.params.h);
        let n = FpVar::<Fr>::constant(self.params.n);
        let s = FpVar::<Fr>::constant(self.params.s);

        // 1. commitment opens to (secret, blinding)
        (&secret * &g + &blinding * &h).enforce_equal(&commitment)?;

        // 2. nullifier derivation binds the identity
        (&secret * &n + &session * &s + &external_nullifier).enforce_equal(&nullifier_hash)?;

        // 3. similarity - threshold in [0, 2^SIMILARITY_BITS)
        let delta = &similarity - &threshold;
        let delta_bits = delta_to_bits(self.similarity, self.signals.map(|s| s.threshold()));

        let mut reconstructed = FpVar::<Fr>::zero();
        let mut power_of_two = FpVar::<Fr>::one();
        let two = FpVar::<Fr>::constant(Fr::from(2u64));
        for i in 0..SIMILARITY_BITS {
            let bit = Boolean::<Fr>::new_witness(ark_relations::ns!(cs, "delta_bit"), || {
                delta_bits
                    .as_ref()
                    .map(|bits| bits[i])
                    .ok_or(SynthesisError::AssignmentMissing)
            })?;
            reconstructed += FpVar::<Fr>::from(bit) * &power_of_two;
            power_of_two *= &two;
        }
        reconstructed.enforce_equal(&delta)?;

        Ok(())
    }
}

/// Little-endian bits of `similarity - threshold`, `None` in key-gen mode.
fn delta_to_bits(similarity: Option<Fr>, threshold: Option<Fr>) -> Option<Vec<bool>> {
    let delta = similarity? - threshold?;
    let bits = delta
        .into_bigint()
        .0
        .iter()
        .flat_map(|limb| (0..64).map(move |i| (limb >> i) & 1 == 1))
        .take(SIMILARITY_BITS)
        .collect();
    Some(bits)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
