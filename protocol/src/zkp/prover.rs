//! # Groth16 Proof Generation
//!
//! Development-side prover for the reference attestation circuit:
//!
//! 1. **Setup**: `AttestationProver::setup(rng)` runs a local single-party
//!    ceremony and returns the prover together with its [`Groth16Verifier`].
//!    Production deployments load a verifying key from an MPC ceremony
//!    instead and never hold a proving key.
//!
//! 2. **Prove**: `prove(&witness, rng)` populates an [`AttestationCircuit`]
//!    and returns the proof in snarkjs form plus the public signals the
//!    registry expects next to it.

use anyhow::{bail, Context, Result};
use ark_bn254::{Bn254, Fr};
use ark_groth16::{Groth16, ProvingKey};
use ark_serialize::{CanonicalDeserialize, CanonicalSerialize};
use ark_snark::SNARK;
use ark_std::rand::{CryptoRng, Rng};

use super::circuit::{AttestationCircuit, CircuitParams};
use super::proof::Proof;
use super::signals::PublicSignals;
use super::verifier::Groth16Verifier;
use crate::config::SIMILARITY_BITS;
use crate::identity::Identity;

// ---------------------------------------------------------------------------
// Witness
// ---------------------------------------------------------------------------

/// Everything a holder knows when producing an attestation proof.
#[derive(Clone, Debug)]
pub struct AttestationWitness {
    /// Long-lived biometric secret.
    pub secret: Fr,
    /// Commitment blinding factor.
    pub blinding: Fr,
    /// Per-attestation randomness; a fresh session yields a fresh nullifier.
    pub session: Fr,
    /// Measured similarity, in basis points.
    pub similarity: u64,
    /// Required similarity, in basis points.
    pub threshold: u64,
    /// The identity the proof is bound to.
    pub identity: Identity,
}

impl AttestationWitness {
    /// Whether the circuit's range check can be satisfied.
    pub fn meets_threshold(&self) -> bool {
        self.similarity
            .checked_sub(self.threshold)
            .is_some_and(|delta| delta < (1u64 << SIMILARITY_BITS))
    }
}

// ---------------------------------------------------------------------------
// AttestationProver
// ---------------------------------------------------------------------------

/// Holds the proving key and circuit parameters.
pub struct AttestationProver {
    pk: ProvingKey<Bn254>,
    params: CircuitParams,
}

impl AttestationProver {
    /// Run a local Groth16 setup for the attestation circuit.
    ///
    /// # Panics
    ///
    /// Panics if CRS generation fails, which indicates a malformed circuit.
    pub fn setup<R: Rng + CryptoRng>(rng: &mut R) -> (Self, Groth16Verifier) {
        let params = CircuitParams::setup(rng);
        let blank = AttestationCircuit::blank(&params);

        let (pk, vk) = Groth16::<Bn254>::circuit_specific_setup(blank, rng)
            .expect("Groth16 setup must succeed for a well-formed circuit");
        let verifier = Groth16Verifier::new(vk)
            .expect("attestation circuit exposes exactly four public inputs");

        (Self { pk, params }, verifier)
    }

    pub fn params(&self) -> &CircuitParams {
        &self.params
    }

    /// The verifier matching this proving key.
    pub fn verifier(&self) -> Result<Groth16Verifier> {
        Groth16Verifier::new(self.pk.vk.clone()).context("embedded verifying key rejected")
    }

    /// Prove an attestation.
    ///
    /// # Errors
    ///
    /// Fails if the similarity does not meet the threshold or if proof
    /// generation fails.
    pub fn prove<R: Rng + CryptoRng>(
        &self,
        witness: &AttestationWitness,
        rng: &mut R,
    ) -> Result<(Proof, PublicSignals)> {
        if !witness.meets_threshold() {
            bail!(
                "similarity {} does not meet threshold {}",
                witness.similarity,
                witness.threshold
            );
        }

        let signals = self.params.public_signals(witness);
        let circuit = AttestationCircuit::new(&self.params, witness);
        let proof = Groth16::<Bn254>::prove(&self.pk, circuit, rng)
            .context("Groth16 proof generation failed")?;

        Ok((Proof::from_ark(&proof), signals))
    }

    /// Compressed `(params, proving key)` bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        self.params
            .serialize_compressed(&mut buf)
            .context("circuit params serialization failed")?;
        self.pk
            .serialize_compressed(&mut buf)
            .context("proving key serialization failed")?;
        Ok(buf)
    }

    pub fn from_bytes(mut data: &[u8]) -> Result<Self> {
        let params = CircuitParams::deserialize_compressed(&mut data)
            .context("invalid circuit params")?;
        let pk = ProvingKey::<Bn254>::deserialize_compressed(&mut data)
            .context("invalid proving key")?;
        Ok(Self { pk, params })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::zkp::verifier::ProofVerifier;
    use ark_ff::UniformRand;
    use ark_std::rand::{rngs::StdRng, SeedableRng};

    fn witness(rng: &mut StdRng, similarity: u64) -> AttestationWitness {
        AttestationWitness {
            secret: Fr::rand(rng),
            blinding: Fr::rand(rng),
            session: Fr::rand(rng),
            similarity,
            threshold: 8_500,
            identity: Identity::from_bytes([7; 20]),
        }
    }

    #[test]
    fn prove_valid_attestation() {
        let mut rng = StdRng::seed_from_u64(42);
        let (prover, verifier) = AttestationProver::setup(&mut rng);
        let w = witness(&mut rng, 9_000);

        let (proof, signals) = prover.prove(&w, &mut rng).unwrap();
        assert!(signals.binds_identity(&w.identity));
        assert!(verifier.verify(&proof, &signals));
    }

    #[test]
    fn below_threshold_refused() {
        let mut rng = StdRng::seed_from_u64(42);
        let (prover, _verifier) = AttestationProver::setup(&mut rng);
        let w = witness(&mut rng, 8_000);

        assert!(!w.meets_threshold());
        assert!(prover.prove(&w, &mut rng).is_err());
    }

    #[test]
    fn prover_bytes_round_trip() {
        let mut rng = StdRng::seed_from_u64(42);
        let (prover, verifier) = AttestationProver::setup(&mut rng);

        let restored = AttestationProver::from_bytes(&prover.to_bytes().unwrap()).unwrap();
        assert_eq!(restored.params(), prover.params());

        let w = witness(&mut rng, 9_500);
        let (proof, signals) = restored.prove(&w, &mut rng).unwrap();
        assert!(verifier.verify(&proof, &signals));
    }

    #[test]
    fn embedded_verifier_matches_setup() {
        let mut rng = StdRng::seed_from_u64(42);
        let (prover, verifier) = AttestationProver::setup(&mut rng);
        assert_eq!(
            prover.verifier().unwrap().vk_to_bytes().unwrap(),
            verifier.vk_to_bytes().unwrap()
        );
    }
}
