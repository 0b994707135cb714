//! # Zero-Knowledge Proof Module
//!
//! Everything the ledger needs to know about attestation proofs:
//!
//! ```text
//! signals.rs   — public-signal layout, canonical field parsing, Nullifier
//! proof.rs     — snarkjs-shaped Groth16 proof and point codecs
//! verifier.rs  — ProofVerifier capability + Groth16Verifier (BN254)
//! circuit.rs   — reference R1CS circuit with the production signal layout
//! prover.rs    — development prover and local setup ceremony
//! ```
//!
//! The registry depends only on [`ProofVerifier`]; the circuit and prover
//! exist so the whole pipeline can be exercised without the external circom
//! toolchain.

pub mod circuit;
pub mod proof;
pub mod prover;
pub mod signals;
pub mod verifier;

pub use circuit::{AttestationCircuit, CircuitParams};
pub use proof::{Proof, ProofDecodeError};
pub use prover::{AttestationProver, AttestationWitness};
pub use signals::{Nullifier, PublicSignals, SignalError};
pub use verifier::{Groth16Verifier, ProofVerifier, SnarkjsVerifyingKey, VerifierError};
