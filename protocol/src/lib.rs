// Copyright (c) 2026 zkcredit contributors. MIT License.
// See LICENSE for details.

//! # zkcredit — Core Library
//!
//! An attestation-gated credit engine. A borrower proves, in zero
//! knowledge, that a biometric match cleared a similarity threshold and
//! that the proof is bound to their identity. The registrar verifies that
//! proof once, burns its nullifier, and records the identity as attested.
//! The credit vault then opens credit lines and disburses loans only to
//! identities holding a current attestation.
//!
//! ## Architecture
//!
//! - **zkp** — Groth16 over BN254: the attestation circuit, prover,
//!   verifier, and the snarkjs-compatible proof and key formats.
//! - **identity** — 20-byte identities and their field encoding.
//! - **storage** — The sled-backed ledger: nullifiers, attestations,
//!   credit lines, loans, settlement agents, and the audit log.
//! - **registry** — The attestation registrar.
//! - **vault** — Credit lines, loans, and settlement.
//! - **clock** — Injectable time source.
//! - **config** — Protocol constants and the operator policy file.
//!
//! ## Flow
//!
//! ```text
//!  prover ──proof + signals──► AttestationRegistrar ──record──► Ledger
//!                                                                 │
//!  borrower ──open / disburse / settle──► CreditVault ◄──check────┘
//! ```

pub mod clock;
pub mod config;
pub mod identity;
pub mod registry;
pub mod storage;
pub mod vault;
pub mod zkp;
