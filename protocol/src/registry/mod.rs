//! # Attestation Registry
//!
//! Binds a verified biometric proof to an identity exactly once per
//! nullifier. The [`AttestationRegistrar`] is the sole writer of the
//! nullifier registry and attestation store; the credit vault only reads
//! what it records.

pub mod registrar;

pub use registrar::{AttestationError, AttestationReceipt, AttestationRegistrar};
