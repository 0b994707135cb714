//! # Attestation Registrar
//!
//! The only writer of nullifiers and attestation records. `attest` runs its
//! checks cheapest-first and commits in one transaction:
//!
//! 1. `signals[1]` names the supplied nullifier       → `ParameterMismatch`
//! 2. `signals[3]` is the field encoding of identity  → `ParameterMismatch`
//! 3. the nullifier is unused                          → `ReplayDetected`
//! 4. the proof verifies against the signals           → `InvalidProof`
//! 5. register nullifier + write record + audit event, atomically
//!
//! Step 5 re-checks the nullifier inside the transaction: when two callers
//! race with the same nullifier both may pass step 3, but only one commit
//! wins and the other surfaces as `ReplayDetected`. No step retries.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sled::transaction::{ConflictableTransactionError, ConflictableTransactionResult};
use sled::Transactional;
use thiserror::Error;

use crate::clock::{Clock, SystemClock};
use crate::config::{SIGNAL_EXTERNAL_NULLIFIER, SIGNAL_NULLIFIER_HASH};
use crate::identity::Identity;
use crate::storage::db::flatten;
use crate::storage::{
    AttestationRecord, AttestationStore, AuditEvent, AuditLog, AuditRecord, Ledger,
    NullifierEntry, NullifierRegistry, RegisterError, StoreError,
};
use crate::zkp::{Nullifier, Proof, ProofVerifier, PublicSignals};

type TxResult<T> = ConflictableTransactionResult<T, AttestationError>;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum AttestationError {
    /// A public signal disagrees with the caller's explicit argument.
    #[error("public signal {signal} does not match the supplied {field}")]
    ParameterMismatch { signal: usize, field: &'static str },

    /// The nullifier was consumed by an earlier attestation. Terminal for
    /// this nullifier; a fresh proof is required.
    #[error("nullifier {0} has already been used")]
    ReplayDetected(Nullifier),

    #[error("proof verification failed")]
    InvalidProof,

    #[error("identity {0} has no active attestation")]
    NotAttested(Identity),

    #[error(transparent)]
    Storage(#[from] StoreError),
}

impl From<RegisterError> for AttestationError {
    fn from(err: RegisterError) -> Self {
        match err {
            RegisterError::AlreadyRegistered(n) => Self::ReplayDetected(n),
            RegisterError::Storage(e) => Self::Storage(e),
        }
    }
}

// ---------------------------------------------------------------------------
// Receipt
// ---------------------------------------------------------------------------

/// Proof of a committed attestation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttestationReceipt {
    pub identity: Identity,
    pub nullifier: Nullifier,
    pub attested_at: DateTime<Utc>,
    /// Sequence number of the `AttestationAccepted` audit record.
    pub seq: u64,
}

// ---------------------------------------------------------------------------
// AttestationRegistrar
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct AttestationRegistrar {
    ledger: Ledger,
    verifier: Arc<dyn ProofVerifier>,
    clock: Arc<dyn Clock>,
}

impl AttestationRegistrar {
    pub fn new(ledger: Ledger, verifier: Arc<dyn ProofVerifier>) -> Self {
        Self {
            ledger,
            verifier,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    /// Verify a proof and record the identity as attested.
    pub fn attest(
        &self,
        proof: &Proof,
        signals: &PublicSignals,
        nullifier: &Nullifier,
        identity: &Identity,
    ) -> Result<AttestationReceipt, AttestationError> {
        if !signals.binds_nullifier(nullifier) {
            tracing::info!(
                %identity,
                %nullifier,
                "attestation rejected: nullifier signal mismatch"
            );
            return Err(AttestationError::ParameterMismatch {
                signal: SIGNAL_NULLIFIER_HASH,
                field: "nullifier",
            });
        }
        if !signals.binds_identity(identity) {
            tracing::info!(%identity, %nullifier, "attestation rejected: identity signal mismatch");
            return Err(AttestationError::ParameterMismatch {
                signal: SIGNAL_EXTERNAL_NULLIFIER,
                field: "identity",
            });
        }
        if self.ledger.nullifiers().is_registered(nullifier)? {
            return Err(replay(identity, nullifier));
        }
        if !self.verifier.verify(proof, signals) {
            tracing::info!(%identity, %nullifier, "attestation rejected: invalid proof");
            return Err(AttestationError::InvalidProof);
        }

        let now = self.clock.now();
        let record = AttestationRecord::new(*nullifier, now);
        let entry = NullifierEntry {
            identity: *identity,
            registered_at: now,
        };

        let committed = (
            self.ledger.nullifiers().tree(),
            self.ledger.attestations().tree(),
            self.ledger.audit().tree(),
            self.ledger.metadata_tree(),
        )
            .transaction(|(nullifiers, attestations, log, meta)| -> TxResult<AuditRecord> {
                NullifierRegistry::register::<AttestationError>(nullifiers, nullifier, &entry)?;
                AttestationStore::put_in::<AttestationError>(attestations, identity, &record)?;
                AuditLog::append_in::<AttestationError>(
                    log,
                    meta,
                    now,
                    AuditEvent::AttestationAccepted {
                        identity: *identity,
                        nullifier: *nullifier,
                    },
                )
            });

        let audit = match flatten(committed) {
            Ok(audit) => audit,
            Err(AttestationError::ReplayDetected(_)) => return Err(replay(identity, nullifier)),
            Err(e) => return Err(e),
        };
        self.ledger.flush_committed("attest");
        audit.emit();

        Ok(AttestationReceipt {
            identity: *identity,
            nullifier: *nullifier,
            attested_at: now,
            seq: audit.seq,
        })
    }

    /// True iff the identity holds an attestation that has not been revoked.
    pub fn is_attested(&self, identity: &Identity) -> Result<bool, AttestationError> {
        Ok(self
            .ledger
            .attestations()
            .get(identity)?
            .is_some_and(|record| record.is_active()))
    }

    pub fn attestation(
        &self,
        identity: &Identity,
    ) -> Result<Option<AttestationRecord>, AttestationError> {
        Ok(self.ledger.attestations().get(identity)?)
    }

    /// Withdraw an identity's attestation. Its nullifier stays consumed;
    /// a new proof with a fresh nullifier re-attests the identity.
    pub fn revoke(
        &self,
        identity: &Identity,
        reason: &str,
    ) -> Result<AttestationRecord, AttestationError> {
        let now = self.clock.now();

        let committed = (
            self.ledger.attestations().tree(),
            self.ledger.audit().tree(),
            self.ledger.metadata_tree(),
        )
            .transaction(|(attestations, log, meta)| -> TxResult<(AttestationRecord, AuditRecord)> {
                let mut record = match AttestationStore::get_in::<AttestationError>(
                    attestations,
                    identity,
                )? {
                    Some(record) if record.is_active() => record,
                    _ => {
                        return Err(ConflictableTransactionError::Abort(
                            AttestationError::NotAttested(*identity),
                        ))
                    }
                };
                record.revoke(now);
                AttestationStore::put_in::<AttestationError>(attestations, identity, &record)?;
                let audit = AuditLog::append_in::<AttestationError>(
                    log,
                    meta,
                    now,
                    AuditEvent::AttestationRevoked {
                        identity: *identity,
                        reason: reason.to_string(),
                    },
                )?;
                Ok((record, audit))
            });

        let (record, audit) = flatten(committed)?;
        self.ledger.flush_committed("revoke");
        audit.emit();
        Ok(record)
    }
}

fn replay(identity: &Identity, nullifier: &Nullifier) -> AttestationError {
    tracing::warn!(target: "security", %identity, %nullifier, "nullifier replay rejected");
    AttestationError::ReplayDetected(*nullifier)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
