//! # Audit Log
//!
//! Append-only record of every accepted state change. Records are written
//! inside the same transaction as the change they describe, so the log and
//! the ledger can never disagree. After commit each record is mirrored to
//! `tracing` under the `audit` target.
//!
//! Sequence numbers come from a counter in the `metadata` tree that is read
//! and bumped inside the writing transaction. Every appending transaction
//! conflicts on that key, so numbers follow commit order with no gaps and a
//! reader tailing with [`AuditLog::since`] never skips a record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sled::transaction::{ConflictableTransactionResult, TransactionalTree};
use sled::Tree;
use uuid::Uuid;

use super::db::{decode, encode, tx_get, tx_put, StoreError, StoreResult};
use crate::identity::Identity;
use crate::zkp::Nullifier;

/// `metadata` key holding the last assigned audit sequence number.
const META_AUDIT_SEQ: &[u8] = b"audit_seq";

/// What happened.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditEvent {
    AttestationAccepted {
        identity: Identity,
        nullifier: Nullifier,
    },
    AttestationRevoked {
        identity: Identity,
        reason: String,
    },
    CreditLineOpened {
        identity: Identity,
        risk_score: u32,
        credit_limit: u64,
    },
    CreditLineClosed {
        identity: Identity,
    },
    LoanDisbursed {
        identity: Identity,
        loan_id: Uuid,
        amount: u64,
        outstanding: u64,
    },
    LoanSettled {
        identity: Identity,
        loan_id: Uuid,
        settled_by: Identity,
        amount: u64,
        outstanding: u64,
        fully_settled: bool,
    },
    SettlementAgentAuthorized {
        agent: Identity,
    },
    SettlementAgentRevoked {
        agent: Identity,
    },
}

impl AuditEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::AttestationAccepted { .. } => "AttestationAccepted",
            Self::AttestationRevoked { .. } => "AttestationRevoked",
            Self::CreditLineOpened { .. } => "CreditLineOpened",
            Self::CreditLineClosed { .. } => "CreditLineClosed",
            Self::LoanDisbursed { .. } => "LoanDisbursed",
            Self::LoanSettled { .. } => "LoanSettled",
            Self::SettlementAgentAuthorized { .. } => "SettlementAgentAuthorized",
            Self::SettlementAgentRevoked { .. } => "SettlementAgentRevoked",
        }
    }

    /// The identity the event is about.
    pub fn subject(&self) -> Identity {
        match self {
            Self::AttestationAccepted { identity, .. }
            | Self::AttestationRevoked { identity, .. }
            | Self::CreditLineOpened { identity, .. }
            | Self::CreditLineClosed { identity }
            | Self::LoanDisbursed { identity, .. }
            | Self::LoanSettled { identity, .. } => *identity,
            Self::SettlementAgentAuthorized { agent } | Self::SettlementAgentRevoked { agent } => {
                *agent
            }
        }
    }
}

/// A sequenced, timestamped [`AuditEvent`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub seq: u64,
    pub at: DateTime<Utc>,
    pub event: AuditEvent,
}

impl AuditRecord {
    pub fn new(seq: u64, at: DateTime<Utc>, event: AuditEvent) -> Self {
        Self { seq, at, event }
    }

    /// Mirror the record to the `audit` tracing target.
    pub fn emit(&self) {
        tracing::info!(
            target: "audit",
            seq = self.seq,
            at = %self.at,
            kind = self.event.kind(),
            subject = %self.event.subject(),
            event = ?self.event,
            "audit event"
        );
    }
}

#[derive(Clone, Debug)]
pub struct AuditLog {
    tree: Tree,
}

impl AuditLog {
    pub(crate) fn new(tree: Tree) -> Self {
        Self { tree }
    }

    /// Records with a sequence number strictly greater than `seq`, oldest
    /// first.
    pub fn since(&self, seq: u64) -> StoreResult<Vec<AuditRecord>> {
        let Some(start) = seq.checked_add(1) else {
            return Ok(Vec::new());
        };
        self.tree
            .range(start.to_be_bytes()..)
            .map(|item| {
                let (_key, value) = item?;
                decode(&value)
            })
            .collect()
    }

    /// The `n` most recent records, oldest first.
    pub fn latest(&self, n: usize) -> StoreResult<Vec<AuditRecord>> {
        let mut records = self
            .tree
            .iter()
            .rev()
            .take(n)
            .map(|item| {
                let (_key, value) = item?;
                decode(&value)
            })
            .collect::<StoreResult<Vec<AuditRecord>>>()?;
        records.reverse();
        Ok(records)
    }

    pub fn len(&self) -> usize {
        self.tree.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    pub(crate) fn tree(&self) -> &Tree {
        &self.tree
    }

    /// Highest sequence number present in the log, 0 when empty.
    pub fn last_seq(&self) -> StoreResult<u64> {
        match self.tree.last()? {
            Some((key, _)) => seq_from_key(&key),
            None => Ok(0),
        }
    }

    /// Seed the sequence counter from the log when the ledger predates it.
    pub(crate) fn init_counter(&self, metadata: &Tree) -> StoreResult<()> {
        if metadata.contains_key(META_AUDIT_SEQ)? {
            return Ok(());
        }
        metadata.insert(META_AUDIT_SEQ, encode(&self.last_seq()?)?)?;
        Ok(())
    }

    /// Assign the next sequence number and write the record, both inside the
    /// caller's transaction. `metadata` must be the ledger's metadata tree.
    pub(crate) fn append_in<E: From<StoreError>>(
        log: &TransactionalTree,
        metadata: &TransactionalTree,
        at: DateTime<Utc>,
        event: AuditEvent,
    ) -> ConflictableTransactionResult<AuditRecord, E> {
        let seq = tx_get::<u64, E>(metadata, META_AUDIT_SEQ)?.unwrap_or(0) + 1;
        tx_put(metadata, META_AUDIT_SEQ, &seq)?;
        let record = AuditRecord::new(seq, at, event);
        tx_put(log, &seq.to_be_bytes(), &record)?;
        Ok(record)
    }
}

fn seq_from_key(key: &[u8]) -> StoreResult<u64> {
    let raw: [u8; 8] = key
        .try_into()
        .map_err(|_| StoreError::Serialization("invalid audit key".into()))?;
    Ok(u64::from_be_bytes(raw))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::db::{abort_store, flatten};
    use crate::storage::Ledger;
    use sled::Transactional;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::thread;

    fn append(ledger: &Ledger, event: AuditEvent) -> AuditRecord {
        flatten::<_, StoreError>(
            (ledger.audit().tree(), ledger.metadata_tree()).transaction(|(log, meta)| {
                AuditLog::append_in::<StoreError>(log, meta, Utc::now(), event.clone())
            }),
        )
        .unwrap()
    }

    #[test]
    fn since_and_latest_are_ordered() {
        let ledger = Ledger::open_temporary().unwrap();
        let alice = Identity::from_bytes([1; 20]);

        let first = append(&ledger, AuditEvent::CreditLineClosed { identity: alice });
        let second = append(&ledger, AuditEvent::SettlementAgentAuthorized { agent: alice });
        let third = append(&ledger, AuditEvent::SettlementAgentRevoked { agent: alice });

        let all = ledger.audit().since(0).unwrap();
        assert_eq!(all, vec![first.clone(), second.clone(), third.clone()]);

        let tail = ledger.audit().since(first.seq).unwrap();
        assert_eq!(tail, vec![second.clone(), third.clone()]);

        assert_eq!(ledger.audit().latest(2).unwrap(), vec![second, third]);
        assert!(ledger.audit().since(u64::MAX).unwrap().is_empty());
    }

    #[test]
    fn event_accessors() {
        let alice = Identity::from_bytes([1; 20]);
        let event = AuditEvent::LoanSettled {
            identity: alice,
            loan_id: Uuid::new_v4(),
            settled_by: Identity::from_bytes([2; 20]),
            amount: 10,
            outstanding: 0,
            fully_settled: true,
        };
        assert_eq!(event.kind(), "LoanSettled");
        assert_eq!(event.subject(), alice);
    }

    #[test]
    fn records_survive_bincode() {
        let record = AuditRecord::new(
            7,
            Utc::now(),
            AuditEvent::LoanDisbursed {
                identity: Identity::from_bytes([4; 20]),
                loan_id: Uuid::new_v4(),
                amount: 500,
                outstanding: 500,
            },
        );
        let bytes = crate::storage::db::encode(&record).unwrap();
        assert_eq!(decode::<AuditRecord>(&bytes).unwrap(), record);
    }

    #[test]
    fn sequence_numbers_are_contiguous_from_one() {
        let ledger = Ledger::open_temporary().unwrap();
        let alice = Identity::from_bytes([1; 20]);
        assert_eq!(ledger.audit().last_seq().unwrap(), 0);

        let seqs: Vec<u64> = (0..5)
            .map(|_| append(&ledger, AuditEvent::CreditLineClosed { identity: alice }).seq)
            .collect();
        assert_eq!(seqs, vec![1, 2, 3, 4, 5]);
        assert_eq!(ledger.audit().last_seq().unwrap(), 5);
    }

    #[test]
    fn aborted_append_consumes_no_number() {
        let ledger = Ledger::open_temporary().unwrap();
        let alice = Identity::from_bytes([1; 20]);
        append(&ledger, AuditEvent::CreditLineClosed { identity: alice });

        let aborted: Result<(), StoreError> = flatten(
            (ledger.audit().tree(), ledger.metadata_tree()).transaction(
                |(log, meta)| -> ConflictableTransactionResult<(), StoreError> {
                    AuditLog::append_in::<StoreError>(
                        log,
                        meta,
                        Utc::now(),
                        AuditEvent::CreditLineClosed { identity: alice },
                    )?;
                    Err(abort_store(StoreError::Serialization("boom".into())))
                },
            ),
        );
        assert!(aborted.is_err());

        let next = append(&ledger, AuditEvent::CreditLineClosed { identity: alice });
        assert_eq!(next.seq, 2);
    }

    #[test]
    fn concurrent_tailer_sees_every_record() {
        const WRITERS: u8 = 8;
        const PER_WRITER: usize = 100;

        let ledger = Ledger::open_temporary().unwrap();
        let done = Arc::new(AtomicBool::new(false));

        let tailer = {
            let ledger = ledger.clone();
            let done = Arc::clone(&done);
            thread::spawn(move || {
                let mut cursor = 0u64;
                let mut seen = Vec::new();
                loop {
                    let finished = done.load(Ordering::SeqCst);
                    for record in ledger.audit().since(cursor).unwrap() {
                        cursor = record.seq;
                        seen.push(record.seq);
                    }
                    if finished {
                        return seen;
                    }
                }
            })
        };

        let writers: Vec<_> = (0..WRITERS)
            .map(|i| {
                let ledger = ledger.clone();
                thread::spawn(move || {
                    let agent = Identity::from_bytes([i; 20]);
                    for _ in 0..PER_WRITER {
                        append(&ledger, AuditEvent::SettlementAgentAuthorized { agent });
                    }
                })
            })
            .collect();
        for w in writers {
            w.join().expect("writer");
        }
        done.store(true, Ordering::SeqCst);

        let seen = tailer.join().expect("tailer");
        let total = WRITERS as u64 * PER_WRITER as u64;
        assert_eq!(seen, (1..=total).collect::<Vec<_>>());
    }
}
