//! # Attestation Store
//!
//! One record per identity, written only by the registrar. Reads are
//! side-effect free and may be served to anyone.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sled::transaction::{ConflictableTransactionResult, TransactionalTree};
use sled::Tree;

use super::db::{decode, tx_get, tx_put, StoreError, StoreResult};
use crate::identity::Identity;
use crate::zkp::Nullifier;

/// The latest attestation of an identity.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttestationRecord {
    pub attested: bool,
    /// Nullifier consumed by the most recent accepted proof.
    pub nullifier: Nullifier,
    pub attested_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
}

impl AttestationRecord {
    pub fn new(nullifier: Nullifier, attested_at: DateTime<Utc>) -> Self {
        Self {
            attested: true,
            nullifier,
            attested_at,
            revoked_at: None,
        }
    }

    /// Attested and not revoked.
    pub fn is_active(&self) -> bool {
        self.attested && self.revoked_at.is_none()
    }

    /// Active and no older than `max_age` at `now`. `None` never expires.
    pub fn is_current(&self, now: DateTime<Utc>, max_age: Option<Duration>) -> bool {
        self.is_active() && max_age.map_or(true, |age| now - self.attested_at <= age)
    }

    pub(crate) fn revoke(&mut self, at: DateTime<Utc>) {
        self.attested = false;
        self.revoked_at = Some(at);
    }
}

#[derive(Clone, Debug)]
pub struct AttestationStore {
    tree: Tree,
}

impl AttestationStore {
    pub(crate) fn new(tree: Tree) -> Self {
        Self { tree }
    }

    pub fn get(&self, identity: &Identity) -> StoreResult<Option<AttestationRecord>> {
        self.tree
            .get(identity.as_bytes())?
            .map(|bytes| decode(&bytes))
            .transpose()
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

    pub(crate) fn get_in<E: From<StoreError>>(
        tx: &TransactionalTree,
        identity: &Identity,
    ) -> ConflictableTransactionResult<Option<AttestationRecord>, E> {
        tx_get(tx, identity.as_bytes())
    }

    pub(crate) fn put_in<E: From<StoreError>>(
        tx: &TransactionalTree,
        identity: &Identity,
        record: &AttestationRecord,
    ) -> ConflictableTransactionResult<(), E> {
        tx_put(tx, identity.as_bytes(), record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Ledger;

    #[test]
    fn active_and_current() {
        let t0 = Utc::now();
        let mut record = AttestationRecord::new(Nullifier::from_bytes([1; 32]), t0);
        let day = Duration::days(1);

        assert!(record.is_active());
        assert!(record.is_current(t0 + day, Some(day)));
        assert!(!record.is_current(t0 + day + Duration::seconds(1), Some(day)));
        assert!(record.is_current(t0 + Duration::days(3650), None));

        record.revoke(t0 + day);
        assert!(!record.is_active());
        assert!(!record.is_current(t0, None));
        assert_eq!(record.revoked_at, Some(t0 + day));
    }

    #[test]
    fn store_read_write() {
        let ledger = Ledger::open_temporary().unwrap();
        let store = ledger.attestations();
        let id = Identity::from_bytes([5; 20]);
        assert!(store.get(&id).unwrap().is_none());

        let record = AttestationRecord::new(Nullifier::from_bytes([2; 32]), Utc::now());
        store
            .tree()
            .transaction(|tx| AttestationStore::put_in::<StoreError>(tx, &id, &record))
            .unwrap();

        assert_eq!(store.get(&id).unwrap(), Some(record));
        assert_eq!(store.len(), 1);
    }
}
