//! # Nullifier Registry
//!
//! The set of consumed nullifiers. Insert-only: an entry is never removed,
//! so once a nullifier has been accepted every later attempt to use it, by
//! any identity, is a replay.
//!
//! Read-only outside the crate. The only writer is
//! `AttestationRegistrar::attest`, which registers the nullifier in the same
//! transaction as the attestation record and its audit event.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sled::transaction::{
    ConflictableTransactionError, ConflictableTransactionResult, TransactionalTree,
};
use sled::Tree;
use thiserror::Error;

use super::db::{decode, tx_get, tx_put, StoreError, StoreResult};
use crate::identity::Identity;
use crate::zkp::Nullifier;

/// Who consumed a nullifier, and when.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NullifierEntry {
    pub identity: Identity,
    pub registered_at: DateTime<Utc>,
}

#[derive(Debug, Error)]
pub enum RegisterError {
    /// Permanent: the nullifier can never be registered again.
    #[error("nullifier {0} is already registered")]
    AlreadyRegistered(Nullifier),

    #[error(transparent)]
    Storage(#[from] StoreError),
}

#[derive(Clone, Debug)]
pub struct NullifierRegistry {
    tree: Tree,
}

impl NullifierRegistry {
    pub(crate) fn new(tree: Tree) -> Self {
        Self { tree }
    }

    pub fn is_registered(&self, nullifier: &Nullifier) -> StoreResult<bool> {
        Ok(self.tree.contains_key(nullifier.as_bytes())?)
    }

    pub fn entry(&self, nullifier: &Nullifier) -> StoreResult<Option<NullifierEntry>> {
        self.tree
            .get(nullifier.as_bytes())?
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

    /// Mark `nullifier` consumed inside the caller's transaction, aborting
    /// it with `AlreadyRegistered` if the nullifier was consumed before.
    /// Concurrent callers conflict on the key, so exactly one succeeds.
    pub(crate) fn register<E>(
        tx: &TransactionalTree,
        nullifier: &Nullifier,
        entry: &NullifierEntry,
    ) -> ConflictableTransactionResult<(), E>
    where
        E: From<StoreError> + From<RegisterError>,
    {
        if tx_get::<NullifierEntry, E>(tx, nullifier.as_bytes())?.is_some() {
            return Err(ConflictableTransactionError::Abort(E::from(
                RegisterError::AlreadyRegistered(*nullifier),
            )));
        }
        tx_put(tx, nullifier.as_bytes(), entry)
    }
}
