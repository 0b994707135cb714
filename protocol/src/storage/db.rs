//! # Ledger — Persistent Storage Engine
//!
//! All durable state lives in one embedded sled database, split into named
//! trees:
//!
//! | Tree           | Key                     | Value                        |
//! |----------------|-------------------------|------------------------------|
//! | `nullifiers`   | nullifier (32B BE)      | `bincode(NullifierEntry)`    |
//! | `attestations` | identity (20B)          | `bincode(AttestationRecord)` |
//! | `credit_lines` | identity (20B)          | `bincode(CreditLine)`        |
//! | `loans`        | identity (20B)          | `bincode(Loan)`              |
//! | `agents`       | identity (20B)          | `bincode(DateTime<Utc>)`     |
//! | `audit`        | sequence (8B BE)        | `bincode(AuditRecord)`       |
//! | `metadata`     | key (UTF-8)             | value (bytes)                |
//!
//! `metadata` holds the schema version and the audit sequence counter.
//!
//! Sequence numbers are big-endian so sled's lexicographic order is numeric
//! order and `audit` range scans come back chronologically.
//!
//! ## Atomicity
//!
//! Every state change is a sled multi-tree transaction. Transactions are
//! serializable: a conflicting concurrent commit makes sled re-run the
//! closure against the new state, so check-then-write sequences inside a
//! closure behave as a single compare-and-update.

use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;
use sled::transaction::{
    ConflictableTransactionError, ConflictableTransactionResult, TransactionError,
    TransactionalTree,
};
use sled::{Db, Tree};

use super::attestations::AttestationStore;
use super::audit::AuditLog;
use super::nullifiers::NullifierRegistry;
use crate::config::LEDGER_SCHEMA_VERSION;

// ---------------------------------------------------------------------------
// Error Type
// ---------------------------------------------------------------------------

/// Errors raised by the storage layer.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("ledger schema version {found} is not supported (expected {expected})")]
    Schema { found: u32, expected: u32 },
}

pub type StoreResult<T> = Result<T, StoreError>;

// ---------------------------------------------------------------------------
// Codec helpers
// ---------------------------------------------------------------------------

pub(crate) fn encode<T: Serialize>(value: &T) -> StoreResult<Vec<u8>> {
    bincode::serialize(value).map_err(|e| StoreError::Serialization(e.to_string()))
}

pub(crate) fn decode<T: DeserializeOwned>(bytes: &[u8]) -> StoreResult<T> {
    bincode::deserialize(bytes).map_err(|e| StoreError::Serialization(e.to_string()))
}

/// Abort the enclosing transaction with a storage error.
pub(crate) fn abort_store<E: From<StoreError>>(
    err: StoreError,
) -> ConflictableTransactionError<E> {
    ConflictableTransactionError::Abort(E::from(err))
}

/// Typed read inside a transaction.
pub(crate) fn tx_get<T, E>(
    tree: &TransactionalTree,
    key: &[u8],
) -> ConflictableTransactionResult<Option<T>, E>
where
    T: DeserializeOwned,
    E: From<StoreError>,
{
    match tree.get(key)? {
        Some(bytes) => decode(&bytes).map(Some).map_err(abort_store),
        None => Ok(None),
    }
}

/// Typed write inside a transaction.
pub(crate) fn tx_put<T, E>(
    tree: &TransactionalTree,
    key: &[u8],
    value: &T,
) -> ConflictableTransactionResult<(), E>
where
    T: Serialize,
    E: From<StoreError>,
{
    let bytes = encode(value).map_err(abort_store)?;
    tree.insert(key, bytes)?;
    Ok(())
}

/// Collapse a finished transaction's error into the operation's error type.
pub(crate) fn flatten<T, E: From<StoreError>>(
    result: Result<T, TransactionError<E>>,
) -> Result<T, E> {
    result.map_err(|e| match e {
        TransactionError::Abort(e) => e,
        TransactionError::Storage(e) => E::from(StoreError::Sled(e)),
    })
}

// ---------------------------------------------------------------------------
// Metadata Keys
// ---------------------------------------------------------------------------

const META_SCHEMA_VERSION: &[u8] = b"schema_version";

// ---------------------------------------------------------------------------
// Ledger
// ---------------------------------------------------------------------------

/// Handle to the persistent ledger.
///
/// Cloning is cheap (every tree is reference counted inside sled) and all
/// clones observe the same data, so a `Ledger` can be handed to any number
/// of threads.
#[derive(Debug, Clone)]
pub struct Ledger {
    db: Db,
    nullifiers: NullifierRegistry,
    attestations: AttestationStore,
    credit_lines: Tree,
    loans: Tree,
    agents: Tree,
    audit: AuditLog,
    metadata: Tree,
}

impl Ledger {
    /// Open or create a ledger in `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> StoreResult<Self> {
        let db = sled::open(path)?;
        Self::from_db(db)
    }

    /// An in-memory ledger removed on drop. For tests and dry runs.
    pub fn open_temporary() -> StoreResult<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::from_db(db)
    }

    fn from_db(db: Db) -> StoreResult<Self> {
        let metadata = db.open_tree("metadata")?;
        check_schema(&metadata)?;
        let audit = AuditLog::new(db.open_tree("audit")?);
        audit.init_counter(&metadata)?;

        Ok(Self {
            nullifiers: NullifierRegistry::new(db.open_tree("nullifiers")?),
            attestations: AttestationStore::new(db.open_tree("attestations")?),
            credit_lines: db.open_tree("credit_lines")?,
            loans: db.open_tree("loans")?,
            agents: db.open_tree("agents")?,
            audit,
            metadata,
            db,
        })
    }

    pub fn nullifiers(&self) -> &NullifierRegistry {
        &self.nullifiers
    }

    pub fn attestations(&self) -> &AttestationStore {
        &self.attestations
    }

    pub fn audit(&self) -> &AuditLog {
        &self.audit
    }

    pub(crate) fn credit_lines_tree(&self) -> &Tree {
        &self.credit_lines
    }

    pub(crate) fn loans_tree(&self) -> &Tree {
        &self.loans
    }

    pub(crate) fn agents_tree(&self) -> &Tree {
        &self.agents
    }

    /// Must be part of every transaction that appends to the audit log.
    pub(crate) fn metadata_tree(&self) -> &Tree {
        &self.metadata
    }

    pub fn schema_version(&self) -> StoreResult<u32> {
        Ok(read_schema(&self.metadata)?.unwrap_or(LEDGER_SCHEMA_VERSION))
    }

    /// Total bytes the database occupies on disk.
    pub fn size_on_disk(&self) -> StoreResult<u64> {
        Ok(self.db.size_on_disk()?)
    }

    /// Block until all committed writes are durable.
    pub fn flush(&self) -> StoreResult<()> {
        self.db.flush()?;
        Ok(())
    }

    /// Flush after a transaction has committed. The change is already
    /// applied and cannot roll back, so a flush failure is logged and the
    /// operation still reports success.
    pub(crate) fn flush_committed(&self, operation: &'static str) {
        if let Err(e) = self.db.flush() {
            tracing::error!(
                operation,
                error = %e,
                "committed change not yet durable: flush failed"
            );
        }
    }
}

fn read_schema(metadata: &Tree) -> StoreResult<Option<u32>> {
    match metadata.get(META_SCHEMA_VERSION)? {
        Some(bytes) => {
            let raw: [u8; 4] = bytes
                .as_ref()
                .try_into()
                .map_err(|_| StoreError::Serialization("invalid schema version bytes".into()))?;
            Ok(Some(u32::from_be_bytes(raw)))
        }
        None => Ok(None),
    }
}

fn check_schema(metadata: &Tree) -> StoreResult<()> {
    match read_schema(metadata)? {
        Some(found) if found != LEDGER_SCHEMA_VERSION => Err(StoreError::Schema {
            found,
            expected: LEDGER_SCHEMA_VERSION,
        }),
        Some(_) => Ok(()),
        None => {
            metadata.insert(META_SCHEMA_VERSION, &LEDGER_SCHEMA_VERSION.to_be_bytes())?;
            Ok(())
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
