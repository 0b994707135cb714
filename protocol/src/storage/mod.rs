//! # Storage Module
//!
//! Persistent ledger state on an embedded sled database.
//!
//! ```text
//! db.rs            — Ledger handle, tree layout, codec + transaction helpers
//! nullifiers.rs    — NullifierRegistry (insert-only consumed set)
//! attestations.rs  — AttestationStore (one record per identity)
//! audit.rs         — AuditLog (sequenced, append-only events)
//! ```
//!
//! Credit-line and loan records are owned by the vault, which reaches their
//! trees through crate-private accessors on [`Ledger`]. Nothing outside this
//! crate can write to the ledger except through a registrar or vault
//! operation.
//!
//! Bincode is the on-disk encoding: compact and deterministic. JSON is for
//! the CLI and for proofs on the wire.

pub mod attestations;
pub mod audit;
pub mod db;
pub mod nullifiers;

pub use attestations::{AttestationRecord, AttestationStore};
pub use audit::{AuditEvent, AuditLog, AuditRecord};
pub use db::{Ledger, StoreError, StoreResult};
pub use nullifiers::{NullifierEntry, NullifierRegistry, RegisterError};
