//! # Identity Module
//!
//! Principals of the system. Identities are supplied externally (already
//! authenticated by the transport/session layer); this module only gives
//! them a type, a text form, and the field encoding the circuit binds to.

pub mod address;

pub use address::{Identity, IdentityError};
