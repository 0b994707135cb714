//! # Vault Module — Credit Lines & Loans
//!
//! The vault is where money moves in zkcredit. It issues credit lines to
//! attested identities, disburses loans against them, and settles
//! repayments from borrowers or authorized settlement agents.
//!
//! ## Architecture
//!
//! ```text
//! credit.rs        — CreditLine state machine and read view
//! loan.rs          — Loan lifecycle and read view
//! limits.rs        — Risk score → credit limit policies
//! error.rs         — VaultError
//! credit_vault.rs  — CreditVault: transactional operations over the ledger
//! ```
//!
//! ## Design Principles
//!
//! 1. **All amounts are `u64` minor units.** No floating point in any
//!    balance arithmetic, and every addition or subtraction is checked.
//!
//! 2. **Gated on attestation, not on proofs.** The vault reads the
//!    attestation store the registrar writes; it never verifies a proof.
//!
//! 3. **One identity, one line, one loan.** A closed line is terminal and
//!    a settled loan is replaced by a fresh one on the next disbursement.

pub mod credit;
pub mod credit_vault;
pub mod error;
pub mod limits;
pub mod loan;

pub use credit::{CreditLine, CreditLineStatus, CreditLineView};
pub use credit_vault::CreditVault;
pub use error::VaultError;
pub use limits::{LimitPolicy, RiskBand, RiskBandPolicy};
pub use loan::{Loan, LoanStatus, LoanView};
