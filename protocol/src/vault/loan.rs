//! # Loans
//!
//! One loan lifecycle per identity at a time:
//!
//! ```text
//!   None ──disburse──► Active ──settle to zero──► Settled
//!                       │  ▲
//!                       └──┘ top-up / partial settle
//! ```
//!
//! Disbursing while a loan is `Active` tops it up. Disbursing after it is
//! `Settled` starts a fresh lifecycle under a new id.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::VaultError;
use crate::identity::Identity;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LoanStatus {
    None,
    Active,
    Settled,
}

impl fmt::Display for LoanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoanStatus::None => write!(f, "None"),
            LoanStatus::Active => write!(f, "Active"),
            LoanStatus::Settled => write!(f, "Settled"),
        }
    }
}

/// The persisted loan of one identity.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Loan {
    pub id: Uuid,
    pub identity: Identity,
    /// Sum of all disbursements in this lifecycle.
    pub principal: u64,
    pub outstanding: u64,
    pub status: LoanStatus,
    pub disbursed_at: DateTime<Utc>,
    pub settled_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl Loan {
    /// Start a new lifecycle with a first disbursement.
    pub fn disburse(identity: Identity, amount: u64, at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            identity,
            principal: amount,
            outstanding: amount,
            status: LoanStatus::Active,
            disbursed_at: at,
            settled_at: None,
            updated_at: at,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == LoanStatus::Active
    }

    /// Add a disbursement to an active loan.
    pub fn top_up(&mut self, amount: u64, at: DateTime<Utc>) -> Result<(), VaultError> {
        if !self.is_active() {
            return Err(VaultError::LoanNotActive(self.identity));
        }
        self.principal = self
            .principal
            .checked_add(amount)
            .ok_or(VaultError::AmountOverflow)?;
        self.outstanding = self
            .outstanding
            .checked_add(amount)
            .ok_or(VaultError::AmountOverflow)?;
        self.updated_at = at;
        Ok(())
    }

    /// Apply a repayment. Returns `true` when it settles the loan.
    ///
    /// # Errors
    ///
    /// - [`VaultError::LoanNotActive`] unless the loan is active.
    /// - [`VaultError::InvalidAmount`] for a zero repayment.
    /// - [`VaultError::Overpayment`] if `amount > outstanding`.
    pub fn settle(&mut self, amount: u64, at: DateTime<Utc>) -> Result<bool, VaultError> {
        if !self.is_active() {
            return Err(VaultError::LoanNotActive(self.identity));
        }
        if amount == 0 {
            return Err(VaultError::InvalidAmount);
        }

        self.outstanding = self
            .outstanding
            .checked_sub(amount)
            .ok_or(VaultError::Overpayment {
                attempted: amount,
                outstanding: self.outstanding,
            })?;
        self.updated_at = at;

        if self.outstanding == 0 {
            self.status = LoanStatus::Settled;
            self.settled_at = Some(at);
        }
        Ok(self.status == LoanStatus::Settled)
    }
}

/// Read-only snapshot of an identity's loan, including `None`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoanView {
    pub identity: Identity,
    pub loan_id: Option<Uuid>,
    pub status: LoanStatus,
    pub principal: u64,
    pub outstanding: u64,
    pub disbursed_at: Option<DateTime<Utc>>,
    pub settled_at: Option<DateTime<Utc>>,
}

impl LoanView {
    pub fn none(identity: Identity) -> Self {
        Self {
            identity,
            loan_id: None,
            status: LoanStatus::None,
            principal: 0,
            outstanding: 0,
            disbursed_at: None,
            settled_at: None,
        }
    }
}

impl From<&Loan> for LoanView {
    fn from(loan: &Loan) -> Self {
        Self {
            identity: loan.identity,
            loan_id: Some(loan.id),
            status: loan.status,
            principal: loan.principal,
            outstanding: loan.outstanding,
            disbursed_at: Some(loan.disbursed_at),
            settled_at: loan.settled_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loan(amount: u64) -> Loan {
        Loan::disburse(Identity::from_bytes([2; 20]), amount, Utc::now())
    }

    #[test]
    fn partial_then_full_settlement() {
        let mut l = loan(1_000);
        assert!(!l.settle(400, Utc::now()).unwrap());
        assert_eq!(l.status, LoanStatus::Active);
        assert_eq!(l.outstanding, 600);

        assert!(l.settle(600, Utc::now()).unwrap());
        assert_eq!(l.status, LoanStatus::Settled);
        assert_eq!(l.outstanding, 0);
        assert!(l.settled_at.is_some());
        assert_eq!(l.principal, 1_000);
    }

    #[test]
    fn settled_loan_rejects_everything() {
        let mut l = loan(10);
        l.settle(10, Utc::now()).unwrap();
        assert!(matches!(l.settle(1, Utc::now()), Err(VaultError::LoanNotActive(_))));
        assert!(matches!(l.top_up(1, Utc::now()), Err(VaultError::LoanNotActive(_))));
    }

    #[test]
    fn zero_and_over_payments_rejected() {
        let mut l = loan(10);
        assert!(matches!(l.settle(0, Utc::now()), Err(VaultError::InvalidAmount)));
        assert!(matches!(
            l.settle(11, Utc::now()),
            Err(VaultError::Overpayment {
                attempted: 11,
                outstanding: 10
            })
        ));
        assert_eq!(l.outstanding, 10);
        assert!(l.is_active());
    }

    #[test]
    fn top_up_accumulates_principal() {
        let mut l = loan(100);
        let id = l.id;
        l.top_up(50, Utc::now()).unwrap();
        assert_eq!(l.principal, 150);
        assert_eq!(l.outstanding, 150);
        assert_eq!(l.id, id);
    }

    #[test]
    fn top_up_overflow_detected() {
        let mut l = loan(u64::MAX);
        assert!(matches!(l.top_up(1, Utc::now()), Err(VaultError::AmountOverflow)));
    }

    #[test]
    fn view_of_absent_loan() {
        let id = Identity::from_bytes([4; 20]);
        let view = LoanView::none(id);
        assert_eq!(view.status, LoanStatus::None);
        assert!(view.loan_id.is_none());

        let l = loan(5);
        let view = LoanView::from(&l);
        assert_eq!(view.loan_id, Some(l.id));
        assert_eq!(view.outstanding, 5);
    }
}
