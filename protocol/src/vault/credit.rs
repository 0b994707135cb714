//! # Credit Lines
//!
//! A credit line is a standing authorization for one identity to borrow up
//! to a fixed limit. The limit is derived from a risk score once, at open
//! time, and never changes afterwards.
//!
//! ## State Machine
//!
//! ```text
//!   None ──open──► Open ──close──► Closed
//! ```
//!
//! `None` is the absence of a record. `Closed` is terminal; a closed line
//! is kept for the record and cannot be reopened.
//!
//! All amounts are `u64` minor units and all arithmetic is checked.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::error::VaultError;
use crate::identity::Identity;

// ---------------------------------------------------------------------------
// CreditLineStatus
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CreditLineStatus {
    /// No line has ever been opened.
    None,
    /// Open for disbursements and repayments.
    Open,
    /// Permanently closed.
    Closed,
}

impl fmt::Display for CreditLineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CreditLineStatus::None => write!(f, "None"),
            CreditLineStatus::Open => write!(f, "Open"),
            CreditLineStatus::Closed => write!(f, "Closed"),
        }
    }
}

// ---------------------------------------------------------------------------
// CreditLine
// ---------------------------------------------------------------------------

/// The persisted credit line of one identity.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditLine {
    pub identity: Identity,
    pub status: CreditLineStatus,
    /// Risk score the limit was derived from.
    pub risk_score: u32,
    pub credit_limit: u64,
    /// Invariant: `outstanding <= credit_limit`.
    pub outstanding: u64,
    pub opened_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl CreditLine {
    pub fn open(identity: Identity, risk_score: u32, credit_limit: u64, at: DateTime<Utc>) -> Self {
        Self {
            identity,
            status: CreditLineStatus::Open,
            risk_score,
            credit_limit,
            outstanding: 0,
            opened_at: at,
            closed_at: None,
            updated_at: at,
        }
    }

    /// Remaining drawable credit; zero unless the line is open.
    pub fn available(&self) -> u64 {
        if self.status != CreditLineStatus::Open {
            return 0;
        }
        self.credit_limit.saturating_sub(self.outstanding)
    }

    /// Increase the outstanding balance by `amount`.
    ///
    /// # Errors
    ///
    /// - [`VaultError::CreditLineNotOpen`] unless the line is open.
    /// - [`VaultError::LimitExceeded`] if `amount > available()`.
    pub fn draw(&mut self, amount: u64, at: DateTime<Utc>) -> Result<(), VaultError> {
        if self.status != CreditLineStatus::Open {
            return Err(VaultError::CreditLineNotOpen(self.identity));
        }

        let available = self.available();
        if amount > available {
            return Err(VaultError::LimitExceeded {
                requested: amount,
                available,
            });
        }

        self.outstanding = self
            .outstanding
            .checked_add(amount)
            .ok_or(VaultError::AmountOverflow)?;
        self.updated_at = at;
        Ok(())
    }

    /// Decrease the outstanding balance by `amount`.
    ///
    /// # Errors
    ///
    /// [`VaultError::Overpayment`] if `amount > outstanding`.
    pub fn repay(&mut self, amount: u64, at: DateTime<Utc>) -> Result<(), VaultError> {
        self.outstanding = self
            .outstanding
            .checked_sub(amount)
            .ok_or(VaultError::Overpayment {
                attempted: amount,
                outstanding: self.outstanding,
            })?;
        self.updated_at = at;
        Ok(())
    }

    /// Close the line. Only an open line with nothing outstanding closes.
    pub fn close(&mut self, at: DateTime<Utc>) -> Result<(), VaultError> {
        if self.status != CreditLineStatus::Open {
            return Err(VaultError::CreditLineNotOpen(self.identity));
        }
        if self.outstanding != 0 {
            return Err(VaultError::OutstandingBalance {
                outstanding: self.outstanding,
            });
        }
        self.status = CreditLineStatus::Closed;
        self.closed_at = Some(at);
        self.updated_at = at;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// CreditLineView
// ---------------------------------------------------------------------------

/// Read-only snapshot of an identity's credit line, including `None`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditLineView {
    pub identity: Identity,
    pub status: CreditLineStatus,
    pub risk_score: Option<u32>,
    pub credit_limit: u64,
    pub outstanding: u64,
    pub available: u64,
    pub opened_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
}

impl CreditLineView {
    pub fn none(identity: Identity) -> Self {
        Self {
            identity,
            status: CreditLineStatus::None,
            risk_score: None,
            credit_limit: 0,
            outstanding: 0,
            available: 0,
            opened_at: None,
            closed_at: None,
        }
    }
}

impl From<&CreditLine> for CreditLineView {
    fn from(line: &CreditLine) -> Self {
        Self {
            identity: line.identity,
            status: line.status,
            risk_score: Some(line.risk_score),
            credit_limit: line.credit_limit,
            outstanding: line.outstanding,
            available: line.available(),
            opened_at: Some(line.opened_at),
            closed_at: line.closed_at,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
