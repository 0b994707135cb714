use thiserror::Error;

use super::credit::CreditLineStatus;
use crate::identity::Identity;
use crate::storage::StoreError;

/// Errors returned by credit-vault operations.
///
/// Everything except `Storage` is a terminal policy or state rejection:
/// the ledger is unchanged and the caller decides what to do next.
#[derive(Debug, Error)]
pub enum VaultError {
    /// No current attestation (missing, revoked, or older than the
    /// freshness window).
    #[error("identity {0} has no current attestation")]
    NotAttested(Identity),

    #[error("identity {identity} already has a credit line ({status})")]
    AlreadyOpen {
        identity: Identity,
        status: CreditLineStatus,
    },

    #[error("identity {0} has no open credit line")]
    CreditLineNotOpen(Identity),

    #[error("credit limit exceeded: requested {requested}, available {available}")]
    LimitExceeded { requested: u64, available: u64 },

    #[error("identity {0} has no active loan")]
    LoanNotActive(Identity),

    /// The caller is neither the borrower nor an authorized agent.
    #[error("{caller} may not act on behalf of {borrower}")]
    Unauthorized { caller: Identity, borrower: Identity },

    #[error("amount must be greater than zero")]
    InvalidAmount,

    #[error("overpayment: attempted to repay {attempted} but only {outstanding} outstanding")]
    Overpayment { attempted: u64, outstanding: u64 },

    #[error("credit line still has {outstanding} outstanding")]
    OutstandingBalance { outstanding: u64 },

    #[error("risk score {score} outside accepted range {min}..={max}")]
    InvalidRiskScore { score: u32, min: u32, max: u32 },

    /// The limit policy grants no credit at this risk score.
    #[error("credit declined at risk score {risk_score}")]
    Declined { risk_score: u32 },

    #[error("amount overflow")]
    AmountOverflow,

    #[error(transparent)]
    Storage(#[from] StoreError),
}
