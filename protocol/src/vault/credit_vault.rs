//! # Credit Vault
//!
//! Credit-line issuance, loan disbursement, and repayment settlement, gated
//! on the attestation store. Each public operation is one sled transaction
//! over exactly the trees it touches: every precondition is evaluated
//! against the same snapshot the writes commit on, and a conflicting
//! concurrent commit re-runs the whole closure. Two disbursements racing on
//! one identity therefore serialize on the limit check.
//!
//! The vault never calls the proof verifier; it only asks whether the
//! registrar left a *current* attestation (active, and no older than the
//! policy's freshness window). That question is asked again on every
//! disbursement, not cached from open time.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sled::transaction::{abort, TransactionalTree};
use sled::Transactional;

use super::credit::{CreditLine, CreditLineStatus, CreditLineView};
use super::error::VaultError;
use super::limits::{LimitPolicy, RiskBandPolicy};
use super::loan::{Loan, LoanView};
use crate::clock::{Clock, SystemClock};
use crate::config::LedgerPolicy;
use crate::identity::Identity;
use crate::storage::db::{decode, flatten, tx_get, tx_put};
use crate::storage::{AttestationStore, AuditEvent, AuditLog, AuditRecord, Ledger, StoreError};

type TxResult<T> = sled::transaction::ConflictableTransactionResult<T, VaultError>;

/// A committed value together with the audit record written beside it.
type Committed<T> = TxResult<(T, AuditRecord)>;

#[derive(Clone)]
pub struct CreditVault {
    ledger: Ledger,
    policy: LedgerPolicy,
    limits: Arc<dyn LimitPolicy>,
    clock: Arc<dyn Clock>,
}

impl CreditVault {
    /// A vault using the policy's risk bands and the system clock.
    pub fn new(ledger: Ledger, policy: LedgerPolicy) -> Self {
        let limits = Arc::new(RiskBandPolicy::new(policy.band_limits.clone()));
        Self {
            ledger,
            policy,
            limits,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_limit_policy(mut self, limits: Arc<dyn LimitPolicy>) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn policy(&self) -> &LedgerPolicy {
        &self.policy
    }

    // -- Credit lines -------------------------------------------------------

    /// Open a credit line for a currently attested identity.
    ///
    /// # Errors
    ///
    /// `InvalidRiskScore`, `NotAttested`, `AlreadyOpen` (any existing line,
    /// open or closed), `Declined`.
    pub fn open_credit_line(
        &self,
        identity: &Identity,
        risk_score: u32,
    ) -> Result<CreditLineView, VaultError> {
        if !self.policy.accepts_score(risk_score) {
            return Err(VaultError::InvalidRiskScore {
                score: risk_score,
                min: self.policy.min_risk_score,
                max: self.policy.max_risk_score,
            });
        }

        let credit_limit = self.limits.credit_limit(risk_score);
        let now = self.clock.now();

        let committed = (
            self.ledger.attestations().tree(),
            self.ledger.credit_lines_tree(),
            self.ledger.audit().tree(),
            self.ledger.metadata_tree(),
        )
            .transaction(|(attestations, lines, log, meta)| -> Committed<CreditLine> {
                self.require_current(attestations, identity, now)?;

                if let Some(existing) =
                    tx_get::<CreditLine, VaultError>(lines, identity.as_bytes())?
                {
                    return abort(VaultError::AlreadyOpen {
                        identity: *identity,
                        status: existing.status,
                    });
                }
                if credit_limit == 0 {
                    return abort(VaultError::Declined { risk_score });
                }

                let line = CreditLine::open(*identity, risk_score, credit_limit, now);
                tx_put::<_, VaultError>(lines, identity.as_bytes(), &line)?;
                let audit = AuditLog::append_in::<VaultError>(
                    log,
                    meta,
                    now,
                    AuditEvent::CreditLineOpened {
                        identity: *identity,
                        risk_score,
                        credit_limit,
                    },
                )?;
                Ok((line, audit))
            });

        let (line, audit) = self.finish(committed, identity, "open_credit_line")?;
        audit.emit();
        tracing::info!(%identity, risk_score, credit_limit, "credit line opened");
        Ok(CreditLineView::from(&line))
    }

    /// Close the borrower's own credit line. Nothing may be outstanding.
    pub fn close_credit_line(
        &self,
        caller: &Identity,
        identity: &Identity,
    ) -> Result<CreditLineView, VaultError> {
        if caller != identity {
            return Err(VaultError::Unauthorized {
                caller: *caller,
                borrower: *identity,
            });
        }

        let now = self.clock.now();

        let committed = (
            self.ledger.credit_lines_tree(),
            self.ledger.audit().tree(),
            self.ledger.metadata_tree(),
        )
            .transaction(|(lines, log, meta)| -> Committed<CreditLine> {
                let Some(mut line) = tx_get::<CreditLine, VaultError>(lines, identity.as_bytes())?
                else {
                    return abort(VaultError::CreditLineNotOpen(*identity));
                };
                if let Err(e) = line.close(now) {
                    return abort(e);
                }
                tx_put::<_, VaultError>(lines, identity.as_bytes(), &line)?;
                let audit = AuditLog::append_in::<VaultError>(
                    log,
                    meta,
                    now,
                    AuditEvent::CreditLineClosed { identity: *identity },
                )?;
                Ok((line, audit))
            });

        let (line, audit) = self.finish(committed, identity, "close_credit_line")?;
        audit.emit();
        tracing::info!(%identity, "credit line closed");
        Ok(CreditLineView::from(&line))
    }

    pub fn credit_line(&self, identity: &Identity) -> Result<CreditLineView, VaultError> {
        Ok(self
            .read::<CreditLine>(self.ledger.credit_lines_tree(), identity)?
            .map_or_else(|| CreditLineView::none(*identity), |line| CreditLineView::from(&line)))
    }

    // -- Loans --------------------------------------------------------------

    /// Disburse `amount` against the identity's open credit line.
    ///
    /// The attestation is re-checked here, inside the same transaction as
    /// the limit check and the balance update.
    ///
    /// # Errors
    ///
    /// `InvalidAmount`, `CreditLineNotOpen`, `NotAttested`, `LimitExceeded`.
    pub fn disburse_loan(&self, identity: &Identity, amount: u64) -> Result<LoanView, VaultError> {
        if amount == 0 {
            return Err(VaultError::InvalidAmount);
        }

        let now = self.clock.now();

        let committed = (
            self.ledger.attestations().tree(),
            self.ledger.credit_lines_tree(),
            self.ledger.loans_tree(),
            self.ledger.audit().tree(),
            self.ledger.metadata_tree(),
        )
            .transaction(|(attestations, lines, loans, log, meta)| -> Committed<Loan> {
                let mut line = match tx_get::<CreditLine, VaultError>(lines, identity.as_bytes())? {
                    Some(line) if line.status == CreditLineStatus::Open => line,
                    _ => return abort(VaultError::CreditLineNotOpen(*identity)),
                };
                self.require_current(attestations, identity, now)?;

                if let Err(e) = line.draw(amount, now) {
                    return abort(e);
                }

                let loan = match tx_get::<Loan, VaultError>(loans, identity.as_bytes())? {
                    Some(mut loan) if loan.is_active() => {
                        if let Err(e) = loan.top_up(amount, now) {
                            return abort(e);
                        }
                        loan
                    }
                    _ => Loan::disburse(*identity, amount, now),
                };

                tx_put::<_, VaultError>(lines, identity.as_bytes(), &line)?;
                tx_put::<_, VaultError>(loans, identity.as_bytes(), &loan)?;
                let audit = AuditLog::append_in::<VaultError>(
                    log,
                    meta,
                    now,
                    AuditEvent::LoanDisbursed {
                        identity: *identity,
                        loan_id: loan.id,
                        amount,
                        outstanding: loan.outstanding,
                    },
                )?;
                Ok((loan, audit))
            });

        let (loan, audit) = self.finish(committed, identity, "disburse_loan")?;
        audit.emit();
        tracing::info!(
            %identity,
            loan_id = %loan.id,
            amount,
            outstanding = loan.outstanding,
            "loan disbursed"
        );
        Ok(LoanView::from(&loan))
    }

    /// Apply a repayment to the borrower's active loan.
    ///
    /// `caller` must be the borrower or an authorized settlement agent.
    /// Loan and credit line outstanding balances fall together; the loan
    /// settles when its balance reaches exactly zero.
    ///
    /// # Errors
    ///
    /// `Unauthorized`, `LoanNotActive`, `InvalidAmount`, `Overpayment`.
    pub fn settle(
        &self,
        caller: &Identity,
        borrower: &Identity,
        amount: u64,
    ) -> Result<LoanView, VaultError> {
        let now = self.clock.now();

        let committed = (
            self.ledger.agents_tree(),
            self.ledger.credit_lines_tree(),
            self.ledger.loans_tree(),
            self.ledger.audit().tree(),
            self.ledger.metadata_tree(),
        )
            .transaction(|(agents, lines, loans, log, meta)| -> Committed<Loan> {
                if caller != borrower && agents.get(caller.as_bytes())?.is_none() {
                    return abort(VaultError::Unauthorized {
                        caller: *caller,
                        borrower: *borrower,
                    });
                }

                let Some(mut loan) = tx_get::<Loan, VaultError>(loans, borrower.as_bytes())? else {
                    return abort(VaultError::LoanNotActive(*borrower));
                };
                let fully_settled = match loan.settle(amount, now) {
                    Ok(done) => done,
                    Err(e) => return abort(e),
                };

                let Some(mut line) = tx_get::<CreditLine, VaultError>(lines, borrower.as_bytes())?
                else {
                    return abort(VaultError::CreditLineNotOpen(*borrower));
                };
                if let Err(e) = line.repay(amount, now) {
                    return abort(e);
                }

                tx_put::<_, VaultError>(loans, borrower.as_bytes(), &loan)?;
                tx_put::<_, VaultError>(lines, borrower.as_bytes(), &line)?;
                let audit = AuditLog::append_in::<VaultError>(
                    log,
                    meta,
                    now,
                    AuditEvent::LoanSettled {
                        identity: *borrower,
                        loan_id: loan.id,
                        settled_by: *caller,
                        amount,
                        outstanding: loan.outstanding,
                        fully_settled,
                    },
                )?;
                Ok((loan, audit))
            });

        let (loan, audit) = self.finish(committed, borrower, "settle")?;
        audit.emit();
        tracing::info!(
            identity = %borrower,
            caller = %caller,
            loan_id = %loan.id,
            amount,
            outstanding = loan.outstanding,
            status = %loan.status,
            "repayment settled"
        );
        Ok(LoanView::from(&loan))
    }

    pub fn loan(&self, identity: &Identity) -> Result<LoanView, VaultError> {
        Ok(self
            .read::<Loan>(self.ledger.loans_tree(), identity)?
            .map_or_else(|| LoanView::none(*identity), |loan| LoanView::from(&loan)))
    }

    // -- Settlement agents --------------------------------------------------

    /// Allow `agent` to settle on behalf of any borrower. Returns `false`
    /// if it was already authorized.
    pub fn authorize_settlement_agent(&self, agent: &Identity) -> Result<bool, VaultError> {
        let now = self.clock.now();

        let committed = (
            self.ledger.agents_tree(),
            self.ledger.audit().tree(),
            self.ledger.metadata_tree(),
        )
            .transaction(|(agents, log, meta)| -> TxResult<Option<AuditRecord>> {
                if agents.get(agent.as_bytes())?.is_some() {
                    return Ok(None);
                }
                tx_put::<_, VaultError>(agents, agent.as_bytes(), &now)?;
                let audit = AuditLog::append_in::<VaultError>(
                    log,
                    meta,
                    now,
                    AuditEvent::SettlementAgentAuthorized { agent: *agent },
                )?;
                Ok(Some(audit))
            });

        let added = self.finish(committed, agent, "authorize_settlement_agent")?;
        if let Some(audit) = &added {
            audit.emit();
        }
        Ok(added.is_some())
    }

    /// Withdraw an agent's authorization. Returns `false` if it had none.
    pub fn revoke_settlement_agent(&self, agent: &Identity) -> Result<bool, VaultError> {
        let now = self.clock.now();

        let committed = (
            self.ledger.agents_tree(),
            self.ledger.audit().tree(),
            self.ledger.metadata_tree(),
        )
            .transaction(|(agents, log, meta)| -> TxResult<Option<AuditRecord>> {
                if agents.remove(agent.as_bytes())?.is_none() {
                    return Ok(None);
                }
                let audit = AuditLog::append_in::<VaultError>(
                    log,
                    meta,
                    now,
                    AuditEvent::SettlementAgentRevoked { agent: *agent },
                )?;
                Ok(Some(audit))
            });

        let removed = self.finish(committed, agent, "revoke_settlement_agent")?;
        if let Some(audit) = &removed {
            audit.emit();
        }
        Ok(removed.is_some())
    }

    pub fn is_settlement_agent(&self, agent: &Identity) -> Result<bool, VaultError> {
        Ok(self
            .ledger
            .agents_tree()
            .contains_key(agent.as_bytes())
            .map_err(StoreError::from)?)
    }

    /// Every authorized agent with its authorization time.
    pub fn settlement_agents(&self) -> Result<Vec<(Identity, DateTime<Utc>)>, VaultError> {
        let mut agents = Vec::new();
        for item in self.ledger.agents_tree().iter() {
            let (key, value) = item.map_err(StoreError::from)?;
            let Ok(agent) = Identity::from_key(&key) else {
                tracing::warn!(key = %hex::encode(&key), "skipping malformed agent key");
                continue;
            };
            agents.push((agent, decode(&value)?));
        }
        Ok(agents)
    }

    /// Authorize every agent listed in the policy. Returns how many were
    /// newly added.
    pub fn bootstrap_agents(&self) -> Result<usize, VaultError> {
        let mut added = 0;
        for agent in &self.policy.settlement_agents {
            if self.authorize_settlement_agent(agent)? {
                added += 1;
            }
        }
        Ok(added)
    }

    // -- Internals ----------------------------------------------------------

    fn require_current(
        &self,
        attestations: &TransactionalTree,
        identity: &Identity,
        now: DateTime<Utc>,
    ) -> TxResult<()> {
        let current = AttestationStore::get_in::<VaultError>(attestations, identity)?
            .is_some_and(|record| record.is_current(now, self.policy.attestation_max_age()));
        if current {
            Ok(())
        } else {
            abort(VaultError::NotAttested(*identity))
        }
    }

    fn read<T: serde::de::DeserializeOwned>(
        &self,
        tree: &sled::Tree,
        identity: &Identity,
    ) -> Result<Option<T>, VaultError> {
        let bytes = tree
            .get(identity.as_bytes())
            .map_err(StoreError::from)?;
        Ok(bytes.map(|b| decode(&b)).transpose()?)
    }

    /// Collapse the transaction result, log rejections, flush on commit.
    fn finish<T>(
        &self,
        committed: Result<T, sled::transaction::TransactionError<VaultError>>,
        identity: &Identity,
        operation: &'static str,
    ) -> Result<T, VaultError> {
        match flatten(committed) {
            Ok(value) => {
                self.ledger.flush_committed(operation);
                Ok(value)
            }
            Err(VaultError::Storage(e)) => {
                tracing::error!(%identity, operation, error = %e, "vault storage failure");
                Err(VaultError::Storage(e))
            }
            Err(e) => {
                tracing::info!(%identity, operation, reason = %e, "vault operation rejected");
                Err(e)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
