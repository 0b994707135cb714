//! End-to-end integration tests for zkcredit.
//!
//! These tests drive the whole pipeline with real Groth16 proofs: witness
//! construction, proving, registrar attestation, credit-line issuance,
//! disbursement, and settlement, all against a sled ledger.
//!
//! Each test builds its own ledger. The proving key is generated once per
//! test from a fixed seed, so runs are deterministic.

use std::sync::{Arc, Barrier};
use std::thread;

use ark_bn254::Fr;
use ark_std::rand::{rngs::StdRng, SeedableRng};

use zkcredit_protocol::clock::ManualClock;
use zkcredit_protocol::config::{LedgerPolicy, DEFAULT_SIMILARITY_THRESHOLD};
use zkcredit_protocol::identity::Identity;
use zkcredit_protocol::registry::{AttestationError, AttestationRegistrar};
use zkcredit_protocol::storage::{AuditEvent, Ledger};
use zkcredit_protocol::vault::{CreditLineStatus, CreditVault, LoanStatus, VaultError};
use zkcredit_protocol::zkp::{
    AttestationProver, AttestationWitness, Groth16Verifier, Nullifier, Proof, PublicSignals,
};

// ---------------------------------------------------------------------------
// Test Helpers
// ---------------------------------------------------------------------------

struct Harness {
    rng: StdRng,
    prover: AttestationProver,
    registrar: AttestationRegistrar,
    vault: CreditVault,
    clock: ManualClock,
}

impl Harness {
    fn new() -> Self {
        Self::with_ledger(Ledger::open_temporary().expect("temp ledger"))
    }

    fn with_ledger(ledger: Ledger) -> Self {
        let mut rng = StdRng::seed_from_u64(7);
        let (prover, verifier) = AttestationProver::setup(&mut rng);
        Self::assemble(rng, prover, verifier, ledger)
    }

    fn assemble(
        rng: StdRng,
        prover: AttestationProver,
        verifier: Groth16Verifier,
        ledger: Ledger,
    ) -> Self {
        let clock = ManualClock::default();
        let registrar = AttestationRegistrar::new(ledger.clone(), Arc::new(verifier))
            .with_clock(Arc::new(clock.clone()));
        let vault = CreditVault::new(ledger, LedgerPolicy::default())
            .with_clock(Arc::new(clock.clone()));
        Self {
            rng,
            prover,
            registrar,
            vault,
            clock,
        }
    }

    /// A valid proof for `identity` with a fresh session.
    fn prove(&mut self, identity: Identity) -> (Proof, PublicSignals, Nullifier) {
        let witness = AttestationWitness {
            secret: Fr::from(0x5ec7_e7u64),
            blinding: Fr::from(99u64),
            session: Fr::from(rand_session(&mut self.rng)),
            similarity: 9_120,
            threshold: DEFAULT_SIMILARITY_THRESHOLD,
            identity,
        };
        let (proof, signals) = self.prover.prove(&witness, &mut self.rng).expect("prove");
        let nullifier = signals.nullifier_hash();
        (proof, signals, nullifier)
    }

    fn attest(&mut self, identity: Identity) -> Nullifier {
        let (proof, signals, nullifier) = self.prove(identity);
        self.registrar
            .attest(&proof, &signals, &nullifier, &identity)
            .expect("attest");
        nullifier
    }
}

fn rand_session(rng: &mut StdRng) -> u64 {
    use ark_std::rand::Rng;
    rng.gen()
}

fn alice() -> Identity {
    Identity::from_bytes([0xa1; 20])
}

fn bob() -> Identity {
    Identity::from_bytes([0xb0; 20])
}

// ---------------------------------------------------------------------------
// Attestation
// ---------------------------------------------------------------------------

#[test]
fn fresh_proof_attests_identity() {
    let mut h = Harness::new();
    let (proof, signals, nullifier) = h.prove(alice());

    assert!(!h.registrar.is_attested(&alice()).unwrap());
    let receipt = h
        .registrar
        .attest(&proof, &signals, &nullifier, &alice())
        .unwrap();

    assert_eq!(receipt.nullifier, nullifier);
    assert!(h.registrar.is_attested(&alice()).unwrap());
    assert!(h.registrar.ledger().nullifiers().is_registered(&nullifier).unwrap());
}

#[test]
fn identical_resubmission_is_a_replay() {
    let mut h = Harness::new();
    let (proof, signals, nullifier) = h.prove(alice());
    h.registrar.attest(&proof, &signals, &nullifier, &alice()).unwrap();

    match h.registrar.attest(&proof, &signals, &nullifier, &alice()) {
        Err(AttestationError::ReplayDetected(n)) => assert_eq!(n, nullifier),
        other => panic!("expected ReplayDetected, got {other:?}"),
    }
    assert_eq!(h.registrar.ledger().audit().len(), 1);
}

#[test]
fn mismatched_nullifier_rejected() {
    let mut h = Harness::new();
    let (proof, signals, _) = h.prove(bob());
    let other = Nullifier::from_field(&Fr::from(12_345u64));

    assert!(matches!(
        h.registrar.attest(&proof, &signals, &other, &bob()),
        Err(AttestationError::ParameterMismatch { signal: 1, .. })
    ));
    assert!(!h.registrar.is_attested(&bob()).unwrap());
    assert!(h.registrar.ledger().nullifiers().is_empty());
}

#[test]
fn proof_bound_to_another_identity_rejected() {
    let mut h = Harness::new();
    let (proof, signals, nullifier) = h.prove(alice());

    assert!(matches!(
        h.registrar.attest(&proof, &signals, &nullifier, &bob()),
        Err(AttestationError::ParameterMismatch { signal: 3, .. })
    ));
    assert!(h.registrar.ledger().attestations().is_empty());
}

#[test]
fn tampered_signals_fail_verification() {
    let mut h = Harness::new();
    let (proof, signals, nullifier) = h.prove(alice());

    let mut values = [Fr::from(0u64); 4];
    values.copy_from_slice(signals.as_slice());
    values[2] = Fr::from(1u64);
    let lowered = PublicSignals::new(values);

    assert!(matches!(
        h.registrar.attest(&proof, &lowered, &nullifier, &alice()),
        Err(AttestationError::InvalidProof)
    ));
    assert!(h.registrar.ledger().nullifiers().is_empty());
    assert!(h.registrar.ledger().attestations().is_empty());
    assert!(h.registrar.ledger().audit().is_empty());

    // The untampered submission still goes through afterwards.
    h.registrar.attest(&proof, &signals, &nullifier, &alice()).unwrap();
}

#[test]
fn snarkjs_json_artifacts_attest() {
    let mut h = Harness::new();
    let (proof, signals, nullifier) = h.prove(alice());

    let proof_json = serde_json::to_string(&proof).unwrap();
    let signals_json = serde_json::to_string(&signals.to_decimal_strings()).unwrap();
    let vk_json = serde_json::to_string(&h.prover.verifier().unwrap().to_snarkjs()).unwrap();

    let proof: Proof = serde_json::from_str(&proof_json).unwrap();
    let strings: Vec<String> = serde_json::from_str(&signals_json).unwrap();
    let signals = PublicSignals::from_decimal_strings(&strings).unwrap();
    let verifier = Groth16Verifier::from_snarkjs_json(&vk_json).unwrap();

    let registrar = AttestationRegistrar::new(h.registrar.ledger().clone(), Arc::new(verifier));
    registrar.attest(&proof, &signals, &nullifier, &alice()).unwrap();
    assert!(registrar.is_attested(&alice()).unwrap());
}

#[test]
fn concurrent_replays_yield_one_success() {
    let mut h = Harness::new();
    let (proof, signals, nullifier) = h.prove(alice());

    let workers = 8;
    let barrier = Arc::new(Barrier::new(workers));
    let handles: Vec<_> = (0..workers)
        .map(|_| {
            let registrar = h.registrar.clone();
            let barrier = Arc::clone(&barrier);
            let proof = proof.clone();
            thread::spawn(move || {
                barrier.wait();
                registrar.attest(&proof, &signals, &nullifier, &alice())
            })
        })
        .collect();

    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    let accepted = results.iter().filter(|r| r.is_ok()).count();
    let replays = results
        .iter()
        .filter(|r| matches!(r, Err(AttestationError::ReplayDetected(_))))
        .count();

    assert_eq!(accepted, 1);
    assert_eq!(replays, workers - 1);
    assert_eq!(h.registrar.ledger().nullifiers().len(), 1);
    assert_eq!(h.registrar.ledger().audit().len(), 1);
}

// ---------------------------------------------------------------------------
// Credit
// ---------------------------------------------------------------------------

#[test]
fn credit_line_requires_attestation() {
    let mut h = Harness::new();

    assert!(matches!(
        h.vault.open_credit_line(&alice(), 720),
        Err(VaultError::NotAttested(_))
    ));

    h.attest(alice());
    let line = h.vault.open_credit_line(&alice(), 720).unwrap();
    assert_eq!(line.status, CreditLineStatus::Open);
    assert_eq!(line.credit_limit, 250_000);
}

#[test]
fn full_credit_lifecycle() {
    let mut h = Harness::new();
    h.attest(alice());
    let limit = h.vault.open_credit_line(&alice(), 720).unwrap().credit_limit;

    assert!(matches!(
        h.vault.disburse_loan(&alice(), limit + 1),
        Err(VaultError::LimitExceeded { .. })
    ));

    let loan = h.vault.disburse_loan(&alice(), limit).unwrap();
    assert_eq!(loan.status, LoanStatus::Active);
    assert_eq!(loan.outstanding, limit);
    assert_eq!(h.vault.credit_line(&alice()).unwrap().outstanding, limit);

    let loan = h.vault.settle(&alice(), &alice(), limit / 2).unwrap();
    assert_eq!(loan.status, LoanStatus::Active);
    assert_eq!(loan.outstanding, limit - limit / 2);

    let loan = h.vault.settle(&alice(), &alice(), limit - limit / 2).unwrap();
    assert_eq!(loan.status, LoanStatus::Settled);
    assert_eq!(loan.outstanding, 0);

    let kinds: Vec<&str> = h
        .vault
        .ledger()
        .audit()
        .since(0)
        .unwrap()
        .iter()
        .map(|r| r.event.kind())
        .collect();
    assert_eq!(
        kinds,
        [
            "AttestationAccepted",
            "CreditLineOpened",
            "LoanDisbursed",
            "LoanSettled",
            "LoanSettled",
        ]
    );
}

#[test]
fn concurrent_disbursements_never_exceed_limit() {
    let mut h = Harness::new();
    h.attest(alice());
    let limit = h.vault.open_credit_line(&alice(), 800).unwrap().credit_limit;
    let chunk = limit / 4;

    let workers = 10;
    let barrier = Arc::new(Barrier::new(workers));
    let handles: Vec<_> = (0..workers)
        .map(|_| {
            let vault = h.vault.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                vault.disburse_loan(&alice(), chunk)
            })
        })
        .collect();

    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    let granted = results.iter().filter(|r| r.is_ok()).count() as u64;
    assert!(results
        .iter()
        .all(|r| r.is_ok() || matches!(r, Err(VaultError::LimitExceeded { .. }))));

    assert_eq!(granted, 4);
    let line = h.vault.credit_line(&alice()).unwrap();
    assert_eq!(line.outstanding, granted * chunk);
    assert!(line.outstanding <= line.credit_limit);
    assert_eq!(h.vault.loan(&alice()).unwrap().outstanding, line.outstanding);
}

#[test]
fn independent_identities_do_not_interfere() {
    let mut h = Harness::new();
    h.attest(alice());
    h.attest(bob());
    h.vault.open_credit_line(&alice(), 760).unwrap();
    h.vault.open_credit_line(&bob(), 560).unwrap();

    h.vault.disburse_loan(&alice(), 400_000).unwrap();
    assert!(matches!(
        h.vault.disburse_loan(&bob(), 100_001),
        Err(VaultError::LimitExceeded { .. })
    ));
    h.vault.disburse_loan(&bob(), 100_000).unwrap();
    assert_eq!(h.vault.credit_line(&alice()).unwrap().available, 100_000);
}

#[test]
fn stale_attestation_blocks_new_credit_until_reattested() {
    let mut h = Harness::new();
    h.attest(alice());
    h.vault.open_credit_line(&alice(), 700).unwrap();

    let max_age = h
        .vault
        .policy()
        .attestation_max_age()
        .expect("default policy expires attestations");
    h.clock.advance(max_age + chrono::Duration::seconds(1));

    assert!(matches!(
        h.vault.disburse_loan(&alice(), 10),
        Err(VaultError::NotAttested(_))
    ));

    // A fresh proof (new session, new nullifier) restores eligibility.
    h.attest(alice());
    h.vault.disburse_loan(&alice(), 10).unwrap();
}

#[test]
fn agent_settles_on_behalf_of_borrower() {
    let mut h = Harness::new();
    let agent = Identity::from_bytes([0xee; 20]);
    h.attest(alice());
    h.vault.open_credit_line(&alice(), 700).unwrap();
    h.vault.disburse_loan(&alice(), 1_000).unwrap();

    assert!(matches!(
        h.vault.settle(&agent, &alice(), 1_000),
        Err(VaultError::Unauthorized { .. })
    ));

    h.vault.authorize_settlement_agent(&agent).unwrap();
    let loan = h.vault.settle(&agent, &alice(), 1_000).unwrap();
    assert_eq!(loan.status, LoanStatus::Settled);

    let last = h.vault.ledger().audit().latest(1).unwrap();
    match &last[0].event {
        AuditEvent::LoanSettled {
            settled_by,
            fully_settled,
            ..
        } => {
            assert_eq!(*settled_by, agent);
            assert!(*fully_settled);
        }
        other => panic!("unexpected event {other:?}"),
    }
}

// ---------------------------------------------------------------------------
// Durability
// ---------------------------------------------------------------------------

#[test]
fn ledger_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let mut rng = StdRng::seed_from_u64(11);
    let (prover, verifier) = AttestationProver::setup(&mut rng);

    let nullifier;
    {
        let ledger = Ledger::open(dir.path()).unwrap();
        let mut h = Harness::assemble(rng.clone(), prover, verifier.clone(), ledger);
        nullifier = h.attest(alice());
        h.vault.open_credit_line(&alice(), 720).unwrap();
        h.vault.disburse_loan(&alice(), 5_000).unwrap();
    }

    let ledger = Ledger::open(dir.path()).unwrap();
    let registrar = AttestationRegistrar::new(ledger.clone(), Arc::new(verifier));
    let vault = CreditVault::new(ledger, LedgerPolicy::default());

    assert!(registrar.is_attested(&alice()).unwrap());
    assert!(registrar.ledger().nullifiers().is_registered(&nullifier).unwrap());
    assert_eq!(vault.credit_line(&alice()).unwrap().outstanding, 5_000);
    assert_eq!(vault.loan(&alice()).unwrap().status, LoanStatus::Active);
    assert_eq!(vault.ledger().audit().len(), 3);
}
