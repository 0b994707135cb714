//! Terminal walkthrough of the zkcredit lifecycle.
//!
//! Runs a development ceremony, derives a borrower address from an Ed25519
//! key, proves and attests a biometric match for it, then opens a credit
//! line, disburses, and repays in two instalments. A replayed proof and an
//! over-limit request are shown being rejected along the way.
//!
//! Run with:
//!   cargo run --example demo --release

use std::sync::Arc;
use std::time::Instant;

use ark_bn254::Fr;
use ark_ff::UniformRand;
use ark_std::rand::{rngs::StdRng, SeedableRng};
use ed25519_dalek::SigningKey;

use zkcredit_protocol::config::LedgerPolicy;
use zkcredit_protocol::identity::Identity;
use zkcredit_protocol::registry::AttestationRegistrar;
use zkcredit_protocol::storage::Ledger;
use zkcredit_protocol::vault::CreditVault;
use zkcredit_protocol::zkp::{AttestationProver, AttestationWitness};

// ---------------------------------------------------------------------------
// ANSI color constants
// ---------------------------------------------------------------------------

const RESET: &str = "\x1b[0m";
const BOLD: &str = "\x1b[1m";
const DIM: &str = "\x1b[2m";

const GREEN: &str = "\x1b[32m";
const YELLOW: &str = "\x1b[33m";
const RED: &str = "\x1b[31m";
const MAGENTA: &str = "\x1b[35m";
const CYAN: &str = "\x1b[36m";
const WHITE: &str = "\x1b[37m";

// ---------------------------------------------------------------------------
// Display helpers
// ---------------------------------------------------------------------------

fn section(num: u32, title: &str) {
    println!();
    println!("{BOLD}{CYAN}[{num}]{RESET} {BOLD}{WHITE}{title}{RESET}");
}

fn success(text: &str) {
    println!("{GREEN}  [OK] {text}{RESET}");
}

fn rejected(text: &str) {
    println!("{RED}  [REJECTED] {text}{RESET}");
}

fn info(label: &str, value: &str) {
    println!("{WHITE}  {BOLD}{label}:{RESET} {YELLOW}{value}{RESET}");
}

fn timing(label: &str, elapsed: std::time::Duration) {
    let ms = elapsed.as_secs_f64() * 1000.0;
    println!("{DIM}{MAGENTA}  [{label}: {ms:.2} ms]{RESET}");
}

fn main() -> anyhow::Result<()> {
    let mut rng = StdRng::seed_from_u64(2026);
    let borrower_key = SigningKey::generate(&mut rng);
    let borrower = Identity::from_public_key(&borrower_key.verifying_key());

    section(1, "Development ceremony");
    let started = Instant::now();
    let (prover, verifier) = AttestationProver::setup(&mut rng);
    timing("groth16 setup", started.elapsed());

    let ledger = Ledger::open_temporary()?;
    let registrar = AttestationRegistrar::new(ledger.clone(), Arc::new(verifier));
    let vault = CreditVault::new(ledger.clone(), LedgerPolicy::default());
    success("ledger opened");

    section(2, "Prove a biometric match");
    let witness = AttestationWitness {
        secret: Fr::rand(&mut rng),
        blinding: Fr::rand(&mut rng),
        session: Fr::rand(&mut rng),
        similarity: 9_240,
        threshold: 8_500,
        identity: borrower,
    };
    let started = Instant::now();
    let (proof, signals) = prover.prove(&witness, &mut rng)?;
    timing("groth16 prove", started.elapsed());
    let nullifier = signals.nullifier_hash();
    info("public key", &hex::encode(borrower_key.verifying_key().as_bytes()));
    info("identity", &borrower.to_hex());
    info("nullifier", &nullifier.to_hex());

    section(3, "Attest");
    let started = Instant::now();
    let receipt = registrar.attest(&proof, &signals, &nullifier, &borrower)?;
    timing("attest", started.elapsed());
    success(&format!("attested at {} (audit seq {})", receipt.attested_at, receipt.seq));

    match registrar.attest(&proof, &signals, &nullifier, &borrower) {
        Err(e) => rejected(&format!("resubmission: {e}")),
        Ok(_) => anyhow::bail!("replayed proof was accepted"),
    }

    section(4, "Open a credit line");
    let line = vault.open_credit_line(&borrower, 720)?;
    info("risk score", "720");
    info("credit limit", &line.credit_limit.to_string());

    section(5, "Borrow");
    if let Err(e) = vault.disburse_loan(&borrower, line.credit_limit + 1) {
        rejected(&e.to_string());
    }
    let loan = vault.disburse_loan(&borrower, line.credit_limit)?;
    success(&format!("disbursed {} (outstanding {})", loan.principal, loan.outstanding));

    section(6, "Repay in two instalments");
    let half = line.credit_limit / 2;
    let loan = vault.settle(&borrower, &borrower, half)?;
    info("status", &loan.status.to_string());
    info("outstanding", &loan.outstanding.to_string());
    let loan = vault.settle(&borrower, &borrower, line.credit_limit - half)?;
    info("status", &loan.status.to_string());
    info("outstanding", &loan.outstanding.to_string());

    section(7, "Audit trail");
    for record in ledger.audit().since(0)? {
        println!(
            "  {DIM}#{:<3}{RESET} {:<20} {}",
            record.seq,
            record.event.kind(),
            record.event.subject()
        );
    }
    println!();
    Ok(())
}
