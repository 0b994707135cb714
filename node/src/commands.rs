//! # Command Handlers
//!
//! One function per subcommand. Each returns the JSON document `main`
//! prints on stdout; any rejection surfaces as an `anyhow` error carrying
//! the library's typed error as its source.
//!
//! ## Data directory layout
//!
//! ```text
//! <data-dir>/
//! ├── ledger/                   sled database
//! ├── proving.key               circuit params + Groth16 proving key (dev only)
//! ├── verifying.key             compressed Groth16 verifying key
//! └── verification_key.json     the same key in snarkjs form
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use ark_bn254::Fr;
use ark_ff::UniformRand;
use rand::rngs::{OsRng, StdRng};
use rand::SeedableRng;
use serde_json::{json, Value};

use zkcredit_protocol::config::LedgerPolicy;
use zkcredit_protocol::identity::Identity;
use zkcredit_protocol::registry::AttestationRegistrar;
use zkcredit_protocol::storage::Ledger;
use zkcredit_protocol::vault::CreditVault;
use zkcredit_protocol::zkp::signals::parse_field;
use zkcredit_protocol::zkp::{
    AttestationProver, AttestationWitness, Groth16Verifier, Nullifier, Proof, PublicSignals,
};

use crate::cli;

const LEDGER_DIR: &str = "ledger";
const PROVING_KEY_FILE: &str = "proving.key";
const VERIFYING_KEY_FILE: &str = "verifying.key";
const VERIFYING_KEY_JSON: &str = "verification_key.json";

// ---------------------------------------------------------------------------
// Workspace
// ---------------------------------------------------------------------------

/// An opened data directory: ledger plus policy.
pub struct Workspace {
    data_dir: PathBuf,
    ledger: Ledger,
    policy: LedgerPolicy,
}

impl Workspace {
    pub fn open(data_dir: &Path, policy: Option<&Path>) -> Result<Self> {
        let policy = match policy {
            Some(path) => LedgerPolicy::from_json_file(path)
                .with_context(|| format!("failed to load policy from {}", path.display()))?,
            None => LedgerPolicy::default(),
        };

        let ledger_path = data_dir.join(LEDGER_DIR);
        fs::create_dir_all(&ledger_path).with_context(|| {
            format!("failed to create ledger directory: {}", ledger_path.display())
        })?;
        let ledger = Ledger::open(&ledger_path)
            .with_context(|| format!("failed to open ledger at {}", ledger_path.display()))?;
        tracing::debug!(path = %ledger_path.display(), "ledger opened");

        Ok(Self {
            data_dir: data_dir.to_path_buf(),
            ledger,
            policy,
        })
    }

    fn vault(&self) -> CreditVault {
        CreditVault::new(self.ledger.clone(), self.policy.clone())
    }

    fn registrar(&self, verification_key: Option<&Path>) -> Result<AttestationRegistrar> {
        let verifier = match verification_key {
            Some(path) => {
                let raw = fs::read_to_string(path)
                    .with_context(|| format!("failed to read {}", path.display()))?;
                Groth16Verifier::from_snarkjs_json(&raw)
                    .with_context(|| format!("invalid verification key {}", path.display()))?
            }
            None => {
                let path = self.data_dir.join(VERIFYING_KEY_FILE);
                let bytes = fs::read(&path).with_context(|| {
                    format!("failed to read {} (run `zkcredit init` first)", path.display())
                })?;
                Groth16Verifier::vk_from_bytes(&bytes)
                    .with_context(|| format!("invalid verifying key {}", path.display()))?
            }
        };
        Ok(AttestationRegistrar::new(self.ledger.clone(), Arc::new(verifier)))
    }
}

fn identity(raw: &str) -> Result<Identity> {
    raw.parse().with_context(|| format!("invalid identity {raw:?}"))
}

fn field(raw: Option<&str>, name: &str) -> Result<Fr> {
    match raw {
        Some(s) => parse_field(s)
            .with_context(|| format!("{name} is not a canonical decimal field element")),
        None => Ok(Fr::rand(&mut OsRng)),
    }
}

fn write_json(path: &Path, value: &impl serde::Serialize) -> Result<()> {
    let body = serde_json::to_string_pretty(value)?;
    fs::write(path, body).with_context(|| format!("failed to write {}", path.display()))
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let raw =
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("failed to parse {}", path.display()))
}

// ---------------------------------------------------------------------------
// Setup & proving
// ---------------------------------------------------------------------------

/// Address of an Ed25519 public key.
pub fn derive_identity(args: &cli::IdentityArgs) -> Result<Value> {
    let identity = Identity::from_public_key_hex(&args.public_key)
        .with_context(|| format!("invalid public key {:?}", args.public_key))?;
    Ok(json!({ "public_key": args.public_key, "identity": identity }))
}

/// Create the data directory, the ledger, and a development ceremony.
pub fn init(data_dir: &Path, args: &cli::InitArgs) -> Result<Value> {
    fs::create_dir_all(data_dir)
        .with_context(|| format!("failed to create data directory: {}", data_dir.display()))?;

    let pk_path = data_dir.join(PROVING_KEY_FILE);
    if pk_path.exists() && !args.force {
        bail!("{} already exists (pass --force to overwrite)", pk_path.display());
    }

    tracing::info!(
        data_dir = %data_dir.display(),
        seeded = args.seed.is_some(),
        "running development ceremony"
    );
    let (prover, verifier) = match args.seed {
        Some(seed) => AttestationProver::setup(&mut StdRng::seed_from_u64(seed)),
        None => AttestationProver::setup(&mut OsRng),
    };

    fs::write(&pk_path, prover.to_bytes()?)
        .with_context(|| format!("failed to write {}", pk_path.display()))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&pk_path, fs::Permissions::from_mode(0o600))?;
    }

    let vk_path = data_dir.join(VERIFYING_KEY_FILE);
    fs::write(&vk_path, verifier.vk_to_bytes()?)
        .with_context(|| format!("failed to write {}", vk_path.display()))?;
    let vk_json_path = data_dir.join(VERIFYING_KEY_JSON);
    write_json(&vk_json_path, &verifier.to_snarkjs())?;

    let workspace = Workspace::open(data_dir, None)?;
    Ok(json!({
        "data_dir": data_dir,
        "proving_key": pk_path,
        "verifying_key": vk_path,
        "verification_key_json": vk_json_path,
        "schema_version": workspace.ledger.schema_version()?,
    }))
}

/// Produce `proof.json` and `public.json` with the development proving key.
pub fn prove(data_dir: &Path, args: &cli::ProveArgs) -> Result<Value> {
    let pk_path = data_dir.join(PROVING_KEY_FILE);
    let bytes = fs::read(&pk_path).with_context(|| {
        format!("failed to read {} (run `zkcredit init` first)", pk_path.display())
    })?;
    let prover = AttestationProver::from_bytes(&bytes)?;

    let witness = AttestationWitness {
        secret: field(args.secret.as_deref(), "secret")?,
        blinding: field(args.blinding.as_deref(), "blinding")?,
        session: Fr::rand(&mut OsRng),
        similarity: args.similarity,
        threshold: args.threshold,
        identity: identity(&args.identity)?,
    };
    let (proof, signals) = prover.prove(&witness, &mut OsRng)?;

    fs::create_dir_all(&args.out_dir)
        .with_context(|| format!("failed to create {}", args.out_dir.display()))?;
    let proof_path = args.out_dir.join("proof.json");
    let signals_path = args.out_dir.join("public.json");
    write_json(&proof_path, &proof)?;
    write_json(&signals_path, &signals.to_decimal_strings())?;

    Ok(json!({
        "identity": witness.identity,
        "nullifier": signals.nullifier_hash(),
        "proof": proof_path,
        "signals": signals_path,
    }))
}

// ---------------------------------------------------------------------------
// Registrar
// ---------------------------------------------------------------------------

pub fn attest(ws: &Workspace, args: &cli::AttestArgs) -> Result<Value> {
    let identity = identity(&args.identity)?;
    let proof: Proof = read_json(&args.proof)?;
    let strings: Vec<String> = read_json(&args.signals)?;
    let signals = PublicSignals::from_decimal_strings(&strings)
        .with_context(|| format!("invalid public signals in {}", args.signals.display()))?;
    let nullifier: Nullifier = match &args.nullifier {
        Some(raw) => raw.parse().with_context(|| format!("invalid nullifier {raw:?}"))?,
        None => signals.nullifier_hash(),
    };

    let registrar = ws.registrar(args.verification_key.as_deref())?;
    let receipt = registrar.attest(&proof, &signals, &nullifier, &identity)?;
    Ok(serde_json::to_value(receipt)?)
}

pub fn revoke(ws: &Workspace, args: &cli::RevokeArgs) -> Result<Value> {
    let identity = identity(&args.identity)?;
    let record = ws.registrar(None)?.revoke(&identity, &args.reason)?;
    Ok(json!({ "identity": identity, "attestation": record }))
}

// ---------------------------------------------------------------------------
// Vault
// ---------------------------------------------------------------------------

pub fn open_credit(ws: &Workspace, args: &cli::OpenCreditArgs) -> Result<Value> {
    let view = ws.vault().open_credit_line(&identity(&args.identity)?, args.risk_score)?;
    Ok(serde_json::to_value(view)?)
}

pub fn disburse(ws: &Workspace, args: &cli::DisburseArgs) -> Result<Value> {
    let view = ws.vault().disburse_loan(&identity(&args.identity)?, args.amount)?;
    Ok(serde_json::to_value(view)?)
}

pub fn settle(ws: &Workspace, args: &cli::SettleArgs) -> Result<Value> {
    let borrower = identity(&args.borrower)?;
    let caller = match &args.caller {
        Some(raw) => identity(raw)?,
        None => borrower,
    };
    let view = ws.vault().settle(&caller, &borrower, args.amount)?;
    Ok(serde_json::to_value(view)?)
}

pub fn close_credit(ws: &Workspace, args: &cli::CloseCreditArgs) -> Result<Value> {
    let borrower = identity(&args.identity)?;
    let caller = match &args.caller {
        Some(raw) => identity(raw)?,
        None => borrower,
    };
    let view = ws.vault().close_credit_line(&caller, &borrower)?;
    Ok(serde_json::to_value(view)?)
}

pub fn agent(ws: &Workspace, command: &cli::AgentCommands) -> Result<Value> {
    let vault = ws.vault();
    match command {
        cli::AgentCommands::Authorize { agent } => {
            let agent = identity(agent)?;
            let changed = vault.authorize_settlement_agent(&agent)?;
            Ok(json!({ "agent": agent, "authorized": true, "changed": changed }))
        }
        cli::AgentCommands::Revoke { agent } => {
            let agent = identity(agent)?;
            let changed = vault.revoke_settlement_agent(&agent)?;
            Ok(json!({ "agent": agent, "authorized": false, "changed": changed }))
        }
        cli::AgentCommands::List => {
            let agents: Vec<Value> = vault
                .settlement_agents()?
                .into_iter()
                .map(|(agent, since)| json!({ "agent": agent, "authorized_at": since }))
                .collect();
            Ok(Value::Array(agents))
        }
        cli::AgentCommands::Bootstrap => Ok(json!({ "added": vault.bootstrap_agents()? })),
    }
}

// ---------------------------------------------------------------------------
// Inspection
// ---------------------------------------------------------------------------

pub fn status(ws: &Workspace, args: &cli::StatusArgs) -> Result<Value> {
    let Some(raw) = &args.identity else {
        return Ok(json!({
            "data_dir": ws.data_dir,
            "schema_version": ws.ledger.schema_version()?,
            "size_on_disk": ws.ledger.size_on_disk()?,
            "nullifiers": ws.ledger.nullifiers().len(),
            "attestations": ws.ledger.attestations().len(),
            "audit_records": ws.ledger.audit().len(),
            "settlement_agents": ws.vault().settlement_agents()?.len(),
        }));
    };

    let identity = identity(raw)?;
    let vault = ws.vault();
    let attestation = ws.ledger.attestations().get(&identity)?;
    let current = attestation
        .as_ref()
        .is_some_and(|r| r.is_current(chrono::Utc::now(), ws.policy.attestation_max_age()));

    Ok(json!({
        "identity": identity,
        "attestation": attestation,
        "attestation_current": current,
        "credit_line": vault.credit_line(&identity)?,
        "loan": vault.loan(&identity)?,
    }))
}

pub fn audit(ws: &Workspace, args: &cli::AuditArgs) -> Result<Value> {
    let records = match args.since {
        Some(seq) => ws.ledger.audit().since(seq)?,
        None => ws.ledger.audit().latest(args.latest)?,
    };
    Ok(serde_json::to_value(records)?)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
