//! # CLI Interface
//!
//! Defines the command-line argument structure for `zkcredit` using
//! `clap` derive. Every subcommand operates on the ledger under
//! `--data-dir` and prints its result as JSON on stdout.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::logging::LogFormat;

/// zkcredit operator tool.
///
/// Drives the attestation registrar and credit vault against a local
/// ledger: record zero-knowledge attestations, open credit lines,
/// disburse loans and settle repayments.
#[derive(Parser, Debug)]
#[command(
    name = "zkcredit",
    about = "Attestation-gated credit engine",
    version,
    propagate_version = true
)]
pub struct ZkCreditCli {
    #[command(flatten)]
    pub global: GlobalArgs,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Options shared by every subcommand.
#[derive(Args, Debug)]
pub struct GlobalArgs {
    /// Directory holding the ledger and the ceremony keys.
    #[arg(
        long,
        short = 'd',
        global = true,
        env = "ZKCREDIT_DATA_DIR",
        default_value = "./zkcredit-data"
    )]
    pub data_dir: PathBuf,

    /// Ledger policy file (JSON). Built-in defaults apply when omitted.
    #[arg(long, short = 'p', global = true, env = "ZKCREDIT_POLICY")]
    pub policy: Option<PathBuf>,

    /// Log output format.
    #[arg(
        long,
        global = true,
        value_enum,
        env = "ZKCREDIT_LOG_FORMAT",
        default_value_t = LogFormat::Pretty
    )]
    pub log_format: LogFormat,

    /// Default log filter when `RUST_LOG` is unset.
    #[arg(
        long,
        global = true,
        default_value = "zkcredit_node=info,zkcredit_protocol=info,audit=info,security=warn"
    )]
    pub log_level: String,
}

/// Top-level subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create the data directory and run a development Groth16 ceremony
    /// for the reference attestation circuit.
    Init(InitArgs),
    /// Derive an identity address from an Ed25519 public key.
    Identity(IdentityArgs),
    /// Produce a proof and public signals for an identity (development).
    Prove(ProveArgs),
    /// Submit a proof to the attestation registrar.
    Attest(AttestArgs),
    /// Revoke an identity's attestation.
    Revoke(RevokeArgs),
    /// Open a credit line for an attested identity.
    OpenCredit(OpenCreditArgs),
    /// Disburse a loan against an open credit line.
    Disburse(DisburseArgs),
    /// Apply a repayment to an active loan.
    Settle(SettleArgs),
    /// Close a fully repaid credit line.
    CloseCredit(CloseCreditArgs),
    /// Manage settlement agents.
    #[command(subcommand)]
    Agent(AgentCommands),
    /// Show attestation, credit line and loan for an identity, or ledger
    /// totals when no identity is given.
    Status(StatusArgs),
    /// Read the audit log.
    Audit(AuditArgs),
    /// Print version information and exit.
    Version,
}

#[derive(Args, Debug)]
pub struct InitArgs {
    /// Overwrite existing ceremony keys.
    #[arg(long)]
    pub force: bool,

    /// Seed the ceremony RNG for reproducible keys. Never use in production.
    #[arg(long)]
    pub seed: Option<u64>,
}

#[derive(Args, Debug)]
pub struct IdentityArgs {
    /// Ed25519 verifying key (32 bytes, hex, `0x` optional).
    #[arg(long)]
    pub public_key: String,
}

#[derive(Args, Debug)]
pub struct ProveArgs {
    /// Identity the proof binds to (hex, `0x` optional).
    #[arg(long)]
    pub identity: String,

    /// Biometric secret as a decimal field element. Random when omitted.
    #[arg(long)]
    pub secret: Option<String>,

    /// Commitment blinding factor as a decimal field element. Random when omitted.
    #[arg(long)]
    pub blinding: Option<String>,

    /// Similarity score of the biometric match (basis points).
    #[arg(long)]
    pub similarity: u64,

    /// Minimum similarity the proof attests to (basis points).
    #[arg(long, default_value_t = zkcredit_protocol::config::DEFAULT_SIMILARITY_THRESHOLD)]
    pub threshold: u64,

    /// Directory for `proof.json` and `public.json`.
    #[arg(long, default_value = ".")]
    pub out_dir: PathBuf,
}

#[derive(Args, Debug)]
pub struct AttestArgs {
    /// Identity submitting the attestation.
    #[arg(long)]
    pub identity: String,

    /// snarkjs `proof.json`.
    #[arg(long)]
    pub proof: PathBuf,

    /// snarkjs `public.json` (four decimal strings).
    #[arg(long)]
    pub signals: PathBuf,

    /// Nullifier hash (hex). Defaults to the one in the public signals.
    #[arg(long)]
    pub nullifier: Option<String>,

    /// snarkjs `verification_key.json` to verify against instead of the
    /// key written by `init`.
    #[arg(long)]
    pub verification_key: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct RevokeArgs {
    #[arg(long)]
    pub identity: String,

    /// Reason recorded in the audit log.
    #[arg(long, default_value = "operator revocation")]
    pub reason: String,
}

#[derive(Args, Debug)]
pub struct OpenCreditArgs {
    #[arg(long)]
    pub identity: String,

    /// External risk score (300-850).
    #[arg(long)]
    pub risk_score: u32,
}

#[derive(Args, Debug)]
pub struct DisburseArgs {
    #[arg(long)]
    pub identity: String,

    /// Amount in minor units.
    #[arg(long)]
    pub amount: u64,
}

#[derive(Args, Debug)]
pub struct SettleArgs {
    /// Borrower whose loan is repaid.
    #[arg(long)]
    pub borrower: String,

    /// Identity submitting the repayment. Defaults to the borrower.
    #[arg(long)]
    pub caller: Option<String>,

    /// Amount in minor units.
    #[arg(long)]
    pub amount: u64,
}

#[derive(Args, Debug)]
pub struct CloseCreditArgs {
    #[arg(long)]
    pub identity: String,

    /// Identity requesting the close. Defaults to the borrower.
    #[arg(long)]
    pub caller: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum AgentCommands {
    /// Authorize an agent to settle on behalf of borrowers.
    Authorize {
        #[arg(long)]
        agent: String,
    },
    /// Withdraw an agent's authorization.
    Revoke {
        #[arg(long)]
        agent: String,
    },
    /// List authorized agents.
    List,
    /// Authorize every agent listed in the policy file.
    Bootstrap,
}

#[derive(Args, Debug)]
pub struct StatusArgs {
    #[arg(long)]
    pub identity: Option<String>,
}

#[derive(Args, Debug)]
pub struct AuditArgs {
    /// Only records with a sequence number greater than this. Takes
    /// precedence over `--latest`.
    #[arg(long)]
    pub since: Option<u64>,

    /// The most recent N records.
    #[arg(long, default_value_t = 20)]
    pub latest: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli_structure() {
        ZkCreditCli::command().debug_assert();
    }

    #[test]
    fn parses_settle_with_default_caller() {
        let cli = ZkCreditCli::try_parse_from([
            "zkcredit",
            "--data-dir",
            "/tmp/zk",
            "settle",
            "--borrower",
            "0x0101010101010101010101010101010101010101",
            "--amount",
            "500",
        ])
        .unwrap();
        assert_eq!(cli.global.data_dir, PathBuf::from("/tmp/zk"));
        match cli.command {
            Commands::Settle(args) => {
                assert!(args.caller.is_none());
                assert_eq!(args.amount, 500);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn parses_agent_subcommand() {
        let cli =
            ZkCreditCli::try_parse_from(["zkcredit", "agent", "authorize", "--agent", "0xabc"])
                .unwrap();
        assert!(matches!(cli.command, Commands::Agent(AgentCommands::Authorize { .. })));
    }
}
