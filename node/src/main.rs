// Copyright (c) 2026 zkcredit contributors. MIT License.
// See LICENSE for details.

//! # zkcredit Operator CLI
//!
//! Entry point for the `zkcredit` binary. Parses CLI arguments, initializes
//! logging, opens the ledger under `--data-dir`, and dispatches to the
//! command handlers. Results are printed to stdout as pretty JSON; logs go
//! to stderr.

mod cli;
mod commands;
mod logging;

use anyhow::Result;
use clap::Parser;

use cli::{Commands, ZkCreditCli};
use commands::Workspace;

fn main() -> Result<()> {
    let cli = ZkCreditCli::parse();
    let global = &cli.global;

    if let Commands::Version = cli.command {
        print_version();
        return Ok(());
    }

    logging::init_logging(&global.log_level, global.log_format);

    let output = match &cli.command {
        Commands::Init(args) => commands::init(&global.data_dir, args)?,
        Commands::Prove(args) => commands::prove(&global.data_dir, args)?,
        Commands::Identity(args) => commands::derive_identity(args)?,
        command => {
            let ws = Workspace::open(&global.data_dir, global.policy.as_deref())?;
            dispatch(&ws, command)?
        }
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn dispatch(ws: &Workspace, command: &Commands) -> Result<serde_json::Value> {
    match command {
        Commands::Attest(args) => commands::attest(ws, args),
        Commands::Revoke(args) => commands::revoke(ws, args),
        Commands::OpenCredit(args) => commands::open_credit(ws, args),
        Commands::Disburse(args) => commands::disburse(ws, args),
        Commands::Settle(args) => commands::settle(ws, args),
        Commands::CloseCredit(args) => commands::close_credit(ws, args),
        Commands::Agent(sub) => commands::agent(ws, sub),
        Commands::Status(args) => commands::status(ws, args),
        Commands::Audit(args) => commands::audit(ws, args),
        Commands::Init(_) | Commands::Prove(_) | Commands::Identity(_) | Commands::Version => {
            unreachable!("handled before the ledger is opened")
        }
    }
}

/// Prints version information to stdout.
fn print_version() {
    println!("zkcredit  {}", env!("CARGO_PKG_VERSION"));
    println!("protocol  {}", zkcredit_protocol::config::PROTOCOL_VERSION);
    println!("curve     {}", zkcredit_protocol::config::ZKP_CURVE);
    println!("schema    {}", zkcredit_protocol::config::LEDGER_SCHEMA_VERSION);
}
