//! KL Kernel Logic demo CLI
//!
//! Runs one or all of the demo scenarios through the ordered runner and
//! prints each trace as JSON together with its canonical digest.
//!
//! Usage:
//!   cargo run -p kl-demo -- run-all
//!   cargo run -p kl-demo -- success --deterministic
//!   cargo run -p kl-demo -- policy-denied --policy demo/policies/permissive.toml

mod operations;
mod scenarios;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use kl_contracts::error::KlResult;

use crate::scenarios::{Scenario, Settings};

// ── CLI definition ────────────────────────────────────────────────────────────

/// KL deterministic execution kernel demo.
#[derive(Parser)]
#[command(
    name = "kl-demo",
    about = "KL kernel logic demo",
    long_about = "Runs KL demo scenarios showing policy gating, exactly-once execution,\n\
                  stop-on-first-failure ordering, and hash-chained trace logs."
)]
struct Cli {
    /// TOML rule file to use instead of the default safe policy.
    #[arg(long, global = true)]
    policy: Option<PathBuf>,

    /// Fixed clock and sequential trace ids, so output is reproducible.
    #[arg(long, global = true)]
    deterministic: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run every scenario in sequence.
    RunAll,
    /// Three pure steps that all succeed.
    Success,
    /// A failing step halts the run before the next step.
    StopOnFailure,
    /// An `io` step is refused by the gate before it runs.
    PolicyDenied,
}

// ── Entry point ───────────────────────────────────────────────────────────────

fn main() {
    // Set RUST_LOG=debug to see kernel and runner events.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_target(false)
        .compact()
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let settings = Settings {
        policy: cli.policy,
        deterministic: cli.deterministic,
    };

    let selected: &[Scenario] = match cli.command {
        Command::RunAll => &Scenario::ALL,
        Command::Success => &[Scenario::Success],
        Command::StopOnFailure => &[Scenario::StopOnFailure],
        Command::PolicyDenied => &[Scenario::PolicyDenied],
    };

    if let Err(e) = run_selected(selected, &settings) {
        eprintln!("Demo error: {}", e);
        std::process::exit(1);
    }
}

fn run_selected(selected: &[Scenario], settings: &Settings) -> KlResult<()> {
    println!();
    println!("KL Kernel Logic: ordered, policy-gated execution");
    println!("================================================");
    println!();
    for scenario in selected {
        scenarios::run_and_print(*scenario, settings)?;
    }
    Ok(())
}
