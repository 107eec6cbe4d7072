//! QPU server daemon.
//!
//! One process simulates one QPU: it binds the client socket, registers
//! itself in `qpus.json` and serves tasks until the batch scheduler kills
//! it. Launched once per QPU by the allocation script.
//!
//! ```bash
//! # A standalone QPU on the node's loopback
//! sleipnir-qpud --name qpu0
//!
//! # A classically communicating QPU reachable from other nodes
//! sleipnir-qpud --name qpu1 --backend cc --mode co_located --family fam_a
//! ```

use clap::Parser;
use tracing_subscriber::EnvFilter;

use sleipnir_qpu::{build_backend, BackendKind, Qpu};

/// Serve one simulated QPU.
#[derive(Parser)]
#[command(name = "sleipnir-qpud")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Backend strategy (simple, cc, qc)
    #[arg(short, long, default_value = "simple")]
    backend: String,

    /// Bind mode: "hpc" binds loopback, anything else the fastest NIC
    #[arg(short, long, default_value = "hpc")]
    mode: String,

    /// Name published for clients
    #[arg(short, long, default_value = "qpu")]
    name: String,

    /// Family or group suffix for the registry key
    #[arg(short, long, default_value = "")]
    family: String,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_target(false)
        .init();

    // Configuration problems abort before anything is registered.
    let kind: BackendKind = cli.backend.parse()?;
    let backend = build_backend(kind, &cli.family)?;

    let qpu = Qpu::new(backend, &cli.mode, &cli.name, &cli.family)?;
    qpu.turn_on()?;
    Ok(())
}
