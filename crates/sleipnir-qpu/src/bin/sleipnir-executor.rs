//! Group executor daemon.
//!
//! Runs next to a group of `qc`-backed QPUs, simulating their circuits
//! jointly. Start it after the QPUs have published their channels.
//!
//! ```bash
//! # Serve the QPUs of this SLURM job
//! sleipnir-executor
//!
//! # Serve a named group
//! sleipnir-executor --group fam_b
//! ```

use clap::Parser;
use tracing_subscriber::EnvFilter;

use sleipnir_qpu::Executor;

/// Jointly simulate a group of QPUs.
#[derive(Parser)]
#[command(name = "sleipnir-executor")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Group id; defaults to every QPU of this SLURM job
    #[arg(short, long)]
    group: Option<String>,

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

    let executor = Executor::new(cli.group.as_deref())?;
    executor.run()?;
    Ok(())
}
