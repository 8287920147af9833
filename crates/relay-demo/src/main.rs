//! Relay Demo - a host application built on instance-relay.
//!
//! The first launch stays running and prints every argument list forwarded by
//! later launches. Later launches hand their argv to it and exit.
//!
//! Machine-readable lines on stdout (logs go to stderr):
//! - `RELAY_ROLE=first` or `RELAY_ROLE=subsequent`
//! - `RELAY_INVOKED=<JSON array>` for each forwarded launch

use anyhow::Result;
use clap::Parser;
use instance_relay::{Arbitrator, Role};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser, Debug)]
#[command(name = "relay-demo")]
#[command(about = "Single-instance demo: later launches forward their arguments to the first")]
struct Args {
    /// Application name scoping the single instance
    #[arg(short, long, default_value = "relay-demo")]
    name: String,

    /// Directory for lock and endpoint files (defaults to the per-user runtime dir)
    #[arg(long)]
    state_dir: Option<PathBuf>,

    /// Handoff timeout in milliseconds
    #[arg(long, default_value = "300")]
    timeout_ms: u64,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Arguments to forward (files to open, flags, ...)
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    forward: Vec<String>,
}

fn print_invocation(args: Vec<String>) {
    match serde_json::to_string(&args) {
        // Intentional stdout: consumed by scripts and tests
        Ok(json) => println!("RELAY_INVOKED={}", json),
        Err(e) => warn!("Failed to print forwarded arguments: {}", e),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Set up logging (RUST_LOG wins over --debug)
    let default_level = if args.debug { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    let mut builder =
        Arbitrator::builder(print_invocation).publish_timeout(Duration::from_millis(args.timeout_ms));
    if let Some(dir) = &args.state_dir {
        builder = builder.state_dir(dir);
    }
    let mut arbitrator = builder.build()?;

    match arbitrator.become_first_or_signal(&args.name).await? {
        Role::First => {
            println!("RELAY_ROLE=first");
            info!(
                "First instance of {} started with {:?}, waiting for other launches",
                args.name, args.forward
            );

            tokio::signal::ctrl_c().await?;
            info!("Shutdown signal received, exiting");
            arbitrator.cleanup();
            Ok(())
        }
        role @ Role::Subsequent { .. } => {
            println!("RELAY_ROLE=subsequent");
            let code = role.exit_code();
            if code == 0 {
                info!("Forwarded arguments to the running instance");
            }
            drop(arbitrator);
            std::process::exit(code);
        }
    }
}
