//! dtgate - REST gateway for per-device internet downtime
//!
//! Exposes network namespaces, iptables chains and rules, and ipsets of MAC
//! addresses as an HTTP resource tree.

use anyhow::Result;
use clap::Parser;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use dtgate::cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    let log_level = if cli.verbose {
        Level::DEBUG
    } else if cli.quiet {
        Level::ERROR
    } else {
        Level::INFO
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .without_time()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Serve { listen } => dtgate::commands::serve::run(&cli.config, listen).await,
        Commands::Status { netns } => {
            dtgate::commands::status::run(&cli.config, netns.as_deref()).await
        }
        Commands::Version => {
            println!("dtgate {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}
