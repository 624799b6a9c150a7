//! CLI argument parsing with clap.

use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;

use crate::config::DEFAULT_CONFIG_PATH;

#[derive(Parser)]
#[command(name = "dtgate")]
#[command(author, version, about = "REST gateway for namespace firewall state")]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file path
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH, global = true)]
    pub config: PathBuf,

    /// Quiet mode (errors only)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Verbose mode (debug output, including every executed command)
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the HTTP API until interrupted
    Serve {
        /// Listen address, overrides the config file
        #[arg(long)]
        listen: Option<SocketAddr>,
    },

    /// Show namespaces, or the ipsets and filter chains of one namespace
    Status {
        /// Namespace to inspect
        #[arg(long)]
        netns: Option<String>,
    },

    /// Show version
    Version,
}
