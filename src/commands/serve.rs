//! Serve command implementation.

use anyhow::Result;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

use crate::cmd_abstraction::RealCommandExecutor;
use crate::config::Config;
use crate::dispatch::Gateway;
use crate::resource::Host;
use crate::server;
use crate::signal::ShutdownToken;

/// Run the serve command
pub async fn run(config_path: &Path, listen: Option<SocketAddr>) -> Result<()> {
    check_root()?;

    let config = Config::load_or_default(config_path)?;
    let addr = match listen {
        Some(addr) => addr,
        None => config.listen_addr()?,
    };

    if let Some(device) = &config.downtime.internet_device {
        info!(
            "Downtime chain '{}' will be wired to FORWARD -o {}",
            config.downtime.chain, device
        );
    }

    let host = Host::new(Arc::new(RealCommandExecutor::new()), config.downtime);
    let token = ShutdownToken::new();
    token.cancel_on_signal();

    server::serve(Gateway::new(host), addr, token).await
}

/// Check if running as root
pub fn check_root() -> Result<()> {
    // SAFETY: geteuid() is a simple syscall that reads the effective user ID.
    // It has no preconditions and never fails.
    let euid = unsafe { libc::geteuid() };

    if euid != 0 {
        anyhow::bail!(
            "This operation requires root privileges. Please run with sudo.\n\
             Alternatively, ensure the process has CAP_NET_ADMIN and CAP_SYS_ADMIN capabilities."
        )
    }
    Ok(())
}
