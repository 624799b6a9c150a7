//! Status command implementation.

use anyhow::{Context, Result};
use std::fmt::Write;
use std::path::Path;
use std::sync::Arc;

use crate::cmd_abstraction::RealCommandExecutor;
use crate::config::Config;
use crate::resource::{Chain, Host, IpSet, Lifecycle, Namespace, Resource, Table};

/// Run the status command
pub async fn run(config_path: &Path, netns: Option<&str>) -> Result<()> {
    let config = Config::load_or_default(config_path)?;
    let host = Host::new(Arc::new(RealCommandExecutor::new()), config.downtime);
    let netns = netns.map(str::to_string);

    let report = tokio::task::spawn_blocking(move || render(&host, netns.as_deref()))
        .await
        .context("status task failed")??;
    print!("{}", report);
    Ok(())
}

/// Build the status report: every namespace, or the ipsets and filter
/// chains of a single one.
pub fn render(host: &Host, netns: Option<&str>) -> Result<String> {
    let mut out = String::new();

    let Some(name) = netns else {
        let namespaces = Namespace::new(host, "").list()?;
        writeln!(out, "Namespaces: {}", namespaces.len())?;
        for ns in namespaces {
            writeln!(out, "  {}", ns)?;
        }
        return Ok(out);
    };

    let namespace = Namespace::new(host, name);
    if !Lifecycle::new(&namespace).exists()? {
        anyhow::bail!("namespace '{}' does not exist", name);
    }

    let sets = IpSet::new(host, name, "", None)?.list()?;
    let chains = Chain::new(Table::new(host, name, "filter")?, "")?.list()?;

    writeln!(out, "Namespace: {}", name)?;
    writeln!(out)?;
    writeln!(out, "IP sets: {}", sets.len())?;
    for set in sets {
        writeln!(out, "  {}", set)?;
    }
    writeln!(out)?;
    writeln!(out, "Filter chains: {}", chains.len())?;
    for chain in chains {
        writeln!(out, "  {}", chain)?;
    }
    Ok(out)
}
