//! iptables tables. Enumerable, but not user-managed.

use std::fmt;

use super::{unsupported, Host, Resource};
use crate::config::DowntimeConfig;
use crate::error::{GatewayError, Result};
use crate::runner::Runner;

/// Tables this crate addresses, with their builtin chains.
pub const KNOWN_TABLES: &[(&str, &[&str])] = &[
    ("filter", &["INPUT", "FORWARD", "OUTPUT"]),
    ("nat", &["PREROUTING", "INPUT", "OUTPUT", "POSTROUTING"]),
    (
        "mangle",
        &["PREROUTING", "INPUT", "FORWARD", "OUTPUT", "POSTROUTING"],
    ),
    ("raw", &["PREROUTING", "OUTPUT"]),
];

/// An iptables table inside a namespace.
#[derive(Debug, Clone)]
pub struct Table {
    netns: String,
    name: String,
    runner: Runner,
    downtime: DowntimeConfig,
}

impl Table {
    /// A table descriptor. An empty name addresses the table collection.
    pub fn new(host: &Host, netns: &str, name: &str) -> Result<Self> {
        if !name.is_empty() && !KNOWN_TABLES.iter().any(|(t, _)| *t == name) {
            return Err(GatewayError::Validation(format!("unknown table '{name}'")));
        }
        Ok(Self {
            netns: netns.to_string(),
            name: name.to_string(),
            runner: host.runner_in(netns),
            downtime: host.downtime().clone(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn netns(&self) -> &str {
        &self.netns
    }

    pub fn runner(&self) -> &Runner {
        &self.runner
    }

    pub fn downtime(&self) -> &DowntimeConfig {
        &self.downtime
    }

    /// Builtin chains of this table; these are never cleared.
    pub fn builtin_chains(&self) -> &'static [&'static str] {
        KNOWN_TABLES
            .iter()
            .find(|(t, _)| *t == self.name)
            .map(|(_, chains)| *chains)
            .unwrap_or(&[])
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "namespace[{}]:table[{}]", self.netns, self.name)
    }
}

impl Resource for Table {
    fn id(&self) -> String {
        self.name.clone()
    }

    fn create(&self) -> Result<()> {
        Err(unsupported("create", self))
    }

    fn delete(&self) -> Result<()> {
        Err(unsupported("delete", self))
    }

    fn list(&self) -> Result<Vec<String>> {
        Ok(KNOWN_TABLES.iter().map(|(t, _)| t.to_string()).collect())
    }

    fn clear(&self) -> Result<()> {
        Err(unsupported("clear", self))
    }
}
