//! iptables chains, scoped to a table.

use std::fmt;

use tracing::{debug, info};

use super::rule::tokenize;
use super::{lines, Resource, Table};
use crate::argv;
use crate::error::{GatewayError, Result};
use crate::validation::{validate_name, MAX_CHAIN_NAME};

/// A chain within a table. An empty name addresses the chain collection.
#[derive(Debug, Clone)]
pub struct Chain {
    table: Table,
    name: String,
}

impl Chain {
    pub fn new(table: Table, name: &str) -> Result<Self> {
        if !name.is_empty() {
            validate_name("chain", name, MAX_CHAIN_NAME)?;
        }
        Ok(Self {
            table,
            name: name.to_string(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn table(&self) -> &Table {
        &self.table
    }

    fn iptables(&self, args: &[&str]) -> Vec<String> {
        let mut cmd = argv!["iptables", "-t", self.table.name()];
        cmd.extend(args.iter().map(|a| a.to_string()));
        cmd
    }

    /// Arguments of the FORWARD jump into `chain` when it is the configured
    /// downtime chain of the filter table and an internet device is set.
    fn forward_jump(&self, chain: &str) -> Option<Vec<String>> {
        let downtime = self.table.downtime();
        let device = downtime.internet_device.as_deref()?;
        if self.table.name() != "filter" || chain != downtime.chain {
            return None;
        }
        Some(argv!["FORWARD", "-o", device, "-j", chain])
    }

    fn jump_cmd(&self, op: &str, jump: &[String]) -> Vec<String> {
        let mut cmd = argv!["iptables", "-t", self.table.name(), op];
        cmd.extend(jump.iter().cloned());
        cmd
    }

    /// Remove the FORWARD jump (if wired), flush, then delete `chain`.
    fn remove(&self, chain: &str) -> Result<()> {
        let runner = self.table.runner();
        if let Some(jump) = self.forward_jump(chain) {
            if runner.probe(self.jump_cmd("-C", &jump))? {
                runner.exec(self.jump_cmd("-D", &jump))?;
                info!(chain, "removed FORWARD jump");
            }
        }
        runner.run([self.iptables(&["-F", chain]), self.iptables(&["-X", chain])])
    }

    /// `-D` commands for every builtin-chain rule of this table that jumps
    /// or goes to one of `targets`, rebuilt from `iptables-save`.
    fn builtin_jumps(&self, targets: &[String]) -> Result<Vec<Vec<String>>> {
        let builtin = self.table.builtin_chains();
        let saved = self
            .table
            .runner()
            .exec(argv!["iptables-save", "-t", self.table.name()])?;

        let mut jumps = Vec::new();
        for line in lines(&saved.output) {
            let Some(rule) = line.strip_prefix("-A ") else {
                continue;
            };
            let tokens = tokenize(rule)?;
            if !tokens.first().is_some_and(|c| builtin.contains(&c.as_str())) {
                continue;
            }
            let enters_target = tokens
                .windows(2)
                .any(|w| (w[0] == "-j" || w[0] == "-g") && targets.contains(&w[1]));
            if enters_target {
                let mut cmd = argv!["iptables", "-t", self.table.name(), "-D"];
                cmd.extend(tokens);
                jumps.push(cmd);
            }
        }
        Ok(jumps)
    }
}

impl fmt::Display for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:chain[{}]", self.table, self.name)
    }
}

impl Resource for Chain {
    fn id(&self) -> String {
        self.name.clone()
    }

    fn create(&self) -> Result<()> {
        let runner = self.table.runner();
        runner.exec(self.iptables(&["-N", &self.name]))?;
        if let Some(jump) = self.forward_jump(&self.name) {
            if !runner.probe(self.jump_cmd("-C", &jump))? {
                runner.exec(self.jump_cmd("-A", &jump))?;
                info!(chain = %self.name, "wired FORWARD jump");
            }
        }
        Ok(())
    }

    fn delete(&self) -> Result<()> {
        self.remove(&self.name)
    }

    /// Chain names from `iptables -L` headers: `Chain NAME (policy ...)`.
    fn list(&self) -> Result<Vec<String>> {
        let result = self.table.runner().exec(self.iptables(&["-L", "-n"]))?;
        lines(&result.output)
            .filter(|l| l.starts_with("Chain "))
            .map(|l| {
                l.split_whitespace()
                    .nth(1)
                    .map(str::to_string)
                    .ok_or_else(|| GatewayError::Parse(format!("did not find chain name in '{l}'")))
            })
            .collect()
    }

    /// Flush and delete every non-builtin chain of this table only.
    fn clear(&self) -> Result<()> {
        let builtin = self.table.builtin_chains();
        let user: Vec<String> = self
            .list()?
            .into_iter()
            .filter(|c| !builtin.contains(&c.as_str()))
            .collect();
        if user.is_empty() {
            return Ok(());
        }
        debug!(table = %self.table, chains = ?user, "clearing chains");

        let runner = self.table.runner();
        // builtin chains referencing a user chain would block -X
        let jumps = self.builtin_jumps(&user)?;
        if !jumps.is_empty() {
            info!(table = %self.table, rules = jumps.len(), "removing builtin jumps into user chains");
        }
        runner.run(jumps)?;
        // flush everything first so jumps between user chains don't block -X
        runner.run(user.iter().map(|c| self.iptables(&["-F", c])))?;
        for chain in &user {
            self.remove(chain)?;
        }
        Ok(())
    }
}
