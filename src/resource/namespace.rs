//! Network namespaces, the root of the addressing hierarchy.

use std::fmt;

use super::{lines, unsupported, Host, Resource};
use crate::argv;
use crate::error::Result;
use crate::runner::Runner;

/// A named network namespace. Its own commands run on the host stack.
#[derive(Debug, Clone)]
pub struct Namespace {
    name: String,
    runner: Runner,
}

impl Namespace {
    pub fn new(host: &Host, name: &str) -> Self {
        Self {
            name: name.to_string(),
            runner: host.runner(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "namespace[{}]", self.name)
    }
}

impl Resource for Namespace {
    fn id(&self) -> String {
        self.name.clone()
    }

    fn create(&self) -> Result<()> {
        self.runner.run([argv!["ip", "netns", "add", &self.name]])
    }

    fn delete(&self) -> Result<()> {
        self.runner.run([argv!["ip", "netns", "del", &self.name]])
    }

    /// `ip netns list` prints `name` or `name (id: N)` per line.
    fn list(&self) -> Result<Vec<String>> {
        let result = self.runner.exec(argv!["ip", "netns", "list"])?;
        Ok(lines(&result.output)
            .filter_map(|l| l.split_whitespace().next())
            .map(str::to_string)
            .collect())
    }

    fn clear(&self) -> Result<()> {
        Err(unsupported("clear", self))
    }
}
