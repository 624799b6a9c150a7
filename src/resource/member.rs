//! Single MAC addresses inside an ipset.

use std::fmt;

use super::{lines, IpSet, Resource};
use crate::argv;
use crate::error::{GatewayError, Result};
use crate::runner::Runner;
use crate::validation::Mac;

/// Members of `set` according to `ipset save -sorted`.
pub(crate) fn saved_members(runner: &Runner, set: &str) -> Result<Vec<Mac>> {
    let result = runner.exec(argv!["ipset", "save", "-sorted", set])?;
    let prefix = format!("add {set} ");
    lines(&result.output)
        .filter_map(|l| l.strip_prefix(&prefix))
        .map(|mac| {
            mac.trim()
                .parse()
                .map_err(|_| GatewayError::Parse(format!("bad member '{mac}' in set '{set}'")))
        })
        .collect()
}

/// One MAC address in a set. Without an address the descriptor addresses
/// the set's member collection.
#[derive(Debug, Clone)]
pub struct Member {
    set: IpSet,
    mac: Option<Mac>,
}

impl Member {
    pub fn new(set: IpSet, mac: Option<&str>) -> Result<Self> {
        let mac = mac.map(str::parse::<Mac>).transpose()?;
        Ok(Self { set, mac })
    }

    fn require_mac(&self) -> Result<Mac> {
        self.mac
            .ok_or_else(|| GatewayError::Validation(format!("{self} has no address")))
    }
}

impl fmt::Display for Member {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:member[{}]", self.set, self.id())
    }
}

impl Resource for Member {
    fn id(&self) -> String {
        self.mac.map(|m| m.to_string()).unwrap_or_default()
    }

    fn create(&self) -> Result<()> {
        let mac = self.require_mac()?.to_string();
        self.set
            .runner()
            .run([argv!["ipset", "-A", self.set.name(), mac]])
    }

    fn delete(&self) -> Result<()> {
        let mac = self.require_mac()?.to_string();
        self.set
            .runner()
            .run([argv!["ipset", "-D", self.set.name(), mac]])
    }

    fn list(&self) -> Result<Vec<String>> {
        Ok(saved_members(self.set.runner(), self.set.name())?
            .iter()
            .map(Mac::to_string)
            .collect())
    }

    fn clear(&self) -> Result<()> {
        self.set
            .runner()
            .run([argv!["ipset", "flush", self.set.name()]])
    }
}
