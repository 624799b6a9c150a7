//! MAC address ipsets with atomic content replacement.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::member::saved_members;
use super::{lines, Host, Resource};
use crate::argv;
use crate::error::{GatewayError, Result};
use crate::runner::Runner;
use crate::validation::{validate_name, Mac, BUILDER_SUFFIX, MAX_SET_NAME};

/// Desired membership of a set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct IpSetSpec {
    pub members: Vec<Mac>,
}

/// A `hash:mac` set inside a namespace. An empty name addresses the set
/// collection.
#[derive(Debug, Clone)]
pub struct IpSet {
    netns: String,
    name: String,
    runner: Runner,
    spec: Option<IpSetSpec>,
}

impl IpSet {
    pub fn new(host: &Host, netns: &str, name: &str, spec: Option<IpSetSpec>) -> Result<Self> {
        if !name.is_empty() {
            validate_name("ipset", name, MAX_SET_NAME)?;
        }
        Ok(Self {
            netns: netns.to_string(),
            name: name.to_string(),
            runner: host.runner_in(netns),
            spec,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn runner(&self) -> &Runner {
        &self.runner
    }

    fn builder(&self) -> String {
        format!("{}{BUILDER_SUFFIX}", self.name)
    }

    /// Swap the set's contents for `members` without the name ever
    /// resolving to a missing or half-filled set.
    ///
    /// Duplicate members are added once. A failure leaves the builder set
    /// behind; the next attempt removes it first. The live set is untouched
    /// unless the swap itself ran.
    pub fn replace(&self, members: &[Mac]) -> Result<()> {
        let mut members = members.to_vec();
        members.sort();
        members.dedup();

        let builder = self.builder();
        if self.list()?.contains(&builder) {
            debug!(set = %builder, "destroying stale builder set");
            self.runner.exec(argv!["ipset", "destroy", &builder])?;
        }

        let mut batch = vec![
            argv!["ipset", "-exist", "-N", &self.name, "hash:mac"],
            argv!["ipset", "-N", &builder, "hash:mac"],
        ];
        batch.extend(
            members
                .iter()
                .map(|mac| argv!["ipset", "-A", &builder, mac.to_string()]),
        );
        batch.push(argv!["ipset", "swap", &builder, &self.name]);
        batch.push(argv!["ipset", "destroy", &builder]);
        self.runner.run(batch)
    }
}

impl fmt::Display for IpSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "namespace[{}]:ipset[{}]", self.netns, self.name)
    }
}

impl Resource for IpSet {
    fn id(&self) -> String {
        self.name.clone()
    }

    fn create(&self) -> Result<()> {
        let members = self.spec.as_ref().map(|s| s.members.as_slice()).unwrap_or(&[]);
        self.replace(members)
    }

    fn delete(&self) -> Result<()> {
        self.runner.run([argv!["ipset", "destroy", &self.name]])
    }

    fn list(&self) -> Result<Vec<String>> {
        let result = self.runner.exec(argv!["ipset", "list", "-n"])?;
        Ok(lines(&result.output).map(str::to_string).collect())
    }

    /// Destroys every set in the namespace.
    fn clear(&self) -> Result<()> {
        let sets = self.list()?;
        self.runner
            .run(sets.iter().map(|s| argv!["ipset", "destroy", s]))
    }

    fn describe(&self) -> Result<Option<serde_json::Value>> {
        let spec = IpSetSpec {
            members: saved_members(&self.runner, &self.name)?,
        };
        serde_json::to_value(spec)
            .map(Some)
            .map_err(|e| GatewayError::Parse(format!("cannot render {self}: {e}")))
    }

    /// Re-run the atomic replace when a membership was requested and the
    /// live set differs from it.
    fn refresh(&self) -> Result<bool> {
        let Some(spec) = &self.spec else {
            return Ok(false);
        };
        let mut wanted = spec.members.clone();
        wanted.sort();
        wanted.dedup();
        let mut current = saved_members(&self.runner, &self.name)?;
        current.sort();
        if current == wanted {
            return Ok(false);
        }
        info!(set = %self, members = wanted.len(), "replacing membership");
        self.replace(&wanted)?;
        Ok(true)
    }
}
