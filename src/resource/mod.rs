//! Managed OS networking objects.
//!
//! Every kind (namespace, table, chain, rule, ipset, member) implements the
//! same [`Resource`] capability set. Descriptors are plain values: building
//! one performs no I/O, every side effect happens inside the capability
//! methods, and `list` always asks the live system.

mod chain;
mod ipset;
mod lifecycle;
mod member;
mod namespace;
mod rule;
mod table;

use std::fmt;
use std::sync::Arc;

pub use chain::Chain;
pub use ipset::{IpSet, IpSetSpec};
pub use lifecycle::Lifecycle;
pub use member::Member;
pub use namespace::Namespace;
pub use rule::{Rule, RuleId, RuleSpec, RULE_TAG};
pub use table::{Table, KNOWN_TABLES};

use crate::cmd_abstraction::CommandExecutor;
use crate::config::DowntimeConfig;
use crate::error::{GatewayError, Result};
use crate::runner::Runner;

/// The capability set shared by every managed object.
///
/// Kinds that cannot support an operation return
/// [`GatewayError::Unsupported`] instead of omitting it, so every kind can be
/// driven through [`Lifecycle`].
pub trait Resource: fmt::Display + Send {
    /// External identity of this object within its parent collection.
    fn id(&self) -> String;

    fn create(&self) -> Result<()>;

    fn delete(&self) -> Result<()>;

    /// Identities of every sibling currently present, including this one.
    fn list(&self) -> Result<Vec<String>>;

    /// Remove every child of the addressed collection.
    fn clear(&self) -> Result<()>;

    /// Detailed representation of the live object, for kinds that have one.
    fn describe(&self) -> Result<Option<serde_json::Value>> {
        Ok(None)
    }

    /// Bring an already present object in line with its descriptor.
    /// Returns whether anything was changed.
    fn refresh(&self) -> Result<bool> {
        Ok(false)
    }

    /// Add a new child under a generated identity and return that identity.
    fn append(&self) -> Result<String> {
        Err(unsupported("append", self))
    }
}

impl<R: Resource + ?Sized> Resource for Box<R> {
    fn id(&self) -> String {
        (**self).id()
    }
    fn create(&self) -> Result<()> {
        (**self).create()
    }
    fn delete(&self) -> Result<()> {
        (**self).delete()
    }
    fn list(&self) -> Result<Vec<String>> {
        (**self).list()
    }
    fn clear(&self) -> Result<()> {
        (**self).clear()
    }
    fn describe(&self) -> Result<Option<serde_json::Value>> {
        (**self).describe()
    }
    fn refresh(&self) -> Result<bool> {
        (**self).refresh()
    }
    fn append(&self) -> Result<String> {
        (**self).append()
    }
}

pub(crate) fn unsupported(
    operation: &'static str,
    resource: &(impl fmt::Display + ?Sized),
) -> GatewayError {
    GatewayError::Unsupported {
        operation,
        resource: resource.to_string(),
    }
}

/// Shared handles every descriptor is built from.
#[derive(Clone)]
pub struct Host {
    executor: Arc<dyn CommandExecutor>,
    downtime: Arc<DowntimeConfig>,
}

impl Host {
    pub fn new(executor: Arc<dyn CommandExecutor>, downtime: DowntimeConfig) -> Self {
        Self {
            executor,
            downtime: Arc::new(downtime),
        }
    }

    /// A fresh runner on the host network stack.
    pub fn runner(&self) -> Runner {
        Runner::new(Arc::clone(&self.executor))
    }

    /// A fresh runner inside `netns`.
    pub fn runner_in(&self, netns: &str) -> Runner {
        Runner::in_netns(Arc::clone(&self.executor), netns)
    }

    pub fn downtime(&self) -> &DowntimeConfig {
        &self.downtime
    }
}

impl fmt::Debug for Host {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Host")
            .field("downtime", &self.downtime)
            .finish_non_exhaustive()
    }
}

/// Split command output into non-empty lines.
pub(crate) fn lines(out: &str) -> impl Iterator<Item = &str> {
    out.lines().map(str::trim_end).filter(|l| !l.is_empty())
}
