//! Path resolution over the static resource graph.
//!
//! ```text
//! /api/v1/netns/{ns}
//!                  ├─ /ipsets/{set}/members/{mac}
//!                  └─ /iptables/{table}/chains/{chain}/rules/{id}
//! ```
//!
//! A path alternates identifiers and relation names below `/api`. Walking it
//! ends in one of two states: a trailing identifier addresses one item of
//! the current node kind, no trailing identifier addresses the kind's
//! collection under the identifiers collected so far.

use std::fmt;

use axum::http::Method;
use serde_json::Value;

use crate::error::{GatewayError, Result};
use crate::resource::{
    unsupported, Chain, Host, IpSet, IpSetSpec, Member, Namespace, Resource, Rule, RuleSpec,
    Table,
};
use crate::validation::{validate_name, MAX_NETNS_NAME};

/// The only served API version.
pub const API_VERSION: &str = "v1";

/// What a request does to its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// Item existence and description.
    Get,
    /// Identifiers of a collection.
    List,
    Delete,
    Clear,
    Upsert,
    /// Add to a collection under a generated identity.
    Append,
}

impl Operation {
    /// Map an HTTP method onto an operation for an item or collection target.
    pub fn from_method(method: &Method, item: bool) -> Option<Self> {
        match (item, method.as_str()) {
            (true, "GET") => Some(Self::Get),
            (true, "PUT") => Some(Self::Upsert),
            (true, "DELETE") => Some(Self::Delete),
            (false, "GET") => Some(Self::List),
            (false, "DELETE") => Some(Self::Clear),
            (false, "PUT" | "POST") => Some(Self::Append),
            _ => None,
        }
    }

    /// Whether the operation accepts a request body.
    pub fn takes_body(self) -> bool {
        matches!(self, Self::Upsert | Self::Append)
    }
}

/// Node kinds of the resource graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Version,
    Namespace,
    Table,
    Chain,
    Rule,
    IpSet,
    Member,
}

impl NodeKind {
    pub fn name(self) -> &'static str {
        match self {
            Self::Version => "version",
            Self::Namespace => "namespace",
            Self::Table => "table",
            Self::Chain => "chain",
            Self::Rule => "rule",
            Self::IpSet => "ipset",
            Self::Member => "member",
        }
    }

    /// Relation name to child kind.
    pub fn relations(self) -> &'static [(&'static str, NodeKind)] {
        match self {
            Self::Version => &[("netns", Self::Namespace)],
            Self::Namespace => &[("iptables", Self::Table), ("ipsets", Self::IpSet)],
            Self::Table => &[("chains", Self::Chain)],
            Self::Chain => &[("rules", Self::Rule)],
            Self::IpSet => &[("members", Self::Member)],
            Self::Rule | Self::Member => &[],
        }
    }

    pub fn child(self, relation: &str) -> Result<NodeKind> {
        self.relations()
            .iter()
            .find(|(name, _)| *name == relation)
            .map(|(_, kind)| *kind)
            .ok_or_else(|| GatewayError::UnknownRelation(relation.to_string()))
    }

    pub fn allowed(self) -> &'static [Operation] {
        use Operation::*;
        match self {
            Self::Version | Self::Table => &[List, Get],
            Self::Namespace => &[List, Get, Upsert, Delete],
            Self::Chain | Self::IpSet | Self::Member => &[List, Get, Upsert, Delete, Clear],
            Self::Rule => &[List, Get, Upsert, Delete, Clear, Append],
        }
    }

    /// Type a request body for this kind. Kinds without a body type reject
    /// any body.
    pub fn parse_body(self, body: Option<Value>) -> Result<Option<Body>> {
        let Some(value) = body else {
            return Ok(None);
        };
        let invalid = |e: serde_json::Error| {
            GatewayError::Validation(format!("invalid {} body: {e}", self.name()))
        };
        let body = match self {
            Self::Rule => Body::Rule(serde_json::from_value(value).map_err(invalid)?),
            Self::IpSet => Body::IpSet(serde_json::from_value(value).map_err(invalid)?),
            _ => {
                return Err(GatewayError::Validation(format!(
                    "{} does not take a request body",
                    self.name()
                )))
            }
        };
        Ok(Some(body))
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A typed request body.
#[derive(Debug, Clone, PartialEq)]
pub enum Body {
    Rule(RuleSpec),
    IpSet(IpSetSpec),
}

/// Where a path points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    kind: NodeKind,
    /// Identifiers of the ancestors, root first: version, namespace, ...
    parents: Vec<String>,
    /// Trailing identifier, absent for a collection.
    id: Option<String>,
}

/// Resolve a request path. Performs no I/O.
pub fn resolve(path: &str) -> Result<Target> {
    let rest = path
        .strip_prefix("/api")
        .filter(|r| r.is_empty() || r.starts_with('/'))
        .ok_or_else(|| GatewayError::Validation(format!("path '{path}' is not under /api")))?;
    let segments: Vec<&str> = rest.split('/').filter(|s| !s.is_empty()).collect();

    let mut kind = NodeKind::Version;
    let mut parents = Vec::new();
    let mut remaining = segments.as_slice();
    loop {
        match remaining {
            [] => return Ok(Target::new(kind, parents, None)),
            [id] => return Ok(Target::new(kind, parents, Some(*id))),
            [id, relation, tail @ ..] => {
                if kind == NodeKind::Version && *id != API_VERSION {
                    return Err(GatewayError::NotFound(format!("api version '{id}'")));
                }
                kind = kind.child(relation)?;
                parents.push(id.to_string());
                remaining = tail;
            }
        }
    }
}

impl Target {
    fn new(kind: NodeKind, parents: Vec<String>, id: Option<&str>) -> Self {
        Self {
            kind,
            parents,
            id: id.map(str::to_string),
        }
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    pub fn is_item(&self) -> bool {
        self.id.is_some()
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    /// The operation `method` performs here, if this node permits it.
    pub fn operation(&self, method: &Method) -> Result<Operation> {
        Operation::from_method(method, self.is_item())
            .filter(|op| self.kind.allowed().contains(op))
            .ok_or_else(|| GatewayError::NotAllowed {
                method: method.to_string(),
                allowed: self.allowed_methods().join(", "),
            })
    }

    /// HTTP methods permitted on this target.
    pub fn allowed_methods(&self) -> Vec<&'static str> {
        ["GET", "PUT", "POST", "DELETE"]
            .into_iter()
            .filter(|m| {
                Method::from_bytes(m.as_bytes())
                    .ok()
                    .and_then(|method| Operation::from_method(&method, self.is_item()))
                    .is_some_and(|op| self.kind.allowed().contains(&op))
            })
            .collect()
    }

    /// The namespace this target lives in, if any.
    pub fn netns(&self) -> Option<&str> {
        match self.kind {
            NodeKind::Version => None,
            NodeKind::Namespace => self.id(),
            _ => self.parents.get(1).map(String::as_str),
        }
    }

    /// The namespace that must exist before this target can be reached.
    pub fn enclosing_netns(&self) -> Option<&str> {
        match self.kind {
            NodeKind::Version | NodeKind::Namespace => None,
            _ => self.parents.get(1).map(String::as_str),
        }
    }

    /// The ipset that must exist before a member target can be reached.
    pub fn enclosing_set(&self) -> Option<&str> {
        match self.kind {
            NodeKind::Member => self.parents.get(2).map(String::as_str),
            _ => None,
        }
    }

    fn parent(&self, index: usize) -> Result<&str> {
        self.parents
            .get(index)
            .map(String::as_str)
            .ok_or_else(|| GatewayError::Validation(format!("missing identifier for {}", self.kind)))
    }

    /// Build the resource this target addresses.
    pub fn build(&self, host: &Host, body: Option<Body>) -> Result<Box<dyn Resource>> {
        let id = self.id().unwrap_or("");
        if let Some(ns) = self.netns() {
            validate_name("namespace", ns, MAX_NETNS_NAME)?;
        }
        let resource: Box<dyn Resource> = match (self.kind, body) {
            (NodeKind::Version, _) => Box::new(ApiVersion { id: id.to_string() }),
            (NodeKind::Namespace, _) => Box::new(Namespace::new(host, id)),
            (NodeKind::Table, _) => Box::new(Table::new(host, self.parent(1)?, id)?),
            (NodeKind::Chain, _) => Box::new(Chain::new(self.table(host)?, id)?),
            (NodeKind::Rule, body) => {
                let spec = match body {
                    Some(Body::Rule(spec)) => Some(spec),
                    _ => None,
                };
                let chain = Chain::new(self.table(host)?, self.parent(3)?)?;
                Box::new(Rule::new(chain, self.id(), spec)?)
            }
            (NodeKind::IpSet, body) => {
                let spec = match body {
                    Some(Body::IpSet(spec)) => Some(spec),
                    _ => None,
                };
                Box::new(IpSet::new(host, self.parent(1)?, id, spec)?)
            }
            (NodeKind::Member, _) => {
                let set = IpSet::new(host, self.parent(1)?, self.parent(2)?, None)?;
                Box::new(Member::new(set, self.id())?)
            }
        };
        Ok(resource)
    }

    fn table(&self, host: &Host) -> Result<Table> {
        Table::new(host, self.parent(1)?, self.parent(2)?)
    }
}

/// The API version node. Lists the served version, nothing else.
#[derive(Debug)]
struct ApiVersion {
    id: String,
}

impl fmt::Display for ApiVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "version[{}]", self.id)
    }
}

impl Resource for ApiVersion {
    fn id(&self) -> String {
        self.id.clone()
    }

    fn create(&self) -> Result<()> {
        Err(unsupported("create", self))
    }

    fn delete(&self) -> Result<()> {
        Err(unsupported("delete", self))
    }

    fn list(&self) -> Result<Vec<String>> {
        Ok(vec![API_VERSION.to_string()])
    }

    fn clear(&self) -> Result<()> {
        Err(unsupported("clear", self))
    }
}
