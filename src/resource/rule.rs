//! iptables rules with an identity embedded in their comment match.
//!
//! iptables has no persistent rule ids, so every rule created here carries a
//! comment of the form `gw-dt[<8 hex digits>]: <comment>`. The id is
//! recovered by decoding `iptables-save` output, which also yields the rest
//! of the rule needed to delete it by its exact arguments. Rules without the
//! marker are foreign and never listed.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::{lines, Chain, Resource};
use crate::argv;
use crate::error::{GatewayError, Result};
use crate::validation::{validate_name, MAX_CHAIN_NAME, MAX_SET_NAME};

/// Marker prefixing every managed rule comment.
pub const RULE_TAG: &str = "gw-dt";

/// iptables limits comments to 256 bytes; `gw-dt[xxxxxxxx]: ` takes 17.
pub const MAX_COMMENT: usize = 256 - 17;

/// Attempts at finding an id not yet used in the chain.
const ID_ATTEMPTS: usize = 8;

/// A 32-bit rule identity, rendered as 8 lowercase hex digits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RuleId(u32);

impl RuleId {
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    pub fn random() -> Self {
        Self(rand::random())
    }
}

impl fmt::Display for RuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08x}", self.0)
    }
}

impl FromStr for RuleId {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self> {
        if s.len() != 8 || !s.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(GatewayError::Validation(format!(
                "rule id '{s}' is not 8 hex digits"
            )));
        }
        u32::from_str_radix(s, 16)
            .map(Self)
            .map_err(|e| GatewayError::Validation(format!("rule id '{s}': {e}")))
    }
}

/// User-facing rule attributes.
///
/// `start` and `end` are reserved for scheduled downtime windows; they are
/// accepted and echoed but never enforced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RuleSpec {
    pub target: String,
    pub match_set_src: Option<String>,
    pub comment: String,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl Default for RuleSpec {
    fn default() -> Self {
        Self {
            target: "RETURN".to_string(),
            match_set_src: None,
            comment: String::new(),
            start: None,
            end: None,
        }
    }
}

impl RuleSpec {
    /// Reject anything that would not survive the argument vector or the
    /// `iptables-save` round trip.
    pub fn validate(&self) -> Result<()> {
        validate_name("target", &self.target, MAX_CHAIN_NAME)?;
        if let Some(set) = &self.match_set_src {
            validate_name("ipset", set, MAX_SET_NAME)?;
        }
        if self.comment.len() > MAX_COMMENT {
            return Err(GatewayError::Validation(format!(
                "comment is longer than {MAX_COMMENT} bytes"
            )));
        }
        if self
            .comment
            .chars()
            .any(|c| c == '"' || c == '\\' || c.is_control())
        {
            return Err(GatewayError::Validation(
                "comment may not contain quotes, backslashes or control characters".into(),
            ));
        }
        Ok(())
    }

    /// Same rule as far as iptables is concerned.
    fn same_rule(&self, other: &RuleSpec) -> bool {
        self.target == other.target
            && self.match_set_src == other.match_set_src
            && self.comment == other.comment
    }
}

/// A rule in a chain. Without an id the descriptor addresses the chain's
/// rule collection.
#[derive(Debug, Clone)]
pub struct Rule {
    chain: Chain,
    id: Option<RuleId>,
    spec: Option<RuleSpec>,
}

impl Rule {
    /// Build a rule descriptor from an optional path id and an optional body.
    pub fn new(chain: Chain, id: Option<&str>, spec: Option<RuleSpec>) -> Result<Self> {
        let id = id.map(str::parse::<RuleId>).transpose()?;
        if let Some(spec) = &spec {
            spec.validate()?;
        }
        Ok(Self { chain, id, spec })
    }

    pub fn with_id(chain: Chain, id: RuleId, spec: RuleSpec) -> Self {
        Self {
            chain,
            id: Some(id),
            spec: Some(spec),
        }
    }

    pub fn rule_id(&self) -> Option<RuleId> {
        self.id
    }

    /// The attributes this descriptor would create the rule with.
    pub fn desired(&self) -> RuleSpec {
        self.spec.clone().unwrap_or_default()
    }

    fn require_id(&self) -> Result<RuleId> {
        self.id
            .ok_or_else(|| GatewayError::Validation(format!("{self} has no rule id")))
    }

    /// `gw-dt[<id>]: <comment>`
    pub fn comment_text(id: RuleId, comment: &str) -> String {
        format!("{RULE_TAG}[{id}]: {comment}")
    }

    /// Full argument vector for `iptables -A` and `iptables -D`.
    pub fn args(&self) -> Result<Vec<String>> {
        let id = self.require_id()?;
        let spec = self.desired();
        let mut args = argv![self.chain.name(), "-t", self.chain.table().name()];
        if let Some(set) = &spec.match_set_src {
            args.extend(argv!["-m", "set", "--match-set", set, "src"]);
        }
        args.extend(argv![
            "-m",
            "comment",
            "--comment",
            Self::comment_text(id, &spec.comment),
            "-j",
            &spec.target
        ]);
        Ok(args)
    }

    /// Decode one `iptables-save` line of this rule's chain.
    ///
    /// Returns `None` for lines of other chains and for rules carrying no
    /// managed comment.
    pub fn load(chain: &Chain, line: &str) -> Result<Option<Rule>> {
        let prefix = format!("-A {} ", chain.name());
        if !line.starts_with(&prefix) || !line.contains(&format!("{RULE_TAG}[")) {
            return Ok(None);
        }
        let tokens = tokenize(line)?;
        let parse_err = |what: &str| GatewayError::Parse(format!("{what} in rule '{line}'"));

        let mut spec = RuleSpec {
            target: String::new(),
            ..RuleSpec::default()
        };
        let mut id = None;
        let mut rest = tokens.get(2..).unwrap_or_default();
        loop {
            match rest {
                [] => break,
                [m, set, flag, name, dir, tail @ ..]
                    if m == "-m" && set == "set" && flag == "--match-set" =>
                {
                    if dir != "src" {
                        return Err(parse_err("only src set matches are supported"));
                    }
                    spec.match_set_src = Some(name.clone());
                    rest = tail;
                }
                [m, kind, flag, text, tail @ ..]
                    if m == "-m" && kind == "comment" && flag == "--comment" =>
                {
                    let (rid, comment) =
                        decode_comment(text).ok_or_else(|| parse_err("unrecognised comment"))?;
                    id = Some(rid);
                    spec.comment = comment.to_string();
                    rest = tail;
                }
                [j, target, tail @ ..] if j == "-j" => {
                    spec.target = target.clone();
                    rest = tail;
                }
                [other, ..] => return Err(parse_err(&format!("unexpected '{other}'"))),
            }
        }

        let id = id.ok_or_else(|| parse_err("no comment match"))?;
        if spec.target.is_empty() {
            return Err(parse_err("no target"));
        }
        Ok(Some(Rule::with_id(chain.clone(), id, spec)))
    }

    /// Every managed rule currently saved in this rule's chain, in order.
    pub fn saved(&self) -> Result<Vec<Rule>> {
        let table = self.chain.table();
        let result = table
            .runner()
            .exec(argv!["iptables-save", "-t", table.name()])?;
        let mut rules = Vec::new();
        for line in lines(&result.output) {
            if let Some(rule) = Rule::load(&self.chain, line)? {
                rules.push(rule);
            }
        }
        Ok(rules)
    }

    fn find_saved(&self) -> Result<Option<Rule>> {
        let id = self.require_id()?;
        Ok(self.saved()?.into_iter().find(|r| r.id == Some(id)))
    }

    fn iptables(&self, op: &str, rule: &Rule) -> Result<Vec<String>> {
        let mut cmd = argv!["iptables", op];
        cmd.extend(rule.args()?);
        Ok(cmd)
    }

    /// An id not used by any rule currently in the chain.
    pub fn unused_id(&self) -> Result<RuleId> {
        let taken: Vec<RuleId> = self.saved()?.iter().filter_map(|r| r.id).collect();
        for _ in 0..ID_ATTEMPTS {
            let id = RuleId::random();
            if !taken.contains(&id) {
                return Ok(id);
            }
            warn!(%id, chain = %self.chain, "rule id collision, rolling again");
        }
        Err(GatewayError::Validation(format!(
            "could not find an unused rule id in {}",
            self.chain
        )))
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.id {
            Some(id) => write!(f, "{}:rule[{id}]", self.chain),
            None => write!(f, "{}:rule[]", self.chain),
        }
    }
}

impl Resource for Rule {
    fn id(&self) -> String {
        self.id.map(|id| id.to_string()).unwrap_or_default()
    }

    fn create(&self) -> Result<()> {
        let cmd = self.iptables("-A", self)?;
        self.chain.table().runner().run([cmd])
    }

    /// Deletes by the saved rule's arguments, so only the id needs to match.
    fn delete(&self) -> Result<()> {
        let saved = self
            .find_saved()?
            .ok_or_else(|| GatewayError::NotFound(self.to_string()))?;
        let cmd = self.iptables("-D", &saved)?;
        self.chain.table().runner().run([cmd])
    }

    fn list(&self) -> Result<Vec<String>> {
        Ok(self.saved()?.iter().map(Resource::id).collect())
    }

    fn clear(&self) -> Result<()> {
        let saved = self.saved()?;
        debug!(chain = %self.chain, rules = saved.len(), "clearing rules");
        let batch = saved
            .iter()
            .map(|rule| self.iptables("-D", rule))
            .collect::<Result<Vec<_>>>()?;
        self.chain.table().runner().run(batch)
    }

    fn describe(&self) -> Result<Option<serde_json::Value>> {
        let Some(saved) = self.find_saved()? else {
            return Ok(None);
        };
        serde_json::to_value(saved.desired())
            .map(Some)
            .map_err(|e| GatewayError::Parse(format!("cannot render {self}: {e}")))
    }

    /// Replace the saved rule when the requested attributes differ. The
    /// replacement is appended, so it moves to the end of the chain.
    fn refresh(&self) -> Result<bool> {
        let Some(wanted) = &self.spec else {
            return Ok(false);
        };
        let Some(saved) = self.find_saved()? else {
            return Ok(false);
        };
        if saved.desired().same_rule(wanted) {
            return Ok(false);
        }
        let batch = [self.iptables("-D", &saved)?, self.iptables("-A", self)?];
        self.chain.table().runner().run(batch)?;
        Ok(true)
    }

    fn append(&self) -> Result<String> {
        let id = self.unused_id()?;
        let rule = Rule::with_id(self.chain.clone(), id, self.desired());
        rule.create().map_err(|e| e.within(rule.to_string()))?;
        info!(rule = %rule, "appended");
        Ok(id.to_string())
    }
}

/// Recover the id and free text from `gw-dt[<id>]: <comment>`.
fn decode_comment(text: &str) -> Option<(RuleId, &str)> {
    let rest = text.strip_prefix(RULE_TAG)?.strip_prefix('[')?;
    let (hex, comment) = rest.split_once(']')?;
    let comment = comment.strip_prefix(':')?;
    let comment = comment.strip_prefix(' ').unwrap_or(comment);
    let id = hex.parse().ok()?;
    Some((id, comment))
}

/// Split a saved rule on whitespace, keeping double-quoted strings together.
pub(super) fn tokenize(line: &str) -> Result<Vec<String>> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut quoted = false;
    let mut chars = line.chars();

    while let Some(c) = chars.next() {
        match c {
            '"' => {
                in_quotes = !in_quotes;
                quoted = true;
            }
            '\\' if in_quotes => {
                if let Some(escaped) = chars.next() {
                    current.push(escaped);
                }
            }
            c if c.is_whitespace() && !in_quotes => {
                if !current.is_empty() || quoted {
                    tokens.push(std::mem::take(&mut current));
                    quoted = false;
                }
            }
            c => current.push(c),
        }
    }
    if in_quotes {
        return Err(GatewayError::Parse(format!("unterminated quote in '{line}'")));
    }
    if !current.is_empty() || quoted {
        tokens.push(current);
    }
    Ok(tokens)
}
