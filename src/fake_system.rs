//! In-memory stand-in for `ip netns`, `iptables`, `iptables-save` and
//! `ipset`, used by unit tests to drive resources end to end.
//!
//! Every command is applied under one lock, so a concurrent observer sees
//! each command either fully applied or not at all, as with the real tools.

use std::collections::{BTreeMap, BTreeSet};
use std::io;
use std::sync::Mutex;

use crate::cmd_abstraction::{CommandExecutor, CommandOutput};
use crate::resource::KNOWN_TABLES;
use crate::validation::Mac;

type Reply = std::result::Result<String, (i32, String)>;

fn fail<T>(msg: impl Into<String>) -> std::result::Result<T, (i32, String)> {
    Err((1, msg.into()))
}

#[derive(Debug, Default)]
struct Table {
    /// Chain name to rule specs, in insertion order.
    chains: BTreeMap<String, Vec<Vec<String>>>,
    builtin: BTreeSet<String>,
}

#[derive(Debug)]
struct Netns {
    id: usize,
    tables: BTreeMap<String, Table>,
    sets: BTreeMap<String, BTreeSet<Mac>>,
}

impl Netns {
    fn new(id: usize) -> Self {
        let tables = KNOWN_TABLES
            .iter()
            .map(|(name, builtin)| {
                let table = Table {
                    chains: builtin.iter().map(|c| (c.to_string(), Vec::new())).collect(),
                    builtin: builtin.iter().map(|c| c.to_string()).collect(),
                };
                (name.to_string(), table)
            })
            .collect();
        Self {
            id,
            tables,
            sets: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Default)]
struct State {
    namespaces: BTreeMap<String, Netns>,
    next_id: usize,
    fail_next: Option<String>,
    history: Vec<Vec<String>>,
}

/// Simulated network stack.
#[derive(Debug, Default)]
pub struct FakeSystem {
    state: Mutex<State>,
}

impl FakeSystem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_namespace(ns: &str) -> Self {
        let fake = Self::new();
        fake.execute(&[
            "ip".to_string(),
            "netns".to_string(),
            "add".to_string(),
            ns.to_string(),
        ])
        .unwrap();
        fake
    }

    /// Fail the next command that has `arg` among its arguments.
    pub fn fail_next(&self, arg: &str) {
        self.state.lock().unwrap().fail_next = Some(arg.to_string());
    }

    pub fn set_members(&self, ns: &str, set: &str) -> Option<Vec<Mac>> {
        let state = self.state.lock().unwrap();
        let members = state.namespaces.get(ns)?.sets.get(set)?;
        Some(members.iter().copied().collect())
    }

    pub fn has_chain(&self, ns: &str, table: &str, chain: &str) -> bool {
        let state = self.state.lock().unwrap();
        state
            .namespaces
            .get(ns)
            .and_then(|n| n.tables.get(table))
            .is_some_and(|t| t.chains.contains_key(chain))
    }

    /// Rules of a chain rendered as `iptables-save` lines.
    pub fn rules(&self, ns: &str, table: &str, chain: &str) -> Vec<String> {
        let state = self.state.lock().unwrap();
        state
            .namespaces
            .get(ns)
            .and_then(|n| n.tables.get(table))
            .and_then(|t| t.chains.get(chain))
            .map(|rules| rules.iter().map(|r| render(chain, r)).collect())
            .unwrap_or_default()
    }

    pub fn rule_count(&self, ns: &str, table: &str, chain: &str) -> usize {
        self.rules(ns, table, chain).len()
    }

    /// Append a rule not created through the resource layer.
    pub fn add_foreign_rule(&self, ns: &str, table: &str, chain: &str, spec: &str) {
        let mut state = self.state.lock().unwrap();
        let rules = state
            .namespaces
            .get_mut(ns)
            .and_then(|n| n.tables.get_mut(table))
            .and_then(|t| t.chains.get_mut(chain))
            .unwrap();
        rules.push(spec.split_whitespace().map(String::from).collect());
    }

    pub fn namespaces(&self) -> Vec<String> {
        self.state.lock().unwrap().namespaces.keys().cloned().collect()
    }

    /// Every command received so far, oldest first.
    pub fn history(&self) -> Vec<Vec<String>> {
        self.state.lock().unwrap().history.clone()
    }
}

impl CommandExecutor for FakeSystem {
    fn execute(&self, argv: &[String]) -> io::Result<CommandOutput> {
        let mut state = self.state.lock().unwrap();
        state.history.push(argv.to_vec());
        if let Some(arg) = state.fail_next.clone() {
            if argv.contains(&arg) {
                state.fail_next = None;
                return Ok(CommandOutput::failure(1, "injected failure"));
            }
        }

        let args: Vec<&str> = argv.iter().map(String::as_str).collect();
        let reply = match args.as_slice() {
            ["ip", "netns", "exec", ns, rest @ ..] => match state.namespaces.get_mut(*ns) {
                Some(netns) => in_netns(netns, rest),
                None => fail(format!(
                    "Cannot open network namespace \"{ns}\": No such file or directory"
                )),
            },
            ["ip", "netns", rest @ ..] => netns_cmd(&mut state, rest),
            [program, ..] => {
                return Err(io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("{program}: only available inside a namespace"),
                ))
            }
            [] => return Err(io::Error::new(io::ErrorKind::InvalidInput, "empty command")),
        };

        Ok(match reply {
            Ok(out) => CommandOutput::success(out),
            Err((code, out)) => CommandOutput::failure(code, out),
        })
    }
}

fn netns_cmd(state: &mut State, args: &[&str]) -> Reply {
    match args {
        ["add", name] => {
            if state.namespaces.contains_key(*name) {
                return fail(format!(
                    "Cannot create namespace file \"/run/netns/{name}\": File exists"
                ));
            }
            let id = state.next_id;
            state.next_id += 1;
            state.namespaces.insert(name.to_string(), Netns::new(id));
            Ok(String::new())
        }
        ["del", name] => match state.namespaces.remove(*name) {
            Some(_) => Ok(String::new()),
            None => fail(format!(
                "Cannot remove namespace file \"/run/netns/{name}\": No such file or directory"
            )),
        },
        ["list"] => Ok(state
            .namespaces
            .iter()
            .rev()
            .map(|(name, ns)| format!("{name} (id: {})", ns.id))
            .collect::<Vec<_>>()
            .join("\n")),
        _ => fail(format!("unsupported: ip netns {}", args.join(" "))),
    }
}

fn in_netns(netns: &mut Netns, args: &[&str]) -> Reply {
    match args {
        ["iptables-save", "-t", table] => {
            let table_state = netns
                .tables
                .get(*table)
                .ok_or((1, format!("iptables-save: table '{table}' does not exist")))?;
            Ok(save(table, table_state))
        }
        ["iptables", rest @ ..] => iptables(netns, rest),
        ["ipset", rest @ ..] => ipset(&mut netns.sets, rest),
        _ => fail(format!("unsupported: {}", args.join(" "))),
    }
}

fn iptables(netns: &mut Netns, args: &[&str]) -> Reply {
    // `-t <table>` may appear anywhere
    let mut table_name = "filter";
    let mut rest = Vec::new();
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        if *arg == "-t" {
            table_name = iter.next().copied().unwrap_or_default();
        } else {
            rest.push(*arg);
        }
    }
    let table = netns
        .tables
        .get_mut(table_name)
        .ok_or((3, format!("can't initialize iptables table `{table_name}'")))?;
    let missing = || (1, "iptables: No chain/target/match by that name.".to_string());

    match rest.as_slice() {
        ["-N", chain] => {
            if table.chains.contains_key(*chain) {
                return fail("iptables: Chain already exists.");
            }
            table.chains.insert(chain.to_string(), Vec::new());
            Ok(String::new())
        }
        ["-F", chain] => {
            table.chains.get_mut(*chain).ok_or_else(missing)?.clear();
            Ok(String::new())
        }
        ["-X", chain] => {
            if table.builtin.contains(*chain) {
                return fail("iptables: Invalid argument. Run `dmesg' for more information.");
            }
            let rules = table.chains.get(*chain).ok_or_else(missing)?;
            if !rules.is_empty() {
                return fail("iptables: Directory not empty.");
            }
            if references(table, chain) > 0 {
                return fail("iptables: Too many links.");
            }
            table.chains.remove(*chain);
            Ok(String::new())
        }
        ["-L", "-n"] => Ok(listing(table)),
        [op @ ("-A" | "-D" | "-C"), chain, spec @ ..] => {
            let spec: Vec<String> = spec.iter().map(|s| s.to_string()).collect();
            let rules = table.chains.get_mut(*chain).ok_or_else(missing)?;
            let position = rules.iter().position(|r| *r == spec);
            match (*op, position) {
                ("-A", _) => {
                    rules.push(spec);
                    Ok(String::new())
                }
                ("-D", Some(i)) => {
                    rules.remove(i);
                    Ok(String::new())
                }
                ("-C", Some(_)) => Ok(String::new()),
                _ => fail("iptables: Bad rule (does a matching rule exist in that chain?)."),
            }
        }
        _ => Err((2, format!("unsupported: iptables {}", args.join(" ")))),
    }
}

fn references(table: &Table, chain: &str) -> usize {
    table
        .chains
        .values()
        .flatten()
        .filter(|rule| rule.windows(2).any(|w| w[0] == "-j" && w[1] == chain))
        .count()
}

fn listing(table: &Table) -> String {
    let mut out = Vec::new();
    for (name, rules) in &table.chains {
        if table.builtin.contains(name) {
            out.push(format!("Chain {name} (policy ACCEPT)"));
        } else {
            out.push(format!("Chain {name} ({} references)", references(table, name)));
        }
        out.push("target     prot opt source               destination".to_string());
        for rule in rules {
            out.push(format!("{:<10} all  --  0.0.0.0/0            0.0.0.0/0", target(rule)));
        }
        out.push(String::new());
    }
    out.join("\n")
}

fn target(rule: &[String]) -> &str {
    rule.windows(2)
        .find(|w| w[0] == "-j")
        .map(|w| w[1].as_str())
        .unwrap_or("")
}

fn save(name: &str, table: &Table) -> String {
    let mut out = vec![
        "# Generated by iptables-save v1.8.7".to_string(),
        format!("*{name}"),
    ];
    for chain in table.chains.keys() {
        let policy = if table.builtin.contains(chain) { "ACCEPT" } else { "-" };
        out.push(format!(":{chain} {policy} [0:0]"));
    }
    for (chain, rules) in &table.chains {
        out.extend(rules.iter().map(|r| render(chain, r)));
    }
    out.push("COMMIT".to_string());
    out.push("# Completed".to_string());
    out.join("\n")
}

fn render(chain: &str, spec: &[String]) -> String {
    let mut line = format!("-A {chain}");
    for token in spec {
        line.push(' ');
        if token.is_empty() || token.contains(char::is_whitespace) {
            line.push('"');
            line.push_str(token);
            line.push('"');
        } else {
            line.push_str(token);
        }
    }
    line
}

/// The `iptables-save` line for a rule created with `iptables -A <args>`.
pub fn render_save_line(args: &[String]) -> String {
    let (chain, rest) = args.split_first().expect("rule args start with the chain");
    let mut spec = Vec::new();
    let mut iter = rest.iter();
    while let Some(arg) = iter.next() {
        if arg == "-t" {
            iter.next();
        } else {
            spec.push(arg.clone());
        }
    }
    render(chain, &spec)
}

fn ipset(sets: &mut BTreeMap<String, BTreeSet<Mac>>, args: &[&str]) -> Reply {
    let exist = args.contains(&"-exist");
    let args: Vec<&str> = args.iter().copied().filter(|a| *a != "-exist").collect();
    let no_set = || (1, "ipset v7.15: The set with the given name does not exist".to_string());
    let parse_mac = |s: &str| {
        s.parse::<Mac>()
            .map_err(|_| (1, format!("ipset v7.15: Syntax error: cannot parse {s}")))
    };

    match args.as_slice() {
        ["-N" | "create", name, "hash:mac"] => {
            if sets.contains_key(*name) {
                if exist {
                    return Ok(String::new());
                }
                return fail("ipset v7.15: Set cannot be created: set with the same name already exists");
            }
            sets.insert(name.to_string(), BTreeSet::new());
            Ok(String::new())
        }
        ["-A" | "add", name, mac] => {
            let mac = parse_mac(*mac)?;
            let set = sets.get_mut(*name).ok_or_else(no_set)?;
            if !set.insert(mac) && !exist {
                return fail("ipset v7.15: Element cannot be added to the set: it's already added");
            }
            Ok(String::new())
        }
        ["-D" | "del", name, mac] => {
            let mac = parse_mac(*mac)?;
            let set = sets.get_mut(*name).ok_or_else(no_set)?;
            if !set.remove(&mac) && !exist {
                return fail("ipset v7.15: Element cannot be deleted from the set: it's not added");
            }
            Ok(String::new())
        }
        ["destroy", name] => {
            sets.remove(*name).ok_or_else(no_set)?;
            Ok(String::new())
        }
        ["flush", name] => {
            sets.get_mut(*name).ok_or_else(no_set)?.clear();
            Ok(String::new())
        }
        ["swap", from, to] => {
            let a = sets.remove(*from).ok_or_else(no_set)?;
            let Some(b) = sets.remove(*to) else {
                sets.insert(from.to_string(), a);
                return Err(no_set());
            };
            sets.insert(from.to_string(), b);
            sets.insert(to.to_string(), a);
            Ok(String::new())
        }
        ["list", "-n"] => Ok(sets.keys().cloned().collect::<Vec<_>>().join("\n")),
        ["save", "-sorted", name] => {
            let set = sets.get(*name).ok_or_else(no_set)?;
            let mut out = vec![format!("create {name} hash:mac hashsize 1024 maxelem 65536 bucketsize 12")];
            out.extend(set.iter().map(|mac| format!("add {name} {mac}")));
            Ok(out.join("\n"))
        }
        _ => Err((2, format!("unsupported: ipset {}", args.join(" ")))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(fake: &FakeSystem, cmd: &str) -> CommandOutput {
        let argv: Vec<String> = cmd.split_whitespace().map(String::from).collect();
        fake.execute(&argv).unwrap()
    }

    #[test]
    fn test_namespace_lifecycle() {
        let fake = FakeSystem::new();
        assert!(run(&fake, "ip netns add lan").is_success());
        assert!(!run(&fake, "ip netns add lan").is_success());
        assert_eq!(run(&fake, "ip netns list").output, "lan (id: 0)");
        assert!(!run(&fake, "ip netns exec wan ipset list -n").is_success());
        assert!(run(&fake, "ip netns del lan").is_success());
        assert!(fake.namespaces().is_empty());
    }

    #[test]
    fn test_chain_with_rules_cannot_be_deleted() {
        let fake = FakeSystem::with_namespace("lan");
        assert!(run(&fake, "ip netns exec lan iptables -t filter -N dt").is_success());
        assert!(run(&fake, "ip netns exec lan iptables -A dt -t filter -j DROP").is_success());
        assert!(!run(&fake, "ip netns exec lan iptables -t filter -X dt").is_success());
        assert!(run(&fake, "ip netns exec lan iptables -t filter -F dt").is_success());
        assert!(run(&fake, "ip netns exec lan iptables -t filter -X dt").is_success());
        assert!(!fake.has_chain("lan", "filter", "dt"));
    }

    #[test]
    fn test_swap_exchanges_contents() {
        let fake = FakeSystem::with_namespace("lan");
        for cmd in [
            "ipset -N a hash:mac",
            "ipset -N b hash:mac",
            "ipset -A b 12:12:12:12:12:12",
            "ipset swap b a",
        ] {
            assert!(run(&fake, &format!("ip netns exec lan {cmd}")).is_success(), "{cmd}");
        }
        assert_eq!(fake.set_members("lan", "a").unwrap().len(), 1);
        assert_eq!(fake.set_members("lan", "b").unwrap().len(), 0);
    }

    #[test]
    fn test_launch_failure_outside_namespace() {
        let fake = FakeSystem::new();
        let argv = vec!["ipset".to_string(), "list".to_string()];
        assert!(fake.execute(&argv).is_err());
    }
}
