//! Sequential, optionally namespaced command batches with a result trail.
//!
//! A [`Runner`] executes argument vectors one after another through a
//! [`CommandExecutor`]. When bound to a network namespace every vector is
//! prefixed with `ip netns exec <ns>`. Each attempt, including the failing
//! one, is appended to a shared log before the runner returns, so callers can
//! read the previous command's output (`last_out`) or dump the trail when
//! something goes wrong.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use tracing::debug;

use crate::cmd_abstraction::CommandExecutor;
use crate::error::{GatewayError, Result};

/// One executed command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResult {
    pub command: Vec<String>,
    pub output: String,
    pub code: i32,
}

impl fmt::Display for CommandResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.code != 0 {
            write!(f, "[{}] ", self.code)?;
        }
        write!(f, "{}\n{}", self.command.join(" "), self.output)
    }
}

/// Executes command batches, stopping at the first failure.
///
/// Clones share the executor and the result log.
#[derive(Clone)]
pub struct Runner {
    netns: Option<String>,
    executor: Arc<dyn CommandExecutor>,
    log: Arc<Mutex<Vec<CommandResult>>>,
}

impl Runner {
    /// A runner executing directly on the host network stack.
    pub fn new(executor: Arc<dyn CommandExecutor>) -> Self {
        Self {
            netns: None,
            executor,
            log: Arc::default(),
        }
    }

    /// A runner whose commands execute inside `netns`. An empty name means
    /// the host stack.
    pub fn in_netns(executor: Arc<dyn CommandExecutor>, netns: &str) -> Self {
        Self {
            netns: (!netns.is_empty()).then(|| netns.to_string()),
            ..Self::new(executor)
        }
    }

    pub fn netns(&self) -> Option<&str> {
        self.netns.as_deref()
    }

    /// Prefix `cmd` with the namespace-exec wrapper if bound to a namespace.
    pub fn wrap(&self, cmd: Vec<String>) -> Vec<String> {
        match &self.netns {
            None => cmd,
            Some(ns) => ["ip", "netns", "exec", ns.as_str()]
                .into_iter()
                .map(String::from)
                .chain(cmd)
                .collect(),
        }
    }

    /// Run every command in order, stopping at the first non-zero exit or
    /// launch failure. Already-applied commands are not rolled back.
    pub fn run<I>(&self, batch: I) -> Result<()>
    where
        I: IntoIterator<Item = Vec<String>>,
    {
        for cmd in batch {
            self.exec(cmd)?;
        }
        Ok(())
    }

    /// Run a single command and return its result.
    pub fn exec(&self, cmd: Vec<String>) -> Result<CommandResult> {
        let result = self.attempt(cmd)?;
        if result.code != 0 {
            return Err(GatewayError::Execution {
                command: result.command.join(" "),
                code: result.code,
                output: result.output,
            });
        }
        Ok(result)
    }

    /// Run a check-style command (`iptables -C`, `ipset test`) where exit
    /// code 1 means "no" rather than failure.
    pub fn probe(&self, cmd: Vec<String>) -> Result<bool> {
        let result = self.attempt(cmd)?;
        match result.code {
            0 => Ok(true),
            1 => Ok(false),
            code => Err(GatewayError::Execution {
                command: result.command.join(" "),
                code,
                output: result.output,
            }),
        }
    }

    fn attempt(&self, cmd: Vec<String>) -> Result<CommandResult> {
        let command = self.wrap(cmd);
        let outcome = self.executor.execute(&command);
        let result = match outcome {
            Ok(out) => CommandResult {
                command,
                output: out.output,
                // killed by a signal
                code: out.code.unwrap_or(-1),
            },
            Err(source) => {
                self.record(CommandResult {
                    command: command.clone(),
                    output: source.to_string(),
                    code: 1,
                });
                return Err(GatewayError::Launch {
                    command: command.join(" "),
                    source,
                });
            }
        };
        debug!(command = %result.command.join(" "), code = result.code, "executed");
        self.record(result.clone());
        Ok(result)
    }

    fn record(&self, result: CommandResult) {
        self.log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(result);
    }

    /// The most recently recorded result, if any.
    pub fn last(&self) -> Option<CommandResult> {
        self.log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .last()
            .cloned()
    }

    /// Output of the most recent command, empty if nothing ran yet.
    pub fn last_out(&self) -> String {
        self.last().map(|r| r.output).unwrap_or_default()
    }

    /// Snapshot of every recorded result, oldest first.
    pub fn results(&self) -> Vec<CommandResult> {
        self.log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl fmt::Debug for Runner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runner")
            .field("netns", &self.netns)
            .field("results", &self.results().len())
            .finish()
    }
}

impl fmt::Display for Runner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let lines: Vec<String> = self.results().iter().map(ToString::to_string).collect();
        f.write_str(&lines.join("\n"))
    }
}

/// Build an argument vector from string slices.
#[macro_export]
macro_rules! argv {
    ($($arg:expr),* $(,)?) => {
        vec![$(::std::string::String::from($arg)),*]
    };
}
