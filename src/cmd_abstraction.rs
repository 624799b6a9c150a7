//! Command execution abstraction for testability.
//!
//! Every OS-level side effect of the crate goes through [`CommandExecutor`],
//! so unit tests can substitute a mock or a simulated network stack without
//! touching real namespaces, iptables or ipsets.

use std::io;
use std::process::{Command, Stdio};

#[cfg(test)]
use mockall::automock;

/// Output from command execution
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// stdout followed by stderr, trailing newlines trimmed
    pub output: String,
    /// The exit code; `None` if the process was killed by a signal
    pub code: Option<i32>,
}

impl CommandOutput {
    pub fn success(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            code: Some(0),
        }
    }

    pub fn failure(code: i32, output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            code: Some(code),
        }
    }

    pub fn is_success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Trait for command execution, allowing dependency injection for testing.
///
/// `argv[0]` is the program, the rest are its arguments. A non-zero exit is
/// reported through [`CommandOutput::code`], only launch failures are errors.
#[cfg_attr(test, automock)]
pub trait CommandExecutor: Send + Sync {
    fn execute(&self, argv: &[String]) -> io::Result<CommandOutput>;
}

/// Runs actual system commands.
#[derive(Debug, Clone, Default)]
pub struct RealCommandExecutor;

impl RealCommandExecutor {
    pub fn new() -> Self {
        Self
    }
}

impl CommandExecutor for RealCommandExecutor {
    fn execute(&self, argv: &[String]) -> io::Result<CommandOutput> {
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "empty command"))?;

        let output = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()?;

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));
        let trimmed_len = combined.trim_end_matches('\n').len();
        combined.truncate(trimmed_len);

        Ok(CommandOutput {
            output: combined,
            code: output.status.code(),
        })
    }
}
