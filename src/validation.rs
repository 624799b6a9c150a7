//! Centralized validation for dtgate.
//!
//! This module provides unified validation for:
//! - Object names (namespaces, chains, ipsets) before they reach a command line
//! - MAC addresses used as ipset members

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::error::{GatewayError, Result};

/// iptables chain names are limited to 28 characters.
pub const MAX_CHAIN_NAME: usize = 28;

/// ipset names are limited to 31 characters; the builder suffix must fit too.
pub const MAX_SET_NAME: usize = 31 - BUILDER_SUFFIX.len();

/// Suffix of the staging set used for atomic replacement.
pub const BUILDER_SUFFIX: &str = "-builder";

/// Network namespace names end up as file names under /run/netns.
pub const MAX_NETNS_NAME: usize = 64;

/// Validate a name used as a command argument.
///
/// Only ASCII alphanumerics, `-`, `_` and `.` are allowed, which keeps names
/// from being mistaken for options or splitting into several arguments.
///
/// # Examples
/// ```
/// use dtgate::validation::validate_name;
/// assert!(validate_name("chain", "downtime", 28).is_ok());
/// assert!(validate_name("chain", "-X", 28).is_err());
/// assert!(validate_name("chain", "", 28).is_err());
/// ```
pub fn validate_name(kind: &str, name: &str, max_len: usize) -> Result<()> {
    if name.is_empty() {
        return Err(GatewayError::Validation(format!("{kind} name cannot be empty")));
    }
    if name.len() > max_len {
        return Err(GatewayError::Validation(format!(
            "{kind} name '{name}' is longer than {max_len} characters"
        )));
    }
    if name.starts_with('-') {
        return Err(GatewayError::Validation(format!(
            "{kind} name '{name}' cannot start with '-'"
        )));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
    {
        return Err(GatewayError::Validation(format!(
            "{kind} name '{name}' may only contain letters, digits, '-', '_' and '.'"
        )));
    }
    Ok(())
}

/// A 6-byte hardware address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Mac([u8; 6]);

impl Mac {
    pub const fn new(bytes: [u8; 6]) -> Self {
        Self(bytes)
    }

    pub fn octets(&self) -> [u8; 6] {
        self.0
    }
}

impl fmt::Display for Mac {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02X}:{b:02X}:{c:02X}:{d:02X}:{e:02X}:{g:02X}")
    }
}

impl FromStr for Mac {
    type Err = GatewayError;

    /// Accepts colon or dash separated octets, any hex case.
    fn from_str(s: &str) -> Result<Self> {
        let invalid = || GatewayError::Validation(format!("could not convert '{s}' into a MAC"));

        let parts: Vec<&str> = s.split([':', '-']).collect();
        if parts.len() != 6 {
            return Err(invalid());
        }
        let mut bytes = [0u8; 6];
        for (slot, part) in bytes.iter_mut().zip(&parts) {
            if part.len() != 2 || !part.chars().all(|c| c.is_ascii_hexdigit()) {
                return Err(invalid());
            }
            *slot = u8::from_str_radix(part, 16).map_err(|_| invalid())?;
        }
        Ok(Self(bytes))
    }
}

impl Serialize for Mac {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Mac {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
