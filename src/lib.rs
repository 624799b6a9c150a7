//! # dtgate - REST gateway for per-device internet downtime
//!
//! Network namespaces, iptables tables, chains and rules, and ipsets of MAC
//! addresses are exposed as one HTTP resource tree. Every request is
//! reconciled against the live system by shelling out to `ip`, `iptables`,
//! `iptables-save` and `ipset`; nothing is persisted in between.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        dtgate                               │
//! ├─────────────────────────────────────────────────────────────┤
//! │  CLI (clap)            serve, status, version               │
//! │  Config (serde_yaml)   listen address, downtime wiring      │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Server (axum)         fallback handler -> Gateway          │
//! │  Gateway               per-namespace locks, spawn_blocking  │
//! │  Tree                  /api/v1/netns/... -> Target          │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Resource + Lifecycle  namespace, table, chain, rule,       │
//! │                        ipset, member                        │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Runner                batches, `ip netns exec` wrapping    │
//! │  CommandExecutor       real process or test double          │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use dtgate::cmd_abstraction::RealCommandExecutor;
//! use dtgate::config::Config;
//! use dtgate::dispatch::{Gateway, Request};
//! use dtgate::resource::Host;
//! use axum::http::Method;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load_or_default("/etc/dtgate/config.yaml")?;
//!     let host = Host::new(Arc::new(RealCommandExecutor::new()), config.downtime);
//!     let gateway = Gateway::new(host);
//!
//!     let reply = gateway
//!         .handle(Request::new(Method::PUT, "/api/v1/netns/lan/ipsets/kids"))
//!         .await;
//!     println!("{}", reply.status);
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`cli`] - Command-line interface definitions
//! - [`cmd_abstraction`] - Process execution seam
//! - [`commands`] - CLI command implementations
//! - [`config`] - Configuration parsing and validation
//! - [`dispatch`] - Request to operation dispatcher
//! - [`error`] - Error taxonomy and HTTP status mapping
//! - [`lock`] - Per-namespace request serialisation
//! - [`resource`] - Managed objects and the idempotent lifecycle
//! - [`runner`] - Command batches and namespace wrapping
//! - [`server`] - HTTP surface
//! - [`signal`] - Graceful shutdown signal handling
//! - [`tree`] - Path resolution over the resource graph
//! - [`validation`] - Name and MAC address validation

pub mod cli;
pub mod cmd_abstraction;
pub mod commands;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod lock;
pub mod resource;
pub mod runner;
pub mod server;
pub mod signal;
pub mod tree;
pub mod validation;

#[cfg(test)]
mod fake_system;

pub use cli::{Cli, Commands};
pub use config::Config;
pub use dispatch::{Gateway, Reply, Request};
pub use error::{GatewayError, Result};
