//! Configuration management for dtgate.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;

use crate::validation::{validate_name, MAX_CHAIN_NAME};

/// Default configuration file location
pub const DEFAULT_CONFIG_PATH: &str = "/etc/dtgate/config.yaml";

/// Main configuration structure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Address the HTTP API listens on
    pub listen: String,

    /// Downtime chain wiring
    pub downtime: DowntimeConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen: "127.0.0.1:8000".to_string(),
            downtime: DowntimeConfig::default(),
        }
    }
}

/// How the downtime chain is hooked into forwarded traffic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DowntimeConfig {
    /// Name of the chain whose rules decide which devices lose internet access
    pub chain: String,

    /// Internet-facing device. When set, creating the downtime chain in the
    /// filter table also appends `FORWARD -o <device> -j <chain>`.
    pub internet_device: Option<String>,
}

impl Default for DowntimeConfig {
    fn default() -> Self {
        Self {
            chain: "downtime".to_string(),
            internet_device: None,
        }
    }
}

impl Config {
    /// Load configuration from YAML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;
        let config: Config = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path.as_ref()))?;

        config.validate()?;

        Ok(config)
    }

    /// Load configuration, falling back to defaults if the file does not exist
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        if path.as_ref().exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        self.listen_addr()?;

        validate_name("downtime chain", &self.downtime.chain, MAX_CHAIN_NAME)
            .map_err(|e| anyhow::anyhow!("Invalid downtime.chain: {}", e))?;

        if let Some(device) = &self.downtime.internet_device {
            // IFNAMSIZ - 1
            validate_name("internet device", device, 15)
                .map_err(|e| anyhow::anyhow!("Invalid downtime.internet_device: {}", e))?;
        }

        Ok(())
    }

    /// Parsed listen address
    pub fn listen_addr(&self) -> Result<SocketAddr> {
        self.listen
            .parse()
            .with_context(|| format!("Invalid listen address '{}'", self.listen))
    }

    /// Save configuration to YAML file atomically
    ///
    /// Uses tempfile + rename pattern to prevent corruption on crash.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        use std::io::Write;
        use tempfile::NamedTempFile;

        let path = path.as_ref();
        let content = serde_yaml::to_string(self).context("Failed to serialize config")?;

        let parent_dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(Path::new("."));
        let mut temp_file = NamedTempFile::new_in(parent_dir)
            .context("Failed to create temporary file for config")?;

        temp_file
            .write_all(content.as_bytes())
            .context("Failed to write config")?;
        temp_file
            .as_file()
            .sync_all()
            .context("Failed to sync config to disk")?;

        temp_file
            .persist(path)
            .with_context(|| format!("Failed to persist config to {:?}", path))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.downtime.chain, "downtime");
        assert!(config.downtime.internet_device.is_none());
    }

    #[test]
    fn test_parse_partial_yaml_uses_defaults() {
        let yaml = "downtime:\n  internet_device: eth1\n";
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.listen, "127.0.0.1:8000");
        assert_eq!(config.downtime.chain, "downtime");
        assert_eq!(config.downtime.internet_device.as_deref(), Some("eth1"));
    }

    #[test]
    fn test_invalid_listen_address() {
        let config = Config {
            listen: "not-an-address".to_string(),
            ..Config::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("Invalid listen address"));
    }

    #[test]
    fn test_invalid_device_name() {
        let mut config = Config::default();
        config.downtime.internet_device = Some("eth1 -j ACCEPT".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_chain_name() {
        let mut config = Config::default();
        config.downtime.chain = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.yaml");

        let mut config = Config::default();
        config.listen = "0.0.0.0:9000".to_string();
        config.downtime.internet_device = Some("wan0".to_string());
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let dir = tempdir().unwrap();
        let config = Config::load_or_default(dir.path().join("absent.yaml")).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_load_rejects_invalid_yaml() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "listen: [unclosed").unwrap();
        let err = Config::load(&path).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config file"));
    }
}
