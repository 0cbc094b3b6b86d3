//! Runtime configuration
//!
//! Read from a TOML file; every key is optional:
//!
//! ```toml
//! index_url = "/project/access_and_security/"
//! instances_url = "/project/instances/"
//! inventory_path = "/var/lib/floating-ips/inventory.json"
//! log_filter = "floating_ip_substrate=debug"
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Environment variable naming the config file
pub const CONFIG_ENV: &str = "FIP_CONFIG";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct FloatingIpConfig {
    /// Page listing floating IPs; the default redirect target
    pub index_url: String,
    /// Instances page, a common `next` target
    pub instances_url: String,
    /// JSON inventory used by the in-memory backend
    pub inventory_path: PathBuf,
    /// `EnvFilter` directive used when `RUST_LOG` is unset
    pub log_filter: String,
}

impl Default for FloatingIpConfig {
    fn default() -> Self {
        Self {
            index_url: "/project/access_and_security/".to_string(),
            instances_url: "/project/instances/".to_string(),
            inventory_path: default_data_dir().join("inventory.json"),
            log_filter: "info".to_string(),
        }
    }
}

/// Per-user data directory, or `./.floating-ips` when the platform has none
pub fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .map(|dir| dir.join("floating-ips"))
        .unwrap_or_else(|| PathBuf::from(".floating-ips"))
}

impl FloatingIpConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load `path` when given, otherwise fall back to defaults
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }
}
