use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::JartrackError;

/// Top-level jartrack configuration, stored at `~/.jartrack/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JartrackConfig {
    /// Maximum services decompiled concurrently.
    #[serde(default = "default_decompile_concurrency")]
    pub decompile_concurrency: usize,

    /// JAR name prefixes considered internal (everything else is third-party).
    #[serde(default = "default_internal_prefixes")]
    pub internal_prefixes: Vec<String>,

    /// SSH connect timeout in seconds.
    #[serde(default = "default_ssh_connect_timeout")]
    pub ssh_connect_timeout_secs: u64,

    /// Overall timeout for a single remote command, in seconds.
    #[serde(default = "default_ssh_command_timeout")]
    pub ssh_command_timeout_secs: u64,

    /// Wall-clock timeout for one decompiler invocation, in seconds.
    #[serde(default = "default_decompile_timeout")]
    pub decompile_timeout_secs: u64,

    /// Path to the decompiler jar (CFR).
    #[serde(default = "default_decompiler_jar")]
    pub decompiler_jar: PathBuf,
}

fn default_decompile_concurrency() -> usize {
    4
}

fn default_ssh_connect_timeout() -> u64 {
    10
}

fn default_ssh_command_timeout() -> u64 {
    120
}

fn default_decompile_timeout() -> u64 {
    300
}

fn default_decompiler_jar() -> PathBuf {
    PathBuf::from("assets/jar/cfr-0.152.jar")
}

fn default_internal_prefixes() -> Vec<String> {
    [
        "dsop",
        "jim",
        "tsm",
        "cmpp",
        "card_market",
        "cmft",
        "customer_service",
        "cloud_encryptor",
        "encryptor_",
        "sim_",
        "smart_auth",
        "sp_",
        "student_card",
        "tp-",
        "tsn_",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

impl Default for JartrackConfig {
    fn default() -> Self {
        Self {
            decompile_concurrency: default_decompile_concurrency(),
            internal_prefixes: default_internal_prefixes(),
            ssh_connect_timeout_secs: default_ssh_connect_timeout(),
            ssh_command_timeout_secs: default_ssh_command_timeout(),
            decompile_timeout_secs: default_decompile_timeout(),
            decompiler_jar: default_decompiler_jar(),
        }
    }
}

impl JartrackConfig {
    /// Returns the jartrack home directory (`~/.jartrack/`).
    pub fn home_dir() -> Result<PathBuf, JartrackError> {
        let base = dirs::home_dir().ok_or_else(|| JartrackError::Config {
            message: "could not determine home directory".into(),
        })?;
        Ok(base.join(".jartrack"))
    }

    /// Returns the path to the config file.
    pub fn config_path() -> Result<PathBuf, JartrackError> {
        Ok(Self::home_dir()?.join("config.toml"))
    }

    /// Returns the path to the database file.
    pub fn db_path() -> Result<PathBuf, JartrackError> {
        Ok(Self::home_dir()?.join("jartrack.db"))
    }

    /// Load config from the default location, or return defaults if not found.
    pub fn load() -> Result<Self, JartrackError> {
        let path = Self::config_path()?;
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self, JartrackError> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| JartrackError::Serialization(e.to_string()))
    }

    /// Save config to a specific path.
    pub fn save_to(&self, path: &Path) -> Result<(), JartrackError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| JartrackError::Serialization(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Initialize the jartrack home directory with default config.
    pub fn init() -> Result<PathBuf, JartrackError> {
        let home = Self::home_dir()?;
        std::fs::create_dir_all(&home)?;

        let config_path = Self::config_path()?;
        if !config_path.exists() {
            Self::default().save_to(&config_path)?;
        }

        Ok(home)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_roundtrip() {
        let config = JartrackConfig::default();
        let serialized = toml::to_string_pretty(&config).unwrap();
        let deserialized: JartrackConfig = toml::from_str(&serialized).unwrap();
        assert_eq!(
            config.decompile_concurrency,
            deserialized.decompile_concurrency
        );
        assert_eq!(config.internal_prefixes, deserialized.internal_prefixes);
        assert_eq!(
            config.decompile_timeout_secs,
            deserialized.decompile_timeout_secs
        );
    }

    #[test]
    fn test_defaults() {
        let config = JartrackConfig::default();
        assert_eq!(config.decompile_concurrency, 4);
        assert_eq!(config.ssh_connect_timeout_secs, 10);
        assert_eq!(config.ssh_command_timeout_secs, 120);
        assert_eq!(config.decompile_timeout_secs, 300);
        assert!(config.internal_prefixes.contains(&"dsop".to_string()));
    }
}
