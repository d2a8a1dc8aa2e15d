use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{AgentError, Result};

/// Environment variable naming the directory that holds the agent's
/// configuration files.
pub const CONF_DIR_ENV: &str = "TASK_AGENT_CONF_DIR";

const DEFAULT_CONF_DIR: &str = "/conf";
const DEFAULT_SECURITY_FILE: &str = "shell-security.yaml";

/// Top-level application configuration, loaded from `agent.yaml`.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AgentConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub security: SecuritySection,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerConfig {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecuritySection {
    /// Path to the shell security policy file. Relative paths are resolved
    /// against the config directory.
    #[serde(default = "default_security_file")]
    pub config_path: PathBuf,
}

impl Default for SecuritySection {
    fn default() -> Self {
        Self {
            config_path: default_security_file(),
        }
    }
}

fn default_listen_addr() -> SocketAddr {
    "0.0.0.0:50051".parse().expect("default listen addr")
}

fn default_security_file() -> PathBuf {
    PathBuf::from(DEFAULT_SECURITY_FILE)
}

/// The config directory, from `TASK_AGENT_CONF_DIR` or `/conf`.
pub fn config_dir() -> PathBuf {
    std::env::var_os(CONF_DIR_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONF_DIR))
}

impl AgentConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            AgentError::Config(format!("failed to read {}: {}", path.display(), e))
        })?;
        serde_yaml::from_str(&raw)
            .map_err(|e| AgentError::Config(format!("failed to parse {}: {}", path.display(), e)))
    }

    /// Absolute location of the shell security policy file.
    pub fn security_config_path(&self) -> PathBuf {
        if self.security.config_path.is_absolute() {
            self.security.config_path.clone()
        } else {
            config_dir().join(&self.security.config_path)
        }
    }
}
