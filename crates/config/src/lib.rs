//! Configuration schema and loader for strata storage nodes.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Top-level node configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// This node's name, e.g. `"storage_0@10.0.1.21"`.
    pub node: String,

    /// Replication settings.
    #[serde(default)]
    pub replication: ReplicationConfig,

    /// Repair-consumer settings.
    #[serde(default)]
    pub repair: RepairConfig,

    /// Optional Prometheus metrics HTTP port.
    #[serde(default)]
    pub metrics_port: Option<u16>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplicationConfig {
    /// Default write quorum (W) when the caller does not supply one.
    #[serde(default = "default_w")]
    pub default_w: usize,

    /// Total per-request deadline in milliseconds.
    #[serde(default = "default_req_timeout_ms")]
    pub req_timeout_ms: u64,
}

impl ReplicationConfig {
    pub fn req_timeout(&self) -> Duration {
        Duration::from_millis(self.req_timeout_ms)
    }
}

impl Default for ReplicationConfig {
    fn default() -> Self {
        Self {
            default_w: default_w(),
            req_timeout_ms: default_req_timeout_ms(),
        }
    }
}

/// Pacing of the background repair consumer. An external load watchdog may
/// rewrite these between cycles; the worker reads them per cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepairConfig {
    /// Queue poll interval in seconds.
    #[serde(default = "default_repair_interval_secs")]
    pub interval_secs: u64,

    /// Maximum repair events handled per cycle.
    #[serde(default = "default_repair_batch_size")]
    pub batch_size: usize,
}

impl RepairConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

impl Default for RepairConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_repair_interval_secs(),
            batch_size: default_repair_batch_size(),
        }
    }
}

// --- Defaults ---

fn default_w() -> usize {
    2
}
fn default_req_timeout_ms() -> u64 {
    5000
}
fn default_repair_interval_secs() -> u64 {
    30
}
fn default_repair_batch_size() -> usize {
    100
}

// --- Loading ---

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

impl NodeConfig {
    /// Validate that configuration values are consistent.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.node.is_empty() {
            return Err(ConfigError::Invalid("node must not be empty".into()));
        }
        if self.replication.default_w == 0 {
            return Err(ConfigError::Invalid(
                "replication.default_w must be > 0".into(),
            ));
        }
        if self.replication.req_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "replication.req_timeout_ms must be > 0".into(),
            ));
        }
        if self.repair.batch_size == 0 {
            return Err(ConfigError::Invalid("repair.batch_size must be > 0".into()));
        }
        if self.repair.interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "repair.interval_secs must be > 0".into(),
            ));
        }
        Ok(())
    }
}

/// Load a `NodeConfig` from a YAML file path.
pub fn load_from_file(path: &std::path::Path) -> Result<NodeConfig, ConfigError> {
    let contents = std::fs::read_to_string(path)?;
    let config: NodeConfig = serde_yaml::from_str(&contents)?;
    config.validate()?;
    Ok(config)
}

/// Load a `NodeConfig` from a YAML string.
pub fn load_from_str(yaml: &str) -> Result<NodeConfig, ConfigError> {
    let config: NodeConfig = serde_yaml::from_str(yaml)?;
    config.validate()?;
    Ok(config)
}
